use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const REF_PREFIX: &str = "cas:sha256:";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Location of a digest inside the store: `sha256/ab/cd/<hex>`.
pub fn object_path(root: &Path, hex: &str) -> PathBuf {
    object_dir(root, hex).join(hex)
}

fn object_dir(root: &Path, hex: &str) -> PathBuf {
    root.join("sha256").join(&hex[0..2]).join(&hex[2..4])
}

pub fn payload_ref(hex: &str) -> String {
    format!("{}{}", REF_PREFIX, hex)
}

/// Extract the hex digest from a `cas:sha256:<hex>` reference.
pub fn parse_payload_ref(payload_ref: &str) -> Option<&str> {
    payload_ref
        .strip_prefix(REF_PREFIX)
        .filter(|hex| hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Store `bytes` under their sha256 digest and return the digest.
///
/// An existing object is kept only if it still hashes to its name; anything
/// else at that path is replaced. Objects are written to a temporary file,
/// synced, then renamed into place.
pub fn write_cas(root: &Path, bytes: &[u8]) -> io::Result<String> {
    let hex = sha256_hex(bytes);
    let dir = object_dir(root, &hex);
    let path = dir.join(&hex);
    if path.exists() {
        match read_cas(root, &hex) {
            Ok((_, actual)) if actual == hex => return Ok(hex),
            Ok((_, actual)) => warn!(digest = %hex, actual = %actual, "Replacing corrupt CAS object"),
            Err(e) => warn!(digest = %hex, error = %e, "Replacing unreadable CAS object"),
        }
    }
    fs::create_dir_all(&dir)?;

    let tmp = dir.join(format!(".{}.{}.tmp", hex, std::process::id()));
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, &path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    sync_dir(&dir);
    Ok(hex)
}

/// Read the object stored under `hex` together with the digest its content
/// hashes to now. Callers compare the two.
pub fn read_cas(root: &Path, hex: &str) -> io::Result<(Vec<u8>, String)> {
    let bytes = fs::read(object_path(root, hex))?;
    let actual = sha256_hex(&bytes);
    Ok((bytes, actual))
}

#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) {}
