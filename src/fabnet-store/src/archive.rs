//! Gzip-tar archive convention for crypto material and chaincode payloads
//! (spec §4.1, §6, §8). Entry names are relative to the archive root;
//! extraction rejects anything that could escape the destination directory.
//!
//! Grounded on the original controller's `tar_util.go`: the path-traversal
//! check (`validRelPath`) rejects an empty name, a backslash, a leading
//! `/`, or a `../` component, verbatim.

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Rejects a tar entry name that could escape the destination directory via
/// `..`, an absolute path, or a backslash (which `tar`'s `Path`-based
/// unpacking treats as a literal byte on Unix, not a separator — an
/// attacker-controlled name like `a\..\..\etc\passwd` would otherwise land
/// as a single oddly-named file rather than escaping, but we reject it
/// outright to match the original's stricter policy).
fn valid_rel_path(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if name.contains('\\') {
        return false;
    }
    if name.starts_with('/') {
        return false;
    }
    if name.contains("../") {
        return false;
    }
    true
}

/// Compresses `root` (and everything beneath it) into a gzip-tar byte
/// stream, with entry names relative to `root`.
pub fn compress(root: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let encoder = GzEncoder::new(&mut buf, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder
            .append_dir_all(".", root)
            .with_context(|| format!("archiving {}", root.display()))?;
        builder.finish()?;
    }
    Ok(buf)
}

/// Extracts a gzip-tar byte stream into `dest`, which must already exist.
/// Every entry name is validated before it is joined onto `dest`; any
/// violation aborts the whole extraction without writing partial state
/// beyond what was already unpacked (matching the original's fail-fast
/// behavior — it is the caller's job to extract into a fresh directory).
pub fn uncompress(data: &[u8], dest: &Path) -> Result<()> {
    let decoder = GzDecoder::new(data);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry
            .path()?
            .to_str()
            .ok_or_else(|| anyhow!("tar entry name is not valid UTF-8"))?
            .to_string();
        if !valid_rel_path(&name) {
            return Err(anyhow!("tar contained invalid name: {name:?}"));
        }
        let target: PathBuf = dest.join(&name);
        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("creating directory {}", target.display()))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mode = entry.header().mode().unwrap_or(0o644);
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            let mut file = fs::File::create(&target)
                .with_context(|| format!("creating {}", target.display()))?;
            file.write_all(&contents)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_file_tree() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("peerOrganizations/org1")).unwrap();
        fs::write(src.path().join("peerOrganizations/org1/cert.pem"), b"cert-bytes").unwrap();
        fs::write(src.path().join("top-level.txt"), b"hello").unwrap();

        let archive = compress(src.path()).unwrap();

        let dst = tempfile::tempdir().unwrap();
        uncompress(&archive, dst.path()).unwrap();

        assert_eq!(
            fs::read(dst.path().join("peerOrganizations/org1/cert.pem")).unwrap(),
            b"cert-bytes"
        );
        assert_eq!(fs::read(dst.path().join("top-level.txt")).unwrap(), b"hello");
    }

    #[test]
    fn rejects_parent_traversal() {
        let name = "../../etc/passwd";
        assert!(!valid_rel_path(name));
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(!valid_rel_path("/etc/passwd"));
    }

    #[test]
    fn rejects_backslash() {
        assert!(!valid_rel_path(r"a\b"));
    }

    #[test]
    fn rejects_empty_name() {
        assert!(!valid_rel_path(""));
    }

    #[test]
    fn accepts_ordinary_relative_path() {
        assert!(valid_rel_path("peerOrganizations/org1/cert.pem"));
    }

    #[test]
    fn malicious_archive_entry_is_rejected_before_any_write() {
        let mut buf = Vec::new();
        {
            let encoder = GzEncoder::new(&mut buf, Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let mut header = tar::Header::new_gnu();
            header.set_path("../escape.txt").unwrap();
            header.set_size(4);
            header.set_cksum();
            builder.append(&header, Cursor::new(b"evil")).unwrap();
            builder.finish().unwrap();
        }
        let dst = tempfile::tempdir().unwrap();
        let result = uncompress(&buf, dst.path());
        assert!(result.is_err());
    }
}
