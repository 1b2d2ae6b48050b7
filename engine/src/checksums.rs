//! Checksum computation for post-copy verification.
//!
//! When a job sets `verify`, each transferred file is hashed on both sides
//! after the atomic rename; a mismatch fails the attempt.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5 (fast, not collision resistant)
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!(
                "unknown checksum algorithm '{other}' (expected md5, sha256 or blake3)"
            )),
        }
    }
}

/// Streaming hasher over one of the supported algorithms.
enum Hasher {
    Md5(md5::Context),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::default()),
            ChecksumAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(data),
            Self::Sha256(hasher) => sha2::Digest::update(hasher, data),
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    fn finalize(self) -> String {
        match self {
            Self::Md5(ctx) => format!("{:x}", ctx.compute()),
            Self::Sha256(hasher) => format!("{:x}", sha2::Digest::finalize(hasher)),
            Self::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

/// Compute the hex checksum of a file.
pub fn file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(hasher.finalize())
}

/// True when both files hash to the same value.
pub fn files_match(source: &Path, destination: &Path, algorithm: ChecksumAlgorithm) -> io::Result<bool> {
    Ok(file_checksum(source, algorithm)? == file_checksum(destination, algorithm)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_known_digests() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("abc.txt");
        fs::write(&path, b"abc").expect("Failed to write file");

        assert_eq!(
            file_checksum(&path, ChecksumAlgorithm::Md5).expect("md5"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            file_checksum(&path, ChecksumAlgorithm::Sha256).expect("sha256"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            file_checksum(&path, ChecksumAlgorithm::Blake3).expect("blake3"),
            blake3::hash(b"abc").to_hex().to_string()
        );
    }

    #[test]
    fn test_files_match_detects_difference() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        fs::write(&a, b"same").expect("Failed to write a");
        fs::write(&b, b"same").expect("Failed to write b");
        assert!(files_match(&a, &b, ChecksumAlgorithm::Blake3).expect("hash"));

        fs::write(&b, b"diff").expect("Failed to rewrite b");
        assert!(!files_match(&a, &b, ChecksumAlgorithm::Sha256).expect("hash"));
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("SHA256".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Sha256));
        assert!("crc64".parse::<ChecksumAlgorithm>().is_err());
    }
}
