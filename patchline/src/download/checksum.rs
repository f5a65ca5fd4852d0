//! Whole-file validation of finished downloads.
//!
//! A downloaded resource is accepted only if its size and whole-file hash
//! match the descriptor. Validators are injected so tests and alternative
//! hash schemes can replace the default.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use xxhash_rust::xxh32::Xxh32;

use super::error::{DownloadError, DownloadResult};
use crate::chunked::DEFAULT_XXHASH_SEED;

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Checks a finished file against the expected size and hash.
pub trait ResourceValidator: Send + Sync {
    /// Returns `DownloadError::Validation` when the file does not match.
    fn validate(&self, path: &Path, expected_size: u64, expected_hash: &str) -> DownloadResult<()>;
}

/// Size plus xxHash32 validator for hashes published by the metadata API.
///
/// The API writes the digest as a lowercase hex number without leading
/// zeros, so both sides are compared in that form. An empty expected hash
/// skips the hash comparison.
#[derive(Debug, Clone, Copy)]
pub struct XxHash32ResourceValidator {
    seed: u32,
}

impl XxHash32ResourceValidator {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }
}

impl Default for XxHash32ResourceValidator {
    fn default() -> Self {
        Self::new(DEFAULT_XXHASH_SEED)
    }
}

impl ResourceValidator for XxHash32ResourceValidator {
    fn validate(&self, path: &Path, expected_size: u64, expected_hash: &str) -> DownloadResult<()> {
        check_size(path, expected_size)?;
        if expected_hash.is_empty() {
            return Ok(());
        }

        let actual = format!("{:x}", calculate_file_xxhash32(path, self.seed)?);
        if strip_hex_number(&actual) != strip_hex_number(expected_hash) {
            return Err(hash_mismatch(path, &actual, expected_hash));
        }
        Ok(())
    }
}

/// Size plus lowercase-hex SHA-256 validator.
///
/// An empty expected hash skips the hash comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256ResourceValidator;

impl ResourceValidator for Sha256ResourceValidator {
    fn validate(&self, path: &Path, expected_size: u64, expected_hash: &str) -> DownloadResult<()> {
        check_size(path, expected_size)?;
        if expected_hash.is_empty() {
            return Ok(());
        }

        let actual = calculate_file_checksum(path)?;
        if !actual.eq_ignore_ascii_case(expected_hash) {
            return Err(hash_mismatch(path, &actual, expected_hash));
        }
        Ok(())
    }
}

fn check_size(path: &Path, expected_size: u64) -> DownloadResult<()> {
    let actual_size = path
        .metadata()
        .map_err(|e| DownloadError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();

    if actual_size != expected_size {
        return Err(DownloadError::Validation {
            path: path.to_path_buf(),
            reason: format!("size is {} bytes, expected {}", actual_size, expected_size),
        });
    }
    Ok(())
}

fn hash_mismatch(path: &Path, actual: &str, expected: &str) -> DownloadError {
    DownloadError::Validation {
        path: path.to_path_buf(),
        reason: format!("hash is {}, expected {}", actual, expected),
    }
}

/// Lowercase hex number with leading zeros removed.
fn strip_hex_number(hash: &str) -> String {
    let digits = hash.trim().trim_start_matches('0');
    if digits.is_empty() {
        "0".to_string()
    } else {
        digits.to_ascii_lowercase()
    }
}

/// Feed the whole file at `path` to `update` in buffer-sized pieces.
fn stream_file(path: &Path, mut update: impl FnMut(&[u8])) -> DownloadResult<()> {
    let mut file = File::open(path).map_err(|e| DownloadError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| DownloadError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if bytes_read == 0 {
            return Ok(());
        }

        update(&buffer[..bytes_read]);
    }
}

/// Calculate SHA-256 checksum of a file.
///
/// Returns the lowercase hexadecimal hash of the file contents.
pub fn calculate_file_checksum(path: &Path) -> DownloadResult<String> {
    let mut hasher = Sha256::new();
    stream_file(path, |bytes| hasher.update(bytes))?;
    Ok(hex::encode(hasher.finalize()))
}

/// xxHash32 digest of a file.
pub fn calculate_file_xxhash32(path: &Path, seed: u32) -> DownloadResult<u32> {
    let mut hasher = Xxh32::new(seed);
    stream_file(path, |bytes| hasher.update(bytes))?;
    Ok(hasher.digest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use xxhash_rust::xxh32::xxh32;

    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn write_file(temp: &TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = temp.path().join(name);
        File::create(&path).unwrap().write_all(data).unwrap();
        path
    }

    #[test]
    fn test_calculate_file_checksum() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "test.txt", b"hello world");
        assert_eq!(calculate_file_checksum(&path).unwrap(), HELLO_WORLD_SHA256);
    }

    #[test]
    fn test_calculate_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "empty.txt", b"");
        assert_eq!(
            calculate_file_checksum(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_calculate_nonexistent_file() {
        let result = calculate_file_checksum(Path::new("/nonexistent/file.txt"));
        assert!(matches!(result, Err(DownloadError::ReadFailed { .. })));
    }

    #[test]
    fn test_validate_match_ignores_case() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "test.txt", b"hello world");
        let upper = HELLO_WORLD_SHA256.to_uppercase();
        assert!(Sha256ResourceValidator.validate(&path, 11, &upper).is_ok());
    }

    #[test]
    fn test_validate_size_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "test.txt", b"hello world");
        let result = Sha256ResourceValidator.validate(&path, 12, HELLO_WORLD_SHA256);
        match result {
            Err(DownloadError::Validation { reason, .. }) => assert!(reason.contains("size")),
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_hash_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "test.txt", b"hello world");
        let result = Sha256ResourceValidator.validate(&path, 11, "wrong_checksum");
        assert!(matches!(result, Err(DownloadError::Validation { .. })));
    }

    #[test]
    fn test_validate_empty_hash_checks_size_only() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "test.txt", b"hello world");
        assert!(Sha256ResourceValidator.validate(&path, 11, "").is_ok());
    }

    #[test]
    fn test_large_file_checksum() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "large.bin", &vec![0xABu8; 100_000]);
        let checksum = calculate_file_checksum(&path).unwrap();
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, calculate_file_checksum(&path).unwrap());
    }

    #[test]
    fn test_file_xxhash32_matches_one_shot() {
        let temp = TempDir::new().unwrap();
        let data = vec![0x5Au8; 200_000];
        let path = write_file(&temp, "large.bin", &data);
        assert_eq!(
            calculate_file_xxhash32(&path, DEFAULT_XXHASH_SEED).unwrap(),
            xxh32(&data, DEFAULT_XXHASH_SEED)
        );
    }

    #[test]
    fn test_xxhash32_validate_ignores_leading_zeros_and_case() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "test.txt", b"hello world");
        let digest = xxh32(b"hello world", DEFAULT_XXHASH_SEED);
        let validator = XxHash32ResourceValidator::default();

        assert!(validator.validate(&path, 11, &format!("{:x}", digest)).is_ok());
        assert!(validator.validate(&path, 11, &format!("{:016X}", digest)).is_ok());
        assert!(validator.validate(&path, 11, "").is_ok());
    }

    #[test]
    fn test_xxhash32_validate_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "test.txt", b"hello world");
        let wrong = format!("{:x}", xxh32(b"hello world", DEFAULT_XXHASH_SEED) ^ 1);

        let result = XxHash32ResourceValidator::default().validate(&path, 11, &wrong);
        match result {
            Err(DownloadError::Validation { reason, .. }) => assert!(reason.contains("hash")),
            other => panic!("Expected Validation error, got {:?}", other),
        }
        assert!(matches!(
            XxHash32ResourceValidator::default().validate(&path, 10, ""),
            Err(DownloadError::Validation { .. })
        ));
    }

    #[test]
    fn test_strip_hex_number() {
        assert_eq!(strip_hex_number("000ABc"), "abc");
        assert_eq!(strip_hex_number("0000"), "0");
    }
}
