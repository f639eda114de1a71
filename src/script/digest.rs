//! Content digests for scripts and parameter signatures
//!
//! Every digest is lowercase, zero-padded hex of the raw hash bytes, so the same
//! byte sequence yields the same string on every platform. Text is always hashed
//! as UTF-8.
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("Unsupported digest algorithm: {0} (supported: sha-224, sha-256, sha-384, sha-512)")]
    UnsupportedAlgorithm(String),
}

/// Hash algorithm used for content and parameter digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Sha224 => "sha-224",
            Algorithm::Sha256 => "sha-256",
            Algorithm::Sha384 => "sha-384",
            Algorithm::Sha512 => "sha-512",
        }
    }

    fn hasher(self) -> Box<dyn DynHasher> {
        match self {
            Algorithm::Sha224 => Box::new(Sha224::new()),
            Algorithm::Sha256 => Box::new(Sha256::new()),
            Algorithm::Sha384 => Box::new(Sha384::new()),
            Algorithm::Sha512 => Box::new(Sha512::new()),
        }
    }
}

impl FromStr for Algorithm {
    type Err = DigestError;

    /// Accepts `sha-256`, `sha256` and `SHA-256` spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "sha224" => Ok(Algorithm::Sha224),
            "sha256" => Ok(Algorithm::Sha256),
            "sha384" => Ok(Algorithm::Sha384),
            "sha512" => Ok(Algorithm::Sha512),
            _ => Err(DigestError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// sha2 hashers share no object-safe trait, so wrap the two calls we need.
trait DynHasher {
    fn update(&mut self, data: &[u8]);
    fn finalize_hex(self: Box<Self>) -> String;
}

impl<D: Digest> DynHasher for D {
    fn update(&mut self, data: &[u8]) {
        Digest::update(self, data);
    }

    fn finalize_hex(self: Box<Self>) -> String {
        hex::encode((*self).finalize())
    }
}

struct HashWriter(Box<dyn DynHasher>);

impl io::Write for HashWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Digest a byte slice
pub fn digest_bytes(data: &[u8], algorithm: Algorithm) -> String {
    let mut hasher = algorithm.hasher();
    hasher.update(data);
    hasher.finalize_hex()
}

/// Digest text, always hashed as its UTF-8 bytes
pub fn digest_str(text: &str, algorithm: Algorithm) -> String {
    digest_bytes(text.as_bytes(), algorithm)
}

/// Digest a file by streaming its contents
pub fn digest_file(path: &Path, algorithm: Algorithm) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut writer = HashWriter(algorithm.hasher());
    io::copy(&mut file, &mut writer)?;
    Ok(writer.0.finalize_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_sha256_vector() {
        assert_eq!(
            digest_str("abc", Algorithm::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_leading_zero_bytes_are_kept() {
        // every digest has the full width of its algorithm
        for input in ["", "a", "kitrun", "0"] {
            assert_eq!(digest_str(input, Algorithm::Sha256).len(), 64);
            assert_eq!(digest_str(input, Algorithm::Sha512).len(), 128);
        }
    }

    #[test]
    fn test_file_digest_matches_bytes_digest() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.kts");
        let content = "println(\"héllo\")\n".repeat(2000);
        fs::write(&file, &content).unwrap();

        let from_file = digest_file(&file, Algorithm::Sha256).unwrap();
        assert_eq!(from_file, digest_str(&content, Algorithm::Sha256));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("sha-256".parse::<Algorithm>().unwrap(), Algorithm::Sha256);
        assert_eq!("SHA512".parse::<Algorithm>().unwrap(), Algorithm::Sha512);
        assert_eq!(
            "md5".parse::<Algorithm>(),
            Err(DigestError::UnsupportedAlgorithm("md5".to_string()))
        );
    }
}
