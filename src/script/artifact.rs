//! Versioned binary cache record (`.kit` files)
//!
//! Layout (all integers little-endian):
//! - version: u32, always [`FORMAT_VERSION`] when written by this build
//! - field count: u32, number of header fields that follow (4)
//! - content digest: u32 length + UTF-8
//! - parameter digest: u32 length + UTF-8
//! - parameter count: u32
//! - parameter description: u32 length + UTF-8
//! - compiled artifact: u64 length + bytes
//!
//! Readers check the version before touching anything else and reject what
//! they do not understand. Records are encoded into memory first and reach
//! disk through a temp file that is renamed over the target, so a reader never
//! sees a partial record.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Format version produced by this build
pub const FORMAT_VERSION: u32 = 1;

const FIELD_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Unsupported artifact format version {0}")]
    UnsupportedVersion(u32),

    #[error("Artifact declares {found} header fields, expected {expected}")]
    FieldCount { found: u32, expected: u32 },

    #[error("Artifact is truncated while reading {field}")]
    Truncated { field: &'static str },

    #[error("Artifact field {field} is not valid UTF-8")]
    InvalidText { field: &'static str },

    #[error("Artifact has {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("Failed to {action} artifact {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArtifactError {
    fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        ArtifactError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One cached compilation result with the digests it was produced under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub content_digest: String,
    pub parameter_digest: String,
    pub parameter_count: u32,
    pub parameter_description: String,
    pub artifact: Bytes,
}

impl CacheRecord {
    /// Serialize the record, tagged with the current format version
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            64 + self.content_digest.len()
                + self.parameter_digest.len()
                + self.parameter_description.len()
                + self.artifact.len(),
        );
        buf.put_u32_le(FORMAT_VERSION);
        buf.put_u32_le(FIELD_COUNT);
        put_text(&mut buf, &self.content_digest);
        put_text(&mut buf, &self.parameter_digest);
        buf.put_u32_le(self.parameter_count);
        put_text(&mut buf, &self.parameter_description);
        buf.put_u64_le(self.artifact.len() as u64);
        buf.put_slice(&self.artifact);
        buf.freeze()
    }

    /// Parse a record, rejecting unknown versions before reading any other field
    pub fn decode(mut data: Bytes) -> Result<Self, ArtifactError> {
        let version = get_u32(&mut data, "version")?;
        if version != FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion(version));
        }

        let fields = get_u32(&mut data, "field count")?;
        if fields != FIELD_COUNT {
            return Err(ArtifactError::FieldCount {
                found: fields,
                expected: FIELD_COUNT,
            });
        }

        let content_digest = get_text(&mut data, "content digest")?;
        let parameter_digest = get_text(&mut data, "parameter digest")?;
        let parameter_count = get_u32(&mut data, "parameter count")?;
        let parameter_description = get_text(&mut data, "parameter description")?;

        if data.remaining() < 8 {
            return Err(ArtifactError::Truncated { field: "artifact" });
        }
        let len = data.get_u64_le();
        if (data.remaining() as u64) < len {
            return Err(ArtifactError::Truncated { field: "artifact" });
        }
        let artifact = data.split_to(len as usize);

        if data.has_remaining() {
            return Err(ArtifactError::TrailingBytes(data.remaining()));
        }

        Ok(Self {
            content_digest,
            parameter_digest,
            parameter_count,
            parameter_description,
            artifact,
        })
    }

    /// Write the whole encoded record to `sink` in a single call
    pub fn write<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_all(&self.encode())?;
        sink.flush()
    }

    pub fn read<R: Read>(source: &mut R) -> Result<Self, ArtifactError> {
        let mut data = Vec::new();
        source
            .read_to_end(&mut data)
            .map_err(|e| ArtifactError::io("read", Path::new("<stream>"), e))?;
        Self::decode(Bytes::from(data))
    }

    /// Persist atomically: temp file in the target directory, then rename
    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| ArtifactError::io("create directory for", path, e))?;

        let mut temp =
            NamedTempFile::new_in(dir).map_err(|e| ArtifactError::io("stage", path, e))?;
        self.write(temp.as_file_mut())
            .map_err(|e| ArtifactError::io("write", path, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ArtifactError::io("sync", path, e))?;
        temp.persist(path)
            .map_err(|e| ArtifactError::io("persist", path, e.error))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let data = fs::read(path).map_err(|e| ArtifactError::io("read", path, e))?;
        Self::decode(Bytes::from(data))
    }
}

/// Read only the version tag of an encoded record
pub fn peek_version(data: &[u8]) -> Option<u32> {
    data.get(..4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
}

fn put_text(buf: &mut BytesMut, text: &str) {
    buf.put_u32_le(text.len() as u32);
    buf.put_slice(text.as_bytes());
}

fn get_u32(data: &mut Bytes, field: &'static str) -> Result<u32, ArtifactError> {
    if data.remaining() < 4 {
        return Err(ArtifactError::Truncated { field });
    }
    Ok(data.get_u32_le())
}

fn get_text(data: &mut Bytes, field: &'static str) -> Result<String, ArtifactError> {
    let len = get_u32(data, field)? as usize;
    if data.remaining() < len {
        return Err(ArtifactError::Truncated { field });
    }
    let raw = data.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ArtifactError::InvalidText { field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> CacheRecord {
        CacheRecord {
            content_digest: "ab12".repeat(16),
            parameter_digest: "cd34".repeat(16),
            parameter_count: 2,
            parameter_description: "player: text, run_args: list".to_string(),
            artifact: Bytes::from_static(b"\x00compiled\xffbody"),
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".build/a.kit");

        let record = sample();
        record.save(&path).unwrap();

        let loaded = CacheRecord::load(&path).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(peek_version(&fs::read(&path).unwrap()), Some(FORMAT_VERSION));
    }

    #[test]
    fn test_writer_always_tags_current_version() {
        let encoded = sample().encode();
        assert_eq!(&encoded[..4], &FORMAT_VERSION.to_le_bytes());
        assert_eq!(&encoded[4..8], &FIELD_COUNT.to_le_bytes());
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let mut raw = sample().encode().to_vec();
        raw[..4].copy_from_slice(&2u32.to_le_bytes());

        let err = CacheRecord::decode(Bytes::from(raw)).unwrap_err();
        assert!(matches!(err, ArtifactError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        let encoded = sample().encode();
        for cut in [0, 3, 9, encoded.len() - 1] {
            let err = CacheRecord::decode(encoded.slice(..cut)).unwrap_err();
            assert!(matches!(err, ArtifactError::Truncated { .. }), "cut at {cut}");
        }
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut raw = sample().encode().to_vec();
        raw.extend_from_slice(b"junk");
        let err = CacheRecord::decode(Bytes::from(raw)).unwrap_err();
        assert!(matches!(err, ArtifactError::TrailingBytes(4)));
    }

    #[test]
    fn test_failed_save_keeps_previous_record() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.kit");
        sample().save(&path).unwrap();

        // a directory squatting on the temp location's target makes persist fail
        let blocked = temp.path().join("blocked.kit");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("child"), b"x").unwrap();
        assert!(sample().save(&blocked).is_err());

        assert_eq!(CacheRecord::load(&path).unwrap(), sample());
    }
}
