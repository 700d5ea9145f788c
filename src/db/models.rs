// Data models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An uploaded audio file: its bytes plus the metadata a file picker reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBlob {
    pub name: String,
    pub mime_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub bytes: Vec<u8>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            last_modified: None,
            bytes,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// A record as persisted by the bucket store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: i64,
    pub bucket: String,
    pub file: FileBlob,
}

/// Result of adding a file: the stored record plus the caller's extra metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedFile {
    pub id: i64,
    pub bucket: String,
    pub file: FileBlob,
    pub extra: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_added_file_keeps_its_bytes_through_json() {
        let modified = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        let added = AddedFile {
            id: 7,
            bucket: "rain".to_string(),
            file: FileBlob::new("drip.ogg", vec![0, 1, 254, 255])
                .with_mime_type("audio/ogg")
                .with_last_modified(modified),
            extra: json!({ "volume": 0.5 }),
        };

        let text = serde_json::to_string(&added).unwrap();
        let back: AddedFile = serde_json::from_str(&text).unwrap();

        assert_eq!(back, added);
        assert_eq!(back.file.size(), 4);
    }
}
