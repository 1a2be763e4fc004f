use sha2::{Digest, Sha256};

/// Integrity envelope for values written to the persistent store.
///
/// A value whose checksum no longer matches (partial write, manual edit of the
/// storage table) is reported as absent, the same way a missing key is.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChecksummedValue {
    /// The stored payload (JSON text).
    pub data: String,
    /// SHA-256 of `data`, hex encoded.
    pub checksum: String,
}

impl ChecksummedValue {
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    /// Text written to the backend.
    pub fn seal(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Returns the payload if the envelope parses and the checksum matches.
    pub fn open(sealed: &str) -> Option<String> {
        let envelope: ChecksummedValue = match serde_json::from_str(sealed) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Stored value is not a checksum envelope: {}", e);
                return None;
            }
        };

        if envelope.is_valid() {
            Some(envelope.data)
        } else {
            tracing::warn!(
                "Stored value failed integrity check. Expected: {}, Data length: {}",
                envelope.checksum,
                envelope.data.len()
            );
            None
        }
    }
}
