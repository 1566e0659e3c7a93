use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of an upload payload, stored as the object's
/// `sha256` metadata.
pub fn payload_digest(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
