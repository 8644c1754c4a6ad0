use md5::Digest;
use md5::Md5;

/// Fingerprint of an absent item. Never collides with a real digest (every
/// real fingerprint is 32 hex chars).
pub const NIL_FINGERPRINT: &str = "";

/// Compute the change fingerprint of a configuration item.
///
/// `None` means the item does not exist (never published, or deleted) and
/// maps to [`NIL_FINGERPRINT`]; any present content, including the empty
/// string, hashes to its lowercase hex MD5 digest.
pub fn fingerprint(content: Option<&str>) -> String {
    match content {
        None => NIL_FINGERPRINT.to_string(),
        Some(text) => {
            let mut hasher = Md5::new();
            hasher.update(text.as_bytes());
            format!("{:x}", hasher.finalize())
        }
    }
}
