//! Content fingerprinting for cache keys

use super::key::CacheOptions;

/// Normalize content so that casing and whitespace runs do not change the fingerprint.
pub fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Fingerprint normalized content together with the options that shape the result.
///
/// Returns `None` when the options cannot be serialized; callers must then skip
/// caching for the request.
pub fn content_hash(content: &str, options: &CacheOptions) -> Option<String> {
    let options_json = match serde_json::to_string(options) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to serialize cache options: {}", e);
            return None;
        }
    };

    let mut input = normalize_content(content);
    input.push_str(&options_json);

    let hash = md5_hex(input.as_bytes());
    tracing::debug!("Generated content hash: {}...", &hash[..8]);
    Some(hash)
}

pub(crate) fn md5_hex(input: &[u8]) -> String {
    format!("{:x}", md5::compute(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_content("  Hello \t\n  WORLD  "), "hello world");
        assert_eq!(normalize_content(""), "");
    }

    #[test]
    fn test_hash_is_hex_128_bit() {
        let hash = content_hash("hello", &CacheOptions::new()).unwrap();
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_matches_known_digest() {
        // md5("hello world{}")
        let hash = content_hash("Hello   World", &CacheOptions::new()).unwrap();
        assert_eq!(hash, md5_hex(b"hello world{}"));
    }

    #[test]
    fn test_options_change_hash() {
        let mut options = CacheOptions::new();
        let plain = content_hash("same text", &options).unwrap();

        options.insert("summary_type".into(), json!("concise"));
        let concise = content_hash("same text", &options).unwrap();

        options.insert("summary_type".into(), json!("detailed"));
        let detailed = content_hash("same text", &options).unwrap();

        assert_ne!(plain, concise);
        assert_ne!(concise, detailed);
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        let options = CacheOptions::new();
        let a = content_hash("The Court  finds\nfor the plaintiff", &options);
        let b = content_hash("the court finds for THE PLAINTIFF ", &options);
        assert_eq!(a, b);
    }
}
