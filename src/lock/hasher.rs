//! NF-014: BLAKE3 content hashing for graphs, artifacts and cache keys.

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Compute a composite hash from multiple components.
/// Components are NUL-separated, so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// First `len` characters of a `blake3:` digest, for file names and run ids.
/// Counts characters, not bytes: hand-edited lock entries may hold anything.
pub fn short(digest: &str, len: usize) -> &str {
    let hex = digest.strip_prefix("blake3:").unwrap_or(digest);
    match hex.char_indices().nth(len) {
        Some((end, _)) => &hex[..end],
        None => hex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nf014_hash_string() {
        let h1 = hash_string("hello");
        let h2 = hash_string("hello");
        let h3 = hash_string("world");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert!(h1.starts_with("blake3:"));
        assert_eq!(h1.len(), 7 + 64);
    }

    #[test]
    fn test_nf014_composite_hash_order_sensitive() {
        let h = composite_hash(&["blake3:aaa", "blake3:bbb"]);
        assert!(h.starts_with("blake3:"));
        assert_ne!(h, composite_hash(&["blake3:bbb", "blake3:aaa"]));
    }

    #[test]
    fn test_nf014_composite_hash_separates_components() {
        assert_ne!(composite_hash(&["ab", "c"]), composite_hash(&["a", "bc"]));
    }

    #[test]
    fn test_nf014_short() {
        let h = hash_string("x");
        assert_eq!(short(&h, 12).len(), 12);
        assert!(!short(&h, 12).contains(':'));
        assert_eq!(short("blake3:abc", 12), "abc");
    }

    #[test]
    fn test_nf014_short_multibyte() {
        assert_eq!(short("blake3:a\u{e9}\u{e9}\u{e9}", 2), "a\u{e9}");
        assert_eq!(short("blake3:\u{e9}\u{e9}", 12), "\u{e9}\u{e9}");
        assert_eq!(short("", 4), "");
    }
}
