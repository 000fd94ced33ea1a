//! Naming rules imposed by the control plane.

use sha2::{Digest, Sha224};

/// Maximum length of a DNS label (RFC 1123)
pub const MAX_DNS_LABEL: usize = 63;

const HASH_PREFIX_LEN: usize = 10;

/// Convert an authored name into a DNS-1123 label.
///
/// Lowercase letters and digits are kept. `_`, `-` and `.` become `-`,
/// uppercase letters are lowered with a `-` inserted before them, everything
/// else is removed. Leading and trailing `-` are trimmed. Results longer than
/// a label keep their tail behind a short SHA-224 prefix of the input so that
/// distinct long names stay distinct.
#[must_use]
pub fn dnsify(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '_' || ch == '-' || ch == '.' {
            if !out.is_empty() {
                out.push('-');
            }
        } else if !ch.is_ascii_alphanumeric() {
            continue;
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
        } else {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        }
    }

    let trimmed = out.trim_matches('-');
    if trimmed.len() <= MAX_DNS_LABEL {
        return trimmed.to_string();
    }

    // `trimmed` is ASCII, byte slicing is char slicing
    let digest = hex::encode(Sha224::digest(value.as_bytes()));
    let keep = MAX_DNS_LABEL - HASH_PREFIX_LEN - 1;
    format!(
        "{}-{}",
        &digest[..HASH_PREFIX_LEN],
        &trimmed[trimmed.len() - keep..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dnsify_simple() {
        assert_eq!(dnsify("n0"), "n0");
        assert_eq!(dnsify("my_node"), "my-node");
        assert_eq!(dnsify("a.b-c"), "a-b-c");
    }

    #[test]
    fn test_dnsify_camel_case() {
        assert_eq!(dnsify("MyNode"), "my-node");
        assert_eq!(dnsify("fooBar"), "foo-bar");
    }

    #[test]
    fn test_dnsify_strips_edges_and_symbols() {
        assert_eq!(dnsify("_leading"), "leading");
        assert_eq!(dnsify("trailing_"), "trailing");
        assert_eq!(dnsify("a$b!c"), "abc");
    }

    #[test]
    fn test_dnsify_long_names_are_hashed() {
        let long = "x".repeat(100);
        let out = dnsify(&long);
        assert!(out.len() <= MAX_DNS_LABEL);

        let other = format!("y{}", "x".repeat(99));
        assert_ne!(dnsify(&other), out);
    }

    proptest::proptest! {
        #[test]
        fn prop_dnsify_is_a_dns_label(s in "\\PC{0,120}") {
            let out = dnsify(&s);
            proptest::prop_assert!(out.len() <= MAX_DNS_LABEL);
            proptest::prop_assert!(!out.starts_with('-'));
            proptest::prop_assert!(!out.ends_with('-'));
            proptest::prop_assert!(out.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }
}
