//! Filesystem-safe names for PSNs
//!
//! A slug only contains `0-9`, `_`, `a-z`, `%`, and `-`/`.` away from the
//! ends, so it is a valid single path component on every storage backend
//! and never collides with `.`, `..` or a case-folded sibling.

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Name reserved for shared storage next to the slugs
const RESERVED: &str = "shared";

pub fn slugify(s: &str) -> String {
    if s == RESERVED {
        return "share%64".to_string();
    }
    let bytes = s.as_bytes();
    let last = bytes.len().saturating_sub(1);
    let mut out = String::with_capacity(bytes.len());
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'0'..=b'9' | b'_' | b'a'..=b'z' => out.push(b as char),
            b'-' | b'.' if i != 0 && i != last => out.push(b as char),
            b'%' => out.push_str("%%"),
            _ => {
                out.push('%');
                out.push(HEX[usize::from(b >> 4)] as char);
                out.push(HEX[usize::from(b & 0x0F)] as char);
            }
        }
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Invert [`slugify`]. A `%` that does not start a valid escape is kept as
/// a literal character.
pub fn unslugify(slug: &str) -> String {
    let bytes = slug.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if bytes.get(i + 1) == Some(&b'%') {
                out.push(b'%');
                i += 2;
                continue;
            }
            let hi = bytes.get(i + 1).copied().and_then(hex_value);
            let lo = bytes.get(i + 2).copied().and_then(hex_value);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_examples() {
        assert_eq!(slugify("client-00001"), "client-00001");
        assert_eq!(slugify("shared"), "share%64");
        assert_eq!(slugify("Alice"), "%41lice");
        assert_eq!(slugify("-x-"), "%2Dx%2D");
        assert_eq!(slugify(".x."), "%2Ex%2E");
        assert_eq!(slugify("a.b-c"), "a.b-c");
        assert_eq!(slugify("50%"), "50%%");
        assert_eq!(slugify("a/b"), "a%2Fb");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_unslugify_inverts() {
        for s in ["Alice", "shared", "-x-", "50%", "a/b c", "mb-server.3", "\u{e9}t\u{e9}"] {
            assert_eq!(unslugify(&slugify(s)), s, "input {:?}", s);
        }
    }

    #[test]
    fn test_unslugify_tolerates_malformed_escapes() {
        assert_eq!(unslugify("ab%"), "ab%");
        assert_eq!(unslugify("ab%4"), "ab%4");
        assert_eq!(unslugify("%zz"), "%zz");
    }

    #[test]
    fn test_slug_is_a_valid_path_component() {
        for s in ["..", ".", "/", "A/../B"] {
            let slug = slugify(s);
            assert_eq!(crate::path::normalize_path(&slug).unwrap(), slug);
        }
    }
}
