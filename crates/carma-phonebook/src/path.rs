//! Logical storage paths
//!
//! Storage paths are `/`-separated and relative to the storage root. A
//! normalized path has no `.` or `..` components, no leading or doubled
//! slashes, and is `"."` for the root itself.

use crate::error::{PhonebookError, Result};

fn allowed(c: char) -> bool {
    matches!(c, '-' | '%' | '.' | '/' | '0'..='9' | 'A'..='Z' | '_' | 'a'..='z')
}

/// Normalize a logical path. A `..` that would climb above the root is
/// dropped.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(PhonebookError::InvalidPath {
            path: String::new(),
            reason: "empty path".to_string(),
        });
    }
    if let Some(c) = path.chars().find(|c| !allowed(*c)) {
        return Err(PhonebookError::InvalidPath {
            path: path.to_string(),
            reason: format!("character {:?} is not allowed", c),
        });
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    if parts.is_empty() {
        Ok(".".to_string())
    } else {
        Ok(parts.join("/"))
    }
}

/// Append `name` to `base` and normalize the result
pub fn join(base: &str, name: &str) -> Result<String> {
    normalize_path(&format!("{}/{}", base, name))
}

/// Parent of a normalized path, `"."` for top-level entries
pub fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => ".",
    }
}

/// Last component of a normalized path
pub fn file_name(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((_, name)) => name,
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_vectors() {
        let cases = [
            ("./x/./y/./.././z/./../.", "x"),
            ("x/y/../../../z", "z"),
            ("x/y/../z", "x/z"),
            ("x/y/../z/..", "x"),
            ("/x", "x"),
            ("../x", "x"),
            ("x/..", "."),
            ("x//y/", "x/y"),
            (".", "."),
        ];
        for (input, expected) in cases {
            assert_eq!(normalize_path(input).unwrap(), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(normalize_path("").is_err());
        assert!(normalize_path("a b").is_err());
        assert!(normalize_path("x\\y").is_err());
        assert!(normalize_path("caf\u{e9}").is_err());
    }

    #[test]
    fn test_join_and_split() {
        assert_eq!(join(".", "a").unwrap(), "a");
        assert_eq!(join("cfg/phonebook", "unpacked").unwrap(), "cfg/phonebook/unpacked");
        assert_eq!(parent("a/b/c"), "a/b");
        assert_eq!(parent("a"), ".");
        assert_eq!(file_name("a/b/c"), "c");
        assert_eq!(file_name("a"), "a");
    }
}
