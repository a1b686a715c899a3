//! Directory view synthesis over the flat key space.
//!
//! Directories are never stored. A directory exists exactly when some index
//! key lies beneath it, and its children are computed on demand from the key
//! set. Keys are clean `/`-separated paths with no leading `/`; the root is
//! spelled `.`.

use std::collections::BTreeSet;

/// Root directory marker.
pub const ROOT: &str = ".";

/// Normalize a path: drop empty and `.` segments, resolve `..`, strip the
/// leading `/`. An empty result becomes [`ROOT`].
///
/// `..` never climbs above the root.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        ROOT.to_string()
    } else {
        parts.join("/")
    }
}

/// Join a relative path onto a base directory. The relative part is cleaned
/// first so it cannot escape `base`.
pub fn join(base: &str, rel: &str) -> String {
    let base = clean(base);
    let rel = clean(rel);
    match (base.as_str(), rel.as_str()) {
        (_, ROOT) => base,
        (ROOT, _) => rel,
        _ => format!("{base}/{rel}"),
    }
}

/// Parent directory of a clean key; [`ROOT`] for top-level keys.
pub fn parent(key: &str) -> &str {
    match key.rfind('/') {
        Some(i) => &key[..i],
        None => ROOT,
    }
}

/// Last segment of a clean key.
pub fn base_name(key: &str) -> &str {
    match key.rfind('/') {
        Some(i) => &key[i + 1..],
        None => key,
    }
}

/// Strip `dir` from the front of `key`, segment-wise.
///
/// Returns the remainder without its leading `/`, or `None` when `key` does
/// not lie strictly beneath `dir`.
pub fn strip_dir<'a>(key: &'a str, dir: &str) -> Option<&'a str> {
    if dir == ROOT {
        return (key != ROOT).then_some(key);
    }
    key.strip_prefix(dir)?
        .strip_prefix('/')
        .filter(|rest| !rest.is_empty())
}

/// Immediate contents of one directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Full keys of the files directly inside the directory.
    pub files: BTreeSet<String>,
    /// Names (single segments) of the inferred subdirectories.
    pub directories: BTreeSet<String>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

/// Compute the files and inferred subdirectories of `dir`.
///
/// A key whose parent is `dir` is a direct file. Any other key beneath `dir`
/// contributes the first segment of its remainder as a subdirectory. A key
/// equal to `dir`, or a `dir` nothing lies beneath, contributes nothing; an
/// unknown directory simply yields an empty listing.
pub fn files_in_directory<'a, I>(keys: I, dir: &str) -> Listing
where
    I: IntoIterator<Item = &'a str>,
{
    let dir = clean(dir);
    let mut listing = Listing::default();

    for key in keys {
        if parent(key) == dir {
            listing.files.insert(key.to_string());
            continue;
        }
        let Some(rest) = strip_dir(key, &dir) else {
            continue;
        };
        if let Some((first, _)) = rest.split_once('/') {
            if !first.is_empty() {
                listing.directories.insert(first.to_string());
            }
        }
    }

    listing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    const KEYS: &[&str] = &["a/b.txt", "a/c/d.txt", "e.txt"];

    #[test]
    fn test_root_listing() {
        let listing = files_in_directory(KEYS.iter().copied(), ".");
        assert_eq!(listing.files, set(&["e.txt"]));
        assert_eq!(listing.directories, set(&["a"]));
    }

    #[test]
    fn test_nested_listing() {
        let listing = files_in_directory(KEYS.iter().copied(), "a");
        assert_eq!(listing.files, set(&["a/b.txt"]));
        assert_eq!(listing.directories, set(&["c"]));

        let listing = files_in_directory(KEYS.iter().copied(), "a/c");
        assert_eq!(listing.files, set(&["a/c/d.txt"]));
        assert!(listing.directories.is_empty());
    }

    #[test]
    fn test_empty_and_slash_mean_root() {
        let expected = files_in_directory(KEYS.iter().copied(), ".");
        assert_eq!(files_in_directory(KEYS.iter().copied(), ""), expected);
        assert_eq!(files_in_directory(KEYS.iter().copied(), "/"), expected);
        assert_eq!(files_in_directory(KEYS.iter().copied(), "//./"), expected);
    }

    #[test]
    fn test_redundant_separators() {
        let listing = files_in_directory(KEYS.iter().copied(), "/a//");
        assert_eq!(listing.files, set(&["a/b.txt"]));
        assert_eq!(listing.directories, set(&["c"]));
    }

    #[test]
    fn test_directories_deduplicated() {
        let keys = ["x/1/a", "x/1/b", "x/1/c/d", "x/2/e"];
        let listing = files_in_directory(keys, "x");
        assert!(listing.files.is_empty());
        assert_eq!(listing.directories, set(&["1", "2"]));
    }

    #[test]
    fn test_unknown_directory_is_empty() {
        let listing = files_in_directory(KEYS.iter().copied(), "nope/deeper");
        assert!(listing.is_empty());
    }

    #[test]
    fn test_key_equal_to_dir_yields_nothing() {
        let listing = files_in_directory(["a"], "a");
        assert!(listing.is_empty());
    }

    #[test]
    fn test_prefix_is_segment_wise() {
        let keys = ["ab/x/y", "a/z"];
        let listing = files_in_directory(keys, "a");
        assert_eq!(listing.files, set(&["a/z"]));
        assert!(listing.directories.is_empty());
    }

    #[test]
    fn test_deep_keys_yield_first_segment_only() {
        let listing = files_in_directory(["p/q/r/s/t.txt"], "p");
        assert_eq!(listing.directories, set(&["q"]));
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean(""), ".");
        assert_eq!(clean("/"), ".");
        assert_eq!(clean("./a/./b/"), "a/b");
        assert_eq!(clean("a//b"), "a/b");
        assert_eq!(clean("a/b/../c"), "a/c");
        assert_eq!(clean("../../x"), "x");
    }

    #[test]
    fn test_join() {
        assert_eq!(join(".", "a/b"), "a/b");
        assert_eq!(join("root", "."), "root");
        assert_eq!(join("root", "/a"), "root/a");
        assert_eq!(join("root", "../../etc"), "root/etc");
    }

    #[test]
    fn test_parent_and_base_name() {
        assert_eq!(parent("e.txt"), ".");
        assert_eq!(parent("a/c/d.txt"), "a/c");
        assert_eq!(base_name("a/c/d.txt"), "d.txt");
        assert_eq!(base_name("e.txt"), "e.txt");
    }

    #[test]
    fn test_strip_dir() {
        assert_eq!(strip_dir("a/b", "a"), Some("b"));
        assert_eq!(strip_dir("a", "a"), None);
        assert_eq!(strip_dir("ab/c", "a"), None);
        assert_eq!(strip_dir("a/b", "."), Some("a/b"));
    }
}
