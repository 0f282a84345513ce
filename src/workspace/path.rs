//! Path helpers for the workspace tree.
//!
//! Paths are slash-separated and relative to the workspace root, which has no
//! segment of its own: `src/lib/a.ts` names file `a.ts` inside `lib` inside
//! `src`. An empty string names the root directory.

use super::error::{Result, WorkspaceError};
use super::tree::Directory;

pub const SEPARATOR: char = '/';

/// Split a path into its segments. The root path yields no segments.
pub fn segments(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split(SEPARATOR).collect()
    }
}

/// Spell `path` the way the tree and the document cache key it, with every
/// empty segment dropped.
pub fn canonical(path: &str) -> String {
    path.split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// True if `name` carries a separator. Archives written on Windows may use `\`.
pub fn has_separator(name: &str) -> bool {
    name.contains(|c: char| c == SEPARATOR || c == '\\')
}

/// Join a directory path and an entry name.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches(SEPARATOR);
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", dir, SEPARATOR, name)
    }
}

/// Split a path into its parent directory path and final segment.
pub fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = path.trim_matches(SEPARATOR);
    match trimmed.rsplit_once(SEPARATOR) {
        Some((parent, name)) => (parent, name),
        None => ("", trimmed),
    }
}

/// True if `path` is `prefix` itself or lies underneath it.
pub fn is_within(path: &str, prefix: &str) -> bool {
    let path = path.trim_matches(SEPARATOR);
    let prefix = prefix.trim_matches(SEPARATOR);
    if prefix.is_empty() {
        return true;
    }
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path[prefix.len()..].starts_with(SEPARATOR))
}

/// Move `path` from under `from` to under `to`. Returns None if `path` is not within `from`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_within(path, from) {
        return None;
    }
    let path = path.trim_matches(SEPARATOR);
    let from = from.trim_matches(SEPARATOR);
    let suffix = path[from.len()..].trim_start_matches(SEPARATOR);
    if suffix.is_empty() {
        Some(to.trim_matches(SEPARATOR).to_string())
    } else {
        Some(join(to, suffix))
    }
}

/// Strip the final extension from a file name (`site.zip` -> `site`).
pub fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Validate a name supplied for a single file or directory.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(WorkspaceError::InvalidName("name cannot be empty".to_string()));
    }
    if name.contains(SEPARATOR) {
        return Err(WorkspaceError::InvalidName(format!(
            "'{}' must be a single path segment",
            name
        )));
    }
    if name == "." || name == ".." {
        return Err(WorkspaceError::InvalidName(format!("'{}' is reserved", name)));
    }
    Ok(())
}

/// Resolve the directory that contains the final segment of `path`.
///
/// Every segment but the last must name a child directory, starting at `root`.
pub fn resolve<'a>(root: &'a Directory, path: &str) -> Result<&'a Directory> {
    let (parent, _) = split_parent(path);
    resolve_dir(root, parent)
}

/// Resolve a directory path, consuming every segment.
pub fn resolve_dir<'a>(root: &'a Directory, dir_path: &str) -> Result<&'a Directory> {
    let mut dir = root;
    for segment in segments(dir_path) {
        dir = dir
            .dir(segment)
            .ok_or_else(|| WorkspaceError::not_found(dir_path))?;
    }
    Ok(dir)
}

pub fn resolve_dir_mut<'a>(root: &'a mut Directory, dir_path: &str) -> Result<&'a mut Directory> {
    let mut dir = root;
    for segment in segments(dir_path) {
        dir = dir
            .dir_mut(segment)
            .ok_or_else(|| WorkspaceError::not_found(dir_path))?;
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Directory {
        Directory {
            name: String::new(),
            files: vec!["README.md".to_string()],
            dirs: vec![Directory {
                name: "src".to_string(),
                files: vec!["a.ts".to_string()],
                dirs: vec![Directory::new("lib")],
            }],
        }
    }

    #[test]
    fn test_segments_and_join() {
        assert!(segments("").is_empty());
        assert!(segments("/").is_empty());
        assert_eq!(segments("src/lib/a.ts"), vec!["src", "lib", "a.ts"]);
        assert_eq!(join("", "a.ts"), "a.ts");
        assert_eq!(join("src/lib/", "a.ts"), "src/lib/a.ts");
    }

    #[test]
    fn test_canonical_drops_empty_segments() {
        assert_eq!(canonical("/src/a.ts"), "src/a.ts");
        assert_eq!(canonical("src/a.ts/"), "src/a.ts");
        assert_eq!(canonical("src//lib/"), "src/lib");
        assert_eq!(canonical("/"), "");
        assert!(has_separator("a\\b"));
        assert!(has_separator("a/b"));
        assert!(!has_separator("a.ts"));
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(split_parent("src/lib/a.ts"), ("src/lib", "a.ts"));
        assert_eq!(split_parent("a.ts"), ("", "a.ts"));
    }

    #[test]
    fn test_is_within_respects_segments() {
        assert!(is_within("src/a.ts", "src"));
        assert!(is_within("src", "src"));
        assert!(!is_within("srcs/a.ts", "src"));
        assert!(is_within("anything", ""));
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase("src/lib/a.ts", "src", "app"), Some("app/lib/a.ts".to_string()));
        assert_eq!(rebase("src", "src", "app"), Some("app".to_string()));
        assert_eq!(rebase("other/a.ts", "src", "app"), None);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("a.ts").is_ok());
        assert!(matches!(validate_name("a/b"), Err(WorkspaceError::InvalidName(_))));
        assert!(matches!(validate_name("  "), Err(WorkspaceError::InvalidName(_))));
        assert!(matches!(validate_name(".."), Err(WorkspaceError::InvalidName(_))));
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("site.zip"), "site");
        assert_eq!(strip_extension("archive.tar.zip"), "archive.tar");
        assert_eq!(strip_extension(".hidden"), ".hidden");
        assert_eq!(strip_extension("plain"), "plain");
    }

    #[test]
    fn test_resolve_walks_all_but_last_segment() {
        let root = sample();
        assert_eq!(resolve(&root, "src/a.ts").unwrap().name, "src");
        assert_eq!(resolve(&root, "README.md").unwrap().name, "");
        assert!(matches!(resolve(&root, "missing/a.ts"), Err(WorkspaceError::NotFound(_))));
    }

    #[test]
    fn test_resolve_dir() {
        let mut root = sample();
        assert_eq!(resolve_dir(&root, "src/lib").unwrap().name, "lib");
        assert!(resolve_dir(&root, "src/nope").is_err());
        resolve_dir_mut(&mut root, "src/lib").unwrap().files.push("b.ts".to_string());
        assert_eq!(root.dirs[0].dirs[0].files, vec!["b.ts"]);
    }
}
