//! File-name pattern searches used by the template and reference resolvers

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use globset::{Glob, GlobMatcher};
use walkdir::WalkDir;

/// How deep recursive searches descend below their root
pub const MAX_SEARCH_DEPTH: usize = 6;

/// Compile `pattern` into a matcher for bare file names
pub fn matcher(pattern: &str) -> Option<GlobMatcher> {
    match Glob::new(pattern) {
        Ok(glob) => Some(glob.compile_matcher()),
        Err(e) => {
            tracing::warn!(pattern, "invalid search pattern: {e}");
            None
        }
    }
}

// Office lock files ("~$name.xlsx") are never real workbooks.
fn is_candidate(name: &str, matcher: &GlobMatcher) -> bool {
    !name.starts_with("~$") && matcher.is_match(name)
}

/// Files directly inside `dir` whose name matches `pattern`, sorted by path.
///
/// A missing or unreadable directory has no matches.
pub fn files_in(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let Some(matcher) = matcher(pattern) else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| is_candidate(&e.file_name().to_string_lossy(), &matcher))
        .map(|e| e.path())
        .collect();
    found.sort();
    found
}

/// Files anywhere under `root` (up to [`MAX_SEARCH_DEPTH`]) whose name matches
/// `pattern`, sorted by path
pub fn files_under(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let Some(matcher) = matcher(pattern) else {
        return Vec::new();
    };
    if !root.is_dir() {
        return Vec::new();
    }

    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .max_depth(MAX_SEARCH_DEPTH)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_candidate(&e.file_name().to_string_lossy(), &matcher))
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

/// The most recently modified of `paths`; ties go to the later path
pub fn newest(paths: Vec<PathBuf>) -> Option<PathBuf> {
    paths
        .into_iter()
        .map(|p| {
            let modified = std::fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .max()
        .map(|(_, p)| p)
}
