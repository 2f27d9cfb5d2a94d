//! Path composition and probing helpers.
//!
//! The collector stores absolute names built from a watch root and a
//! kernel-reported relative name; `join` is the seam between them. Both
//! separator styles are accepted on input and collapse to the native
//! separator at the seam. Separators inside either side are left alone.

use std::path::Path;

/// Separator characters accepted on input.
const SEPARATORS: [char; 2] = ['/', '\\'];

#[cfg(windows)]
const NATIVE_SEPARATOR: char = '\\';
#[cfg(not(windows))]
const NATIVE_SEPARATOR: char = '/';

/// Combine a root and a relative name into one path.
///
/// The left side is always treated as a directory, so the result carries a
/// trailing separator when the right side is empty. Runs of mixed
/// separators at the seam collapse to a single native one. Two empty
/// inputs produce an empty string.
pub fn join(lhs: &str, rhs: &str) -> String {
    let left = lhs.trim_end_matches(SEPARATORS);
    let right = rhs.trim_start_matches(SEPARATORS);

    match (left.is_empty(), right.is_empty()) {
        (true, true) => String::new(),
        (true, false) => format!("{NATIVE_SEPARATOR}{right}"),
        (false, true) => format!("{left}{NATIVE_SEPARATOR}"),
        (false, false) => format!("{left}{NATIVE_SEPARATOR}{right}"),
    }
}

/// Whether `path` names an existing non-directory entry.
///
/// A missing or unreadable path reports false, matching what the streams
/// need when classifying an entry that may already be gone.
pub fn is_file(path: &str) -> bool {
    std::fs::metadata(path).map(|meta| !meta.is_dir()).unwrap_or(false)
}

/// Immediate subdirectories of `path`, as owned path strings.
///
/// Unreadable entries are skipped; an unreadable root yields an empty list.
pub fn sub_folders(path: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(Path::new(path)) else {
        return Vec::new();
    };

    let mut folders = Vec::new();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_dir() {
            folders.push(entry.path().to_string_lossy().into_owned());
        }
    }
    folders
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEP: char = NATIVE_SEPARATOR;

    #[test]
    fn join_collapses_the_seam() {
        assert_eq!(join("a/", "/b.txt"), format!("a{SEP}b.txt"));
        assert_eq!(join("a", "b.txt"), format!("a{SEP}b.txt"));
        assert_eq!(join("a///", "///b.txt"), format!("a{SEP}b.txt"));
        assert_eq!(join("a\\", "\\b.txt"), format!("a{SEP}b.txt"));
        assert_eq!(join("a/\\/", "\\/b.txt"), format!("a{SEP}b.txt"));
    }

    #[test]
    fn join_treats_the_left_side_as_a_directory() {
        assert_eq!(join("a", ""), format!("a{SEP}"));
        assert_eq!(join("a/", ""), format!("a{SEP}"));
    }

    #[test]
    fn join_of_two_empty_sides_is_empty() {
        assert_eq!(join("", ""), "");
        assert_eq!(join("/", "/"), "");
    }

    #[test]
    fn join_with_empty_left_side_keeps_the_result_rooted() {
        assert_eq!(join("", "b.txt"), format!("{SEP}b.txt"));
    }

    #[test]
    fn join_leaves_inner_separators_alone() {
        assert_eq!(join("a", "b/c.txt"), format!("a{SEP}b/c.txt"));
    }

    // The drive-letter contracts the watcher inherits from its Windows
    // origins; the seam behaviour is identical on every platform but the
    // expected strings only make sense with a backslash separator.
    #[cfg(windows)]
    #[test]
    fn join_handles_drive_roots() {
        assert_eq!(join("c:\\", "\\foo\\bar.txt"), "c:\\foo\\bar.txt");
        assert_eq!(join("c:", "\\foo\\bar.txt"), "c:\\foo\\bar.txt");
        assert_eq!(join("c:\\foo\\", "\\bar.txt"), "c:\\foo\\bar.txt");
        assert_eq!(join("c:", ""), "c:\\");
    }

    #[test]
    fn is_file_distinguishes_files_from_directories() {
        let tmp = tempfile::TempDir::new().expect("failed to create temp dir");
        let file = tmp.path().join("probe.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(is_file(&file.to_string_lossy()));
        assert!(!is_file(&tmp.path().to_string_lossy()));
        assert!(!is_file(&tmp.path().join("missing").to_string_lossy()));
    }

    #[test]
    fn sub_folders_lists_only_directories() {
        let tmp = tempfile::TempDir::new().expect("failed to create temp dir");
        std::fs::create_dir(tmp.path().join("one")).unwrap();
        std::fs::create_dir(tmp.path().join("two")).unwrap();
        std::fs::write(tmp.path().join("not-a-dir.txt"), b"x").unwrap();

        let mut found = sub_folders(&tmp.path().to_string_lossy());
        found.sort();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("one"));
        assert!(found[1].ends_with("two"));
    }

    #[test]
    fn sub_folders_of_a_missing_root_is_empty() {
        assert!(sub_folders("definitely/does/not/exist").is_empty());
    }
}
