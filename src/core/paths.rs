//! Storage path convention for imported packages.
//!
//! ```text
//! <path-prefix>/
//! └── <content-id>/             # remote root of one Stored Package
//!     ├── <archive-name>.h5p    # the uploaded archive
//!     └── content/              # extracted asset tree
//! ```
//!
//! Record extras store paths relative to the prefix (`<content-id>/...`);
//! storage calls use the prefixed form. Keys always use `/` separators.

/// Name of the extracted asset directory, locally and remotely
pub const CONTENT_DIR: &str = "content";

/// Extension of package archives
pub const ARCHIVE_EXTENSION: &str = "h5p";

/// Fallback archive name when the original filename is unusable
const DEFAULT_ARCHIVE_STEM: &str = "package";

/// Join two storage key segments with a single `/`
pub fn join_key(base: &str, child: &str) -> String {
    let base = base.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, child),
    }
}

/// Remote root of a package: `<prefix>/<content-id>`
pub fn root_path(path_prefix: &str, content_id: &str) -> String {
    join_key(path_prefix, content_id)
}

/// Archive location below a root
pub fn archive_path(root: &str, archive_name: &str) -> String {
    join_key(root, archive_name)
}

/// Asset tree location below a root
pub fn content_path(root: &str) -> String {
    join_key(root, CONTENT_DIR)
}

/// Last segment of a storage key
pub fn key_file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Derive the staged archive name from a client-supplied filename.
///
/// Only the base name is kept, and the `.h5p` extension is appended when
/// missing so the archive itself passes the extension filter.
pub fn archive_file_name(original_filename: &str) -> String {
    let base = original_filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    let base = match base {
        "" | "." | ".." => DEFAULT_ARCHIVE_STEM,
        other => other,
    };

    let has_extension = base
        .rsplit_once('.')
        .map(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
        .unwrap_or(false);

    if has_extension {
        base.to_string()
    } else {
        format!("{}.{}", base, ARCHIVE_EXTENSION)
    }
}

/// Truncate a display name to at most `max_chars` characters
pub fn truncate_name(name: &str, max_chars: usize) -> String {
    name.chars().take(max_chars).collect()
}

/// Name given to a copied record, at most `max_chars` characters.
///
/// The suffix goes before the extension. When the result would be too long
/// the stem is shortened so the suffix and extension survive; only a limit
/// shorter than those falls back to plain truncation.
pub fn duplicate_name(name: &str, suffix: &str, max_chars: usize) -> String {
    let (stem, tail) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!("{}.{}", suffix, ext)),
        _ => (name, suffix.to_string()),
    };

    let tail_chars = tail.chars().count();
    if tail_chars > max_chars {
        return truncate_name(&format!("{}{}", stem, tail), max_chars);
    }
    format!("{}{}", truncate_name(stem, max_chars - tail_chars), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("prefix", "id"), "prefix/id");
        assert_eq!(join_key("prefix/", "/id"), "prefix/id");
        assert_eq!(join_key("", "id"), "id");
        assert_eq!(join_key("prefix", ""), "prefix");
    }

    #[test]
    fn test_package_layout() {
        let root = root_path("h5p-content", "1234");
        assert_eq!(root, "h5p-content/1234");
        assert_eq!(archive_path(&root, "a.h5p"), "h5p-content/1234/a.h5p");
        assert_eq!(content_path(&root), "h5p-content/1234/content");
        assert_eq!(content_path("1234"), "1234/content");
        assert_eq!(key_file_name("h5p-content/1234/a.h5p"), "a.h5p");
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(archive_file_name("accordion-6-7138.h5p"), "accordion-6-7138.h5p");
        assert_eq!(archive_file_name("ACCORDION.H5P"), "ACCORDION.H5P");
        assert_eq!(archive_file_name("/tmp/uploads/quiz.h5p"), "quiz.h5p");
        assert_eq!(archive_file_name("C:\\Users\\me\\quiz.h5p"), "quiz.h5p");
        assert_eq!(archive_file_name("quiz.zip"), "quiz.zip.h5p");
        assert_eq!(archive_file_name("../.."), "package.h5p");
        assert_eq!(archive_file_name(""), "package.h5p");
        assert_eq!(archive_file_name(".h5p"), ".h5p.h5p");
    }

    #[test]
    fn test_truncate_name_counts_chars() {
        assert_eq!(truncate_name("abcdef", 3), "abc");
        assert_eq!(truncate_name("ééé", 2), "éé");
        assert_eq!(truncate_name("ab", 10), "ab");
    }

    #[test]
    fn test_duplicate_name() {
        assert_eq!(duplicate_name("accordion.h5p", " (copy)", 100), "accordion (copy).h5p");
        assert_eq!(duplicate_name("Accordion", " (copy)", 100), "Accordion (copy)");
        assert_eq!(duplicate_name(".hidden", " (copy)", 100), ".hidden (copy)");
    }

    #[test]
    fn test_duplicate_name_shortens_stem_at_limit() {
        let name = "xabcdefghijklmno.h5p";
        assert_eq!(name.chars().count(), 20);

        let copy = duplicate_name(name, " (copy)", 20);
        assert_eq!(copy, "xabcdefgh (copy).h5p");
        assert_eq!(copy.chars().count(), 20);

        assert_eq!(duplicate_name("ééééé", " (copy)", 9), "éé (copy)");
        // Limit too small for suffix and extension
        assert_eq!(duplicate_name("quiz.h5p", " (copy)", 5), "quiz ");
    }
}
