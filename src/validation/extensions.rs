//! File extensions accepted inside a package.
//!
//! Anything not listed is silently left out of the stored tree.

/// Allow-list of lowercase extensions, without the leading dot
pub const ALLOWED_FILE_EXTENSIONS: &[&str] = &[
    // package archive
    "h5p",
    // data and text
    "json", "txt", "md", "textile", "csv", "xml", "diff", "patch", "vtt", "webvtt",
    // documents
    "pdf", "rtf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp",
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "svg", "webp",
    // fonts
    "eot", "ttf", "woff", "woff2", "otf",
    // audio
    "mp3", "m4a", "wav", "ogg", "oga",
    // video
    "mp4", "webm", "ogv",
    // 3D scenes
    "gltf", "glb",
];

/// Whether `extension` may be stored.
///
/// Case-insensitive; a leading `.` is ignored.
pub fn is_extension_allowed(extension: &str) -> bool {
    let normalized = extension.strip_prefix('.').unwrap_or(extension);
    if normalized.is_empty() {
        return false;
    }
    let normalized = normalized.to_ascii_lowercase();
    ALLOWED_FILE_EXTENSIONS.contains(&normalized.as_str())
}
