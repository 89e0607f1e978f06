//! Materialized-path rules and file-type inference.
//!
//! Paths are absolute, `/`-separated, and denormalized onto every item row so
//! subtree enumerations stay cheap prefix queries.

use crate::error::{DriveError, DriveResult};
use crate::model::ItemKind;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "ico", "heic", "heif", "avif", "tiff",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts", "3gp",
];

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "ogg", "m4a", "wma", "opus", "aiff",
];

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "zst", "iso"];

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "go", "py", "js", "ts", "jsx", "tsx", "java", "c", "cpp", "h", "hpp", "cs", "rb", "php",
    "swift", "kt", "sh", "sql", "html", "css", "json", "yaml", "yml", "toml", "xml", "md",
];

/// Join a parent path and a child name into an absolute path.
///
/// The root parent is either `/` or the empty string; in both cases the
/// result is `/` followed by the trimmed name.
#[must_use]
pub fn join_path(parent: &str, name: &str) -> String {
    let name = name.trim();
    if parent.is_empty() || parent == "/" {
        format!("/{}", name.trim_start_matches('/'))
    } else {
        format!(
            "{}/{}",
            parent.trim_end_matches('/'),
            name.trim_start_matches('/')
        )
    }
}

/// Validate a caller-supplied path prefix.
///
/// # Errors
///
/// Returns [`DriveError::BadInput`] when the prefix does not start with `/`.
pub fn validate_prefix(prefix: &str) -> DriveResult<()> {
    if prefix.starts_with('/') {
        Ok(())
    } else {
        Err(DriveError::bad_input(format!(
            "path prefix must start with '/': {prefix}"
        )))
    }
}

/// Whether `path` names `ancestor` itself or one of its descendants.
#[must_use]
pub fn is_within(ancestor: &str, path: &str) -> bool {
    if ancestor == "/" {
        return path.starts_with('/');
    }
    path == ancestor || (path.starts_with(ancestor) && path[ancestor.len()..].starts_with('/'))
}

/// Split a file name into `(base, extension)` where the extension includes
/// its leading dot. A dot at index zero does not start an extension.
#[must_use]
pub fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

/// Escape `LIKE` metacharacters so a path can be used as a literal prefix.
#[must_use]
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Infer the item kind from a file name, falling back to the MIME prefix.
#[must_use]
pub fn guess_item_kind(name: &str, mime: Option<&str>) -> ItemKind {
    let (_, ext) = split_name(name);
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    if !ext.is_empty() {
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return ItemKind::Image;
        }
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            return ItemKind::Video;
        }
        if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            return ItemKind::Audio;
        }
        if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
            return ItemKind::Archive;
        }
        if CODE_EXTENSIONS.contains(&ext.as_str()) {
            return ItemKind::Code;
        }
    }
    match mime {
        Some(mime) if mime.starts_with("image/") => ItemKind::Image,
        Some(mime) if mime.starts_with("video/") => ItemKind::Video,
        Some(mime) if mime.starts_with("audio/") => ItemKind::Audio,
        _ => ItemKind::Document,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_root_and_nested_parents() {
        assert_eq!(join_path("/", "photo.jpg"), "/photo.jpg");
        assert_eq!(join_path("", "photo.jpg"), "/photo.jpg");
        assert_eq!(join_path("/docs", "report.pdf"), "/docs/report.pdf");
        assert_eq!(join_path("/docs/", "/report.pdf"), "/docs/report.pdf");
        assert_eq!(join_path("/docs", "  spaced  "), "/docs/spaced");
    }

    #[test]
    fn prefix_validation_requires_leading_slash() {
        assert!(validate_prefix("/a/b").is_ok());
        assert!(matches!(
            validate_prefix("a/b"),
            Err(DriveError::BadInput { .. })
        ));
    }

    #[test]
    fn subtree_membership_respects_component_boundaries() {
        assert!(is_within("/a", "/a"));
        assert!(is_within("/a", "/a/b/c"));
        assert!(!is_within("/a", "/ab"));
        assert!(!is_within("/a/b", "/a"));
        assert!(is_within("/", "/anything"));
    }

    #[test]
    fn split_name_keeps_leading_dot_files_whole() {
        assert_eq!(split_name("report.pdf"), ("report", ".pdf"));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_name(".bashrc"), (".bashrc", ""));
        assert_eq!(split_name("README"), ("README", ""));
    }

    #[test]
    fn like_escaping_covers_metacharacters() {
        assert_eq!(escape_like("/a_b%c\\d"), "/a\\_b\\%c\\\\d");
        assert_eq!(escape_like("/plain"), "/plain");
    }

    #[test]
    fn kind_inference_prefers_extension_then_mime() {
        assert_eq!(guess_item_kind("clip.MP4", None), ItemKind::Video);
        assert_eq!(guess_item_kind("photo.png", None), ItemKind::Image);
        assert_eq!(guess_item_kind("song.flac", None), ItemKind::Audio);
        assert_eq!(guess_item_kind("bundle.tar", None), ItemKind::Archive);
        assert_eq!(guess_item_kind("main.rs", None), ItemKind::Code);
        assert_eq!(
            guess_item_kind("unknown.bin", Some("video/x-matroska")),
            ItemKind::Video
        );
        assert_eq!(guess_item_kind("notes", None), ItemKind::Document);
    }
}
