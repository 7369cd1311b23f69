//! Extension-based media classification. Derived from the filename only,
//! never from content sniffing.

/// Broad class a file falls into for relatedness decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaClass {
    Image,
    Video,
    Audio,
    Subtitle,
    Other,
}

impl MediaClass {
    /// Classes that ride in the navigation ring together.
    pub fn is_navigable(self) -> bool {
        matches!(
            self,
            MediaClass::Image | MediaClass::Video | MediaClass::Subtitle
        )
    }
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "ico", "avif", "svg", "heic",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "webm", "mkv", "avi", "mov", "wmv", "flv", "ogv", "mpg", "mpeg",
];

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "aac", "m4a"];

pub const SUBTITLE_EXTENSION: &str = "vtt";

fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn classify(name: &str) -> MediaClass {
    let Some(ext) = extension(name) else {
        return MediaClass::Other;
    };
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        MediaClass::Image
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaClass::Video
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        MediaClass::Audio
    } else if ext == SUBTITLE_EXTENSION {
        MediaClass::Subtitle
    } else {
        MediaClass::Other
    }
}

/// MIME type for a filename, or `None` for unknown extensions.
pub fn mime_for(name: &str) -> Option<&'static str> {
    let ext = extension(name)?;
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "ogv" => "video/ogg",
        "mpg" | "mpeg" => "video/mpeg",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        "vtt" => "text/vtt",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

/// Sidecar subtitle filename for a media file: `clip.mp4` -> `clip.vtt`.
pub fn sidecar_name(name: &str) -> Option<String> {
    let (stem, _) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(format!("{stem}.{SUBTITLE_EXTENSION}"))
}
