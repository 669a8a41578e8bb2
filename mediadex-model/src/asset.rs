use chrono::{DateTime, Utc};

/// Extensions classified as images.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "avif", "svg", "bmp", "ico", "tif",
    "tiff",
];

/// Extensions classified as video.
pub const VIDEO_EXTENSIONS: &[&str] =
    &["mp4", "webm", "mov", "m4v", "ogv", "avi", "mkv", "mpg", "mpeg"];

/// Extensions classified as downloadable documents.
pub const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "csv", "txt", "zip",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AssetType {
    Image,
    Video,
    Document,
    #[default]
    Unknown,
}

impl AssetType {
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            AssetType::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            AssetType::Video
        } else if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
            AssetType::Document
        } else {
            AssetType::Unknown
        }
    }

    /// Classifies a source URL by the extension of its path component.
    pub fn from_src(src: &str) -> Self {
        media_extension(src)
            .as_deref()
            .map(Self::from_extension)
            .unwrap_or_default()
    }
}

/// Returns the lowercase file extension of a URL or path, ignoring query
/// strings and fragments.
pub fn media_extension(src: &str) -> Option<String> {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    let file = path.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Names the extraction rule that produced a fragment. Only used for
/// grouping by presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum AssetContext {
    Image,
    PictureSource,
    InlineStyle,
    StyleBlock,
    VideoSource,
    VideoPoster,
    AudioSource,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// One media reference found in one document, before it is merged into the
/// index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AssetFragment {
    pub src: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub alt: String,
    pub used_in: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_external: bool,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub dimensions: Option<Dimensions>,
    pub context: AssetContext,
}

impl AssetFragment {
    pub fn new(
        src: impl Into<String>,
        document_path: impl Into<String>,
        context: AssetContext,
    ) -> Self {
        Self {
            src: src.into(),
            alt: String::new(),
            used_in: vec![document_path.into()],
            is_external: false,
            dimensions: None,
            context,
        }
    }

    pub fn with_alt(mut self, alt: impl Into<String>) -> Self {
        self.alt = alt.into();
        self
    }

    pub fn with_dimensions(mut self, dimensions: Option<Dimensions>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn external(mut self, is_external: bool) -> Self {
        self.is_external = is_external;
        self
    }

    /// Per-document dedup key: `(src, used_in[0])`.
    pub fn dedup_key(&self) -> (&str, Option<&str>) {
        (self.src.as_str(), self.used_in.first().map(String::as_str))
    }
}

/// Deduplicated entry of the asset index. Identity is the normalized `src`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AssetRecord {
    pub id: String,
    pub src: String,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub asset_type: AssetType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub alt: String,
    pub used_in: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_external: bool,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub dimensions: Option<Dimensions>,
    pub context: AssetContext,
    pub last_seen_at: DateTime<Utc>,
}

impl AssetRecord {
    /// Human readable name derived from the last path segment of `src`.
    pub fn name_from_src(src: &str) -> String {
        let path = src.split(['?', '#']).next().unwrap_or(src);
        path.trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or(src)
            .to_string()
    }
}
