//! Media library storage: uploaded images on disk plus resized variants.
//! Database bookkeeping is done by the editor handlers.

use crate::settings::{MediaSettings, SizeBox};
use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde_json::{Map, Value as JsonValue, json};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/bmp",
    "image/tiff",
];

pub const VARIANT_NAMES: [&str; 3] = ["thumbnail", "medium", "large"];

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Media task failed: {0}")]
    Task(String),
}

pub fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime)
}

/// Keeps ASCII alphanumerics and `.-_`, lowercased. A name with nothing left
/// gets a random 8-hex stem.
pub fn sanitize_filename(original: &str) -> String {
    let cleaned: String = original
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() {
        let stem = Uuid::new_v4().simple().to_string();
        return format!("{}.bin", &stem[..8]);
    }
    cleaned
}

fn split_name(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => filename.split_at(idx),
        _ => (filename, ""),
    }
}

/// Writes `bytes` to the first of `name`, `stem-1.ext`, `stem-2.ext`, ...
/// that does not exist yet in `dir` and returns the name used. The file is
/// created exclusively, so concurrent writers never share a name.
pub fn write_unique(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<String> {
    let (stem, ext) = split_name(name);
    let mut candidate = name.to_string();
    let mut counter = 1;
    loop {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&candidate))
        {
            Ok(mut file) => {
                file.write_all(bytes)?;
                return Ok(candidate);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                candidate = format!("{}-{}{}", stem, counter, ext);
                counter += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Rejects absolute paths and any `..` so stored URLs cannot escape the root.
fn safe_relative(rel: &str) -> Option<PathBuf> {
    let path = Path::new(rel);
    let normal = path.components().all(|c| matches!(c, Component::Normal(_)));
    (normal && !rel.is_empty()).then(|| path.to_path_buf())
}

#[derive(Debug, Clone)]
pub struct StoredMedia {
    /// Path relative to the uploads root, e.g. `2025/06/cat.png`.
    pub filename: String,
    pub url: String,
    pub size: u64,
    pub metadata: JsonValue,
}

impl StoredMedia {
    pub fn variants(&self) -> JsonValue {
        variant_urls(&self.metadata)
    }
}

/// `{thumbnail, medium, large}` mapped to variant URLs, `null` when absent.
pub fn variant_urls(metadata: &JsonValue) -> JsonValue {
    let mut out = Map::new();
    for name in VARIANT_NAMES {
        let url = metadata
            .pointer(&format!("/sizes/{}/file_path", name))
            .cloned()
            .unwrap_or(JsonValue::Null);
        out.insert(name.to_string(), url);
    }
    JsonValue::Object(out)
}

#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
    url_prefix: String,
}

impl MediaLibrary {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    fn url_for(&self, relative: &str) -> String {
        format!("{}/{}", self.url_prefix, relative)
    }

    fn disk_path_for_url(&self, url: &str) -> Option<PathBuf> {
        let rel = url.strip_prefix(&self.url_prefix)?.trim_start_matches('/');
        safe_relative(rel).map(|p| self.root.join(p))
    }

    /// Stores an upload and its size variants off the async runtime.
    pub async fn store(
        &self,
        original_name: String,
        mime_type: String,
        bytes: Vec<u8>,
        settings: MediaSettings,
    ) -> Result<StoredMedia, MediaError> {
        let library = self.clone();
        let now = Utc::now();
        tokio::task::spawn_blocking(move || {
            library.store_blocking(&original_name, &mime_type, &bytes, &settings, now)
        })
        .await
        .map_err(|e| MediaError::Task(e.to_string()))?
    }

    pub fn store_blocking(
        &self,
        original_name: &str,
        mime_type: &str,
        bytes: &[u8],
        settings: &MediaSettings,
        now: DateTime<Utc>,
    ) -> Result<StoredMedia, MediaError> {
        let subdir = if settings.organize {
            now.format("%Y/%m").to_string()
        } else {
            String::new()
        };
        let dir = self.root.join(&subdir);
        fs::create_dir_all(&dir)?;

        let disk_name = write_unique(&dir, &sanitize_filename(original_name), bytes)?;
        let relative = if subdir.is_empty() {
            disk_name.clone()
        } else {
            format!("{}/{}", subdir, disk_name)
        };
        info!("Stored upload '{}' as {}", original_name, relative);

        let mut metadata = Map::new();
        metadata.insert("sizes".to_string(), json!({}));

        match image::load_from_memory(bytes) {
            Ok(img) => {
                let (width, height) = img.dimensions();
                metadata.insert("width".to_string(), json!(width));
                metadata.insert("height".to_string(), json!(height));
                let format = image::guess_format(bytes).ok();
                match self.write_variants(&img, format, &dir, &subdir, &disk_name, mime_type, settings)
                {
                    Ok(sizes) => {
                        metadata.insert("sizes".to_string(), JsonValue::Object(sizes));
                    }
                    Err(err) => {
                        warn!("Could not write variants for {}: {}", relative, err);
                        metadata.insert("error".to_string(), json!(err.to_string()));
                    }
                }
            }
            Err(err) => {
                debug!("Upload {} is not a decodable raster image: {}", relative, err);
                metadata.insert("error".to_string(), json!(err.to_string()));
            }
        }

        Ok(StoredMedia {
            url: self.url_for(&relative),
            filename: relative,
            size: bytes.len() as u64,
            metadata: JsonValue::Object(metadata),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn write_variants(
        &self,
        img: &DynamicImage,
        format: Option<ImageFormat>,
        dir: &Path,
        subdir: &str,
        disk_name: &str,
        mime_type: &str,
        settings: &MediaSettings,
    ) -> image::ImageResult<Map<String, JsonValue>> {
        let (stem, ext) = split_name(disk_name);
        let boxes = [
            ("thumbnail", settings.thumbnail, settings.thumbnail_crop),
            ("medium", settings.medium, false),
            ("large", settings.large, false),
        ];

        let mut sizes = Map::new();
        for (name, size_box, crop) in boxes {
            let Some(resized) = resize_variant(img, size_box, crop) else {
                continue;
            };
            let (w, h) = resized.dimensions();
            let file = format!("{}-{}x{}{}", stem, w, h, ext);
            save_variant(&resized, format, &dir.join(&file))?;

            let relative = if subdir.is_empty() {
                file.clone()
            } else {
                format!("{}/{}", subdir, file)
            };
            sizes.insert(
                name.to_string(),
                json!({
                    "file": file,
                    "width": w,
                    "height": h,
                    "mime_type": mime_type,
                    "file_path": self.url_for(&relative),
                }),
            );
        }
        Ok(sizes)
    }

    /// Removes the original file and every variant listed in `metadata`.
    /// Files already gone are skipped.
    pub fn remove(&self, url: &str, metadata: &JsonValue) -> Result<usize, MediaError> {
        let mut urls = vec![url.to_string()];
        if let Some(sizes) = metadata.get("sizes").and_then(JsonValue::as_object) {
            urls.extend(
                sizes
                    .values()
                    .filter_map(|s| s.get("file_path").and_then(JsonValue::as_str))
                    .map(str::to_string),
            );
        }

        let mut removed = 0;
        for url in urls {
            let Some(path) = self.disk_path_for_url(&url) else {
                warn!("Refusing to delete media outside the uploads root: {}", url);
                continue;
            };
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!("Media file {:?} already absent", path);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(removed)
    }
}

/// `None` when the image already fits and no crop is requested.
fn resize_variant(img: &DynamicImage, size_box: SizeBox, crop: bool) -> Option<DynamicImage> {
    let (width, height) = img.dimensions();
    if crop {
        return Some(img.resize_to_fill(size_box.width, size_box.height, FilterType::Lanczos3));
    }
    if width > size_box.width || height > size_box.height {
        return Some(img.resize(size_box.width, size_box.height, FilterType::Lanczos3));
    }
    None
}

fn save_variant(img: &DynamicImage, format: Option<ImageFormat>, path: &Path) -> image::ImageResult<()> {
    match format {
        Some(ImageFormat::Png) => img.save_with_format(path, ImageFormat::Png),
        Some(ImageFormat::Gif) => img.save_with_format(path, ImageFormat::Gif),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()).save_with_format(path, ImageFormat::Jpeg),
    }
}
