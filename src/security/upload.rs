//! Upload metadata checks against the image policy.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::ValidationError;

/// Default upload size limit (15 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 15 * 1024 * 1024;

pub const DEFAULT_MIME_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

pub const DEFAULT_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_mime_types: Vec<String>,
    /// Lowercase, with the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            allowed_mime_types: DEFAULT_MIME_TYPES.iter().map(|s| s.to_string()).collect(),
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// What the uploader declared about a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
}

impl ImageMeta {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }

    /// Metadata for a file on disk. The MIME type is guessed from the
    /// extension, the way a browser fills in `File.type`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to read metadata for {}", path.display()))?;
        if !metadata.is_file() {
            anyhow::bail!("{} is not a regular file", path.display());
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();

        Ok(Self {
            name,
            mime_type,
            size: metadata.len(),
        })
    }

    /// Everything after the last `.`, lowercased, with a leading dot.
    /// A name without a dot yields the whole name.
    pub fn extension(&self) -> String {
        let last = self.name.rsplit('.').next().unwrap_or_default();
        format!(".{}", last.to_lowercase())
    }
}

/// Every violation found, not only the first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

impl Serialize for ValidationReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ValidationReport", 2)?;
        s.serialize_field("valid", &self.valid)?;
        s.serialize_field("errors", &self.messages())?;
        s.end()
    }
}

pub fn validate_image_file(meta: &ImageMeta, policy: &UploadPolicy) -> ValidationReport {
    let mut errors = Vec::new();

    let mime_type = meta.mime_type.trim();
    if !policy
        .allowed_mime_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(mime_type))
    {
        errors.push(ValidationError::BadType {
            mime_type: meta.mime_type.clone(),
        });
    }

    if meta.size > policy.max_bytes {
        errors.push(ValidationError::BadSize {
            size: meta.size,
            max: policy.max_bytes,
        });
    }

    let extension = meta.extension();
    if !policy.allowed_extensions.contains(&extension) {
        errors.push(ValidationError::BadExtension { extension });
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}
