//! Image uploads for image search

use std::path::Path;

use crate::error::{PageError, Result};

/// Content types accepted by image search on the search pages
pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/gif"];

const WRONG_FORMAT: &str = "Vui lòng chọn đúng định dạng hình ảnh!";
const UNSUPPORTED_FORMAT: &str = "Chỉ hỗ trợ file JPG, PNG, GIF.";

/// Which files a page's image search accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRules {
    /// Home drop zone: any `image/*`, type checked before size
    AnyImage,
    /// Search pages: JPEG, PNG or GIF, size checked before type
    WebFormats,
}

/// A file picked by the visitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing the content type from its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = content_type_for(path).to_string();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn validate(&self, rules: ImageRules, max_bytes: u64) -> Result<()> {
        match rules {
            ImageRules::AnyImage => {
                self.check_type(|t| t.starts_with("image/"), WRONG_FORMAT)?;
                self.check_size(max_bytes)
            }
            ImageRules::WebFormats => {
                self.check_size(max_bytes)?;
                self.check_type(|t| ALLOWED_IMAGE_TYPES.contains(&t), UNSUPPORTED_FORMAT)
            }
        }
    }

    fn check_size(&self, max_bytes: u64) -> Result<()> {
        if self.size() > max_bytes {
            return Err(PageError::ImageRejected {
                reason: format!(
                    "Kích thước ảnh vượt quá {}MB!",
                    max_bytes / (1024 * 1024)
                ),
            });
        }
        Ok(())
    }

    fn check_type(&self, accepted: impl Fn(&str) -> bool, message: &str) -> Result<()> {
        if !accepted(self.content_type.to_ascii_lowercase().as_str()) {
            return Err(PageError::ImageRejected {
                reason: message.to_string(),
            });
        }
        Ok(())
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
