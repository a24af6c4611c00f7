//! Structured resize request.
//!
//! Workers only ever see a [`RequestDescriptor`]. How it was encoded on the
//! wire (today: a colon-delimited object name, see
//! `services::request_parser`) is the parser's business.

use serde::{Deserialize, Serialize};

/// Smallest accepted derivative width in pixels.
pub const MIN_SIZE: u32 = 16;
/// Largest accepted derivative width in pixels.
pub const MAX_SIZE: u32 = 4096;

/// Output encoding of every derivative in a request.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Png,
    Jpg,
}

impl FileType {
    /// Parse the wire token. Matching is case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpg),
            _ => None,
        }
    }

    /// File extension used in destination keys.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
        }
    }

    /// MIME type stored as the derivative's content type.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpg => image::ImageFormat::Jpeg,
        }
    }
}

/// A validated request to produce one derivative per entry in `sizes`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Container receiving the derivatives.
    pub user_container: String,

    /// Folder (key prefix) inside `user_container`.
    pub user_folder: String,

    /// Base name shared by all derivatives.
    pub image_name: String,

    pub file_type: FileType,

    /// Requested widths, in the order they were given. Never empty.
    pub sizes: Vec<u32>,

    /// Key of the source object in the raw-uploads container.
    pub source_key: String,
}

impl RequestDescriptor {
    /// Destination key of the derivative with the given width.
    pub fn destination_key(&self, size: u32) -> String {
        format!(
            "{}/{}-{}.{}",
            self.user_folder,
            self.image_name,
            size,
            self.file_type.extension()
        )
    }

    /// Sizes in processing order: largest first.
    pub fn sizes_descending(&self) -> Vec<u32> {
        let mut sizes = self.sizes.clone();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes
    }
}
