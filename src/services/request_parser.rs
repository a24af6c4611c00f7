//! Adapter from the legacy object-name encoding to [`RequestDescriptor`].
//!
//! Source images are uploaded under names of the form
//!
//! ```text
//! userContainer:userFolder:imageName:fileType:size1[:size2...]:displayName
//! ```
//!
//! The trailing `displayName` is always present and always discarded.

use crate::models::request::{FileType, MAX_SIZE, MIN_SIZE, RequestDescriptor};
use std::fmt;
use thiserror::Error;

const SEPARATOR: char = ':';
const MIN_SEGMENTS: usize = 5;

/// Named identifier fields that must not be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    UserContainer,
    UserFolder,
    ImageName,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::UserContainer => "userContainer",
            Field::UserFolder => "userFolder",
            Field::ImageName => "imageName",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("source name missing")]
    MissingIdentifier,
    #[error("invalid file name: expected at least 5 parts, found {segments}")]
    MalformedIdentifier { segments: usize },
    #[error("{0} missing")]
    MissingField(Field),
    #[error("invalid file type `{0}`")]
    InvalidFileType(String),
    #[error("image sizes missing")]
    MissingSizes,
    #[error("invalid image size: `{0}`")]
    InvalidSize(String),
    #[error("source payload is empty")]
    EmptyPayload,
}

/// Parse and validate an identifier for a payload of `payload_len` bytes.
///
/// The whole request is validated before anything is returned, so a single
/// bad size rejects every size in the request.
pub fn parse_identifier(
    identifier: &str,
    payload_len: usize,
) -> Result<RequestDescriptor, ValidationError> {
    if payload_len == 0 {
        return Err(ValidationError::EmptyPayload);
    }

    let segments: Vec<&str> = identifier.split(SEPARATOR).collect();
    if segments.len() < MIN_SEGMENTS {
        return Err(ValidationError::MalformedIdentifier {
            segments: segments.len(),
        });
    }

    let user_container = required(segments[0], Field::UserContainer)?;
    let user_folder = required(segments[1], Field::UserFolder)?;
    let image_name = required(segments[2], Field::ImageName)?;
    let file_type = FileType::from_token(segments[3])
        .ok_or_else(|| ValidationError::InvalidFileType(segments[3].to_string()))?;

    // last segment is the display name
    let candidates = &segments[4..segments.len() - 1];
    if candidates.is_empty() {
        return Err(ValidationError::MissingSizes);
    }

    let sizes = candidates
        .iter()
        .map(|token| parse_size(token))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RequestDescriptor {
        user_container,
        user_folder,
        image_name,
        file_type,
        sizes,
        source_key: identifier.to_string(),
    })
}

fn required(segment: &str, field: Field) -> Result<String, ValidationError> {
    if segment.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(segment.to_string())
    }
}

fn parse_size(token: &str) -> Result<u32, ValidationError> {
    token
        .parse::<u32>()
        .ok()
        .filter(|size| (MIN_SIZE..=MAX_SIZE).contains(size))
        .ok_or_else(|| ValidationError::InvalidSize(token.to_string()))
}
