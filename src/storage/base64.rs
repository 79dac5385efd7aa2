//! Base64 and data-URL decoding for uploaded images

use base64::{engine::general_purpose::STANDARD, Engine};
use crate::error::{AppError, Result};

/// Decoded upload payload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUpload {
    pub data: Vec<u8>,
    /// MIME type declared by a data URL prefix
    pub declared_type: Option<String>,
}

/// Decode plain base64 or a `data:<mime>;base64,<payload>` URL
pub fn decode_upload(encoded: &str) -> Result<DecodedUpload> {
    let declared_type = mime_from_data_url(encoded).map(str::to_string);
    let data = decode(encoded)?;
    Ok(DecodedUpload { data, declared_type })
}

/// Decode base64 string to binary data
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    let data = match encoded.split_once(',') {
        Some((_, payload)) if encoded.starts_with("data:") => payload,
        _ => encoded,
    };

    STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::InvalidRequest(format!("Invalid base64 data: {}", e)))
}

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Get the MIME type from a data URL prefix
pub fn mime_from_data_url(data_url: &str) -> Option<&str> {
    let rest = data_url.strip_prefix("data:")?;
    let end = rest.find(|c| c == ';' || c == ',')?;
    let mime = &rest[..end];
    if mime.is_empty() {
        None
    } else {
        Some(mime)
    }
}
