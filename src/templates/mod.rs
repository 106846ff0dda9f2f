//! Template upload requests: users send a `.pptx` that is stored for manual
//! review.

pub mod multipart;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const PPTX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MAX_FILE_SIZE_MB: usize = 50;
pub const MAX_FILE_SIZE_BYTES: usize = MAX_FILE_SIZE_MB * 1024 * 1024;
pub const REQUESTS_DIR: &str = "template_requests";
pub const UPLOAD_MESSAGE: &str = "Upload successful. We are processing your template.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRequestResponse {
    pub success: bool,
    pub message: String,
    pub filename: String,
}

pub fn requests_directory(data_dir: &Path) -> PathBuf {
    data_dir.join(REQUESTS_DIR)
}

pub fn validate_upload(
    filename: Option<&str>,
    content_type: Option<&str>,
    data: &[u8],
) -> Result<(), ApiError> {
    let has_pptx_name = filename.is_some_and(|name| name.to_lowercase().ends_with(".pptx"));
    if !has_pptx_name {
        return Err(ApiError::bad_request(
            "Invalid file type. Only .pptx files are accepted.",
        ));
    }
    if content_type != Some(PPTX_CONTENT_TYPE) {
        return Err(ApiError::bad_request(format!(
            "Invalid content type. Only PPTX files are accepted. Received: {}",
            content_type.unwrap_or("None")
        )));
    }
    if data.len() > MAX_FILE_SIZE_BYTES {
        return Err(ApiError::bad_request(format!(
            "File too large. Maximum size is {MAX_FILE_SIZE_MB}MB."
        )));
    }
    if data.is_empty() {
        return Err(ApiError::bad_request("File is empty."));
    }
    Ok(())
}

/// Keeps the base name and drops anything but alphanumerics and `._- `.
pub fn sanitise_filename(original: &str) -> String {
    let base = original.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(original);
    base.chars()
        .filter(|c| c.is_alphanumeric() || "._- ".contains(*c))
        .collect()
}

pub fn timestamped_filename(original: &str, now: DateTime<Local>) -> String {
    format!("{}_{}", now.format("%Y%m%d_%H%M"), sanitise_filename(original))
}

pub fn store_template_request(
    data_dir: &Path,
    filename: Option<&str>,
    content_type: Option<&str>,
    data: &[u8],
    now: DateTime<Local>,
) -> Result<TemplateRequestResponse> {
    validate_upload(filename, content_type, data)?;
    let stored_name = timestamped_filename(filename.unwrap_or_default(), now);
    let directory = requests_directory(data_dir);
    fs::create_dir_all(&directory)
        .and_then(|_| fs::write(directory.join(&stored_name), data))
        .map_err(|err| ApiError::internal(format!("Failed to save file: {err}")))?;
    Ok(TemplateRequestResponse {
        success: true,
        message: UPLOAD_MESSAGE.to_string(),
        filename: stored_name,
    })
}

/// Handles a raw `multipart/form-data` request whose `file` part carries the
/// template.
pub fn handle_upload(
    data_dir: &Path,
    content_type: &str,
    body: &[u8],
) -> Result<TemplateRequestResponse> {
    let boundary = multipart::boundary(content_type)
        .ok_or_else(|| ApiError::unprocessable("Expected a multipart/form-data body"))?;
    let parts = multipart::parse(body, &boundary)
        .map_err(|err| ApiError::unprocessable(format!("Malformed multipart body: {err}")))?;
    let file = parts
        .into_iter()
        .find(|part| part.name == "file")
        .ok_or_else(|| ApiError::unprocessable("Field required: file"))?;
    store_template_request(
        data_dir,
        file.filename.as_deref(),
        file.content_type.as_deref(),
        &file.data,
        Local::now(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn status(result: Result<(), ApiError>) -> u16 {
        result.err().map(|e| e.status).unwrap_or(200)
    }

    #[test]
    fn validates_name_type_and_size() {
        assert_eq!(status(validate_upload(Some("a.PPTX"), Some(PPTX_CONTENT_TYPE), b"x")), 200);
        let err = validate_upload(Some("a.pdf"), Some(PPTX_CONTENT_TYPE), b"x").unwrap_err();
        assert_eq!(err.detail, "Invalid file type. Only .pptx files are accepted.");
        let err = validate_upload(Some("a.pptx"), Some("application/zip"), b"x").unwrap_err();
        assert!(err.detail.ends_with("Received: application/zip"));
        let err = validate_upload(Some("a.pptx"), Some(PPTX_CONTENT_TYPE), b"").unwrap_err();
        assert_eq!(err.detail, "File is empty.");
        assert_eq!(status(validate_upload(None, Some(PPTX_CONTENT_TYPE), b"x")), 400);
    }

    #[test]
    fn names_are_sanitised_and_stamped() {
        assert_eq!(sanitise_filename("../../etc/开学 典礼(v2).pptx"), "开学 典礼v2.pptx");
        assert_eq!(sanitise_filename("C:\\Users\\me\\deck.pptx"), "deck.pptx");
        let now = Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(timestamped_filename("deck.pptx", now), "20250307_0905_deck.pptx");
    }

    #[test]
    fn stores_under_requests_directory() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 0).unwrap();
        let response = store_template_request(
            dir.path(),
            Some("deck.pptx"),
            Some(PPTX_CONTENT_TYPE),
            b"PK\x03\x04",
            now,
        )
        .unwrap();
        assert_eq!(response.filename, "20250307_0905_deck.pptx");
        assert_eq!(response.message, UPLOAD_MESSAGE);
        let stored = fs::read(requests_directory(dir.path()).join(&response.filename)).unwrap();
        assert_eq!(stored, b"PK\x03\x04");
    }
}
