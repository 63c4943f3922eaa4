pub mod application;
pub mod decision;
pub mod request;

use crate::errors::AppError;

/// Application names and approver identities are compared lowercased and trimmed.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// `:white_check_mark:`, `White_Check_Mark` and ` white_check_mark ` are one emoji.
pub fn normalize_emoji(raw: &str) -> String {
    raw.trim().trim_matches(':').trim().to_lowercase()
}

/// Callback URLs must be absolute http(s) URLs.
pub fn validate_callback_url(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("callback_url is required".into()));
    }
    let url = url::Url::parse(trimmed)
        .map_err(|e| AppError::Validation(format!("callback_url is not a valid URL: {}", e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::Validation(
            "callback_url must use http or https".into(),
        ));
    }
    Ok(trimmed.to_string())
}
