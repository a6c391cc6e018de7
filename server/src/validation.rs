use crate::error::ApiError;

/// Smallest accepted delivery chunk, in bytes
pub const MIN_CHUNK_SIZE: usize = 1024;
/// Largest accepted delivery chunk, in bytes
pub const MAX_CHUNK_SIZE: usize = 8192;

/// Validate TTS request
pub fn validate_tts_request(
    text: &str,
    language: Option<&str>,
    chunk_size: Option<usize>,
    max_text_length: usize,
) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > max_text_length {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            max_text_length
        )));
    }

    if let Some(lang) = language {
        if !is_valid_language_code(lang) {
            return Err(ApiError::InvalidInput(format!(
                "Invalid language code format: {}. Expected ll, ll_CC or ll-cc (e.g., en, en_US, pt-br)",
                lang
            )));
        }
    }

    if let Some(size) = chunk_size {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&size) {
            return Err(ApiError::InvalidInput(format!(
                "chunk_size must be between {} and {} bytes",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
    }

    Ok(())
}

/// Validate language code format (e.g., en, en_US, pt-br)
fn is_valid_language_code(code: &str) -> bool {
    let mut parts = code.split(['_', '-']);
    let primary = parts.next().unwrap_or_default();
    if primary.len() != 2 || !primary.chars().all(|c| c.is_ascii_lowercase()) {
        return false;
    }
    match (parts.next(), parts.next()) {
        (None, _) => true,
        (Some(region), None) => {
            region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic())
        }
        _ => false,
    }
}
