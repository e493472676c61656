use crate::error::{Error, Result};

/// Both title and content must be non-blank.
pub fn validate_title_and_content(title: &str, content: &str) -> Result<()> {
    if title.trim().is_empty() || content.trim().is_empty() {
        return Err(Error::BadRequest("Title and content required".to_string()));
    }

    Ok(())
}

/// Blank cover images are treated as absent.
pub fn normalize_cover_image(cover_image: Option<String>) -> Option<String> {
    cover_image.filter(|c| !c.trim().is_empty())
}
