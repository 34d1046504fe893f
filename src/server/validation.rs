use crate::server::response::ApiError;

const MAX_UID_LEN: usize = 128;
const MAX_DISPLAY_NAME_LEN: usize = 100;
const MAX_TITLE_LEN: usize = 200;

fn is_valid_uid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

pub fn validate_uid(uid: &str) -> Result<(), ApiError> {
    if uid.is_empty() {
        return Err(ApiError::bad_request("Identity uid cannot be empty"));
    }
    if uid.len() > MAX_UID_LEN {
        return Err(ApiError::bad_request(format!(
            "Identity uid cannot exceed {MAX_UID_LEN} characters"
        )));
    }
    if !uid.chars().all(is_valid_uid_char) {
        return Err(ApiError::bad_request(
            "Identity uid can only contain alphanumeric characters, hyphens, underscores, and periods",
        ));
    }
    Ok(())
}

pub fn validate_display_name(name: &str) -> Result<(), ApiError> {
    if name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Display name cannot exceed {MAX_DISPLAY_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::bad_request(format!(
            "Title cannot exceed {MAX_TITLE_LEN} characters"
        )));
    }
    if title.chars().any(char::is_control) {
        return Err(ApiError::bad_request("Title cannot contain control characters"));
    }
    Ok(())
}
