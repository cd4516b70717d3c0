//! Path-safety validation for organizer inputs.

use atelier_protocol::{CoreError, CoreResult, ResourceId};

/// Project ids must match `^[a-zA-Z0-9-]{1,50}$`.
pub fn validate_project_id(project_id: &str) -> CoreResult<()> {
    if ResourceId::is_valid(project_id) {
        Ok(())
    } else {
        Err(CoreError::bad_input(format!(
            "invalid project id: {project_id:?}"
        )))
    }
}

/// Reject traversal sequences (plain or URL-encoded) and non-printable
/// characters in backend-produced file names.
pub fn validate_source_name(name: &str) -> CoreResult<()> {
    let lower = name.to_lowercase();
    if name.contains("..")
        || lower.contains("%2e")
        || lower.contains("%2f")
        || lower.contains("%5c")
        || name.starts_with('/')
        || name.contains('\\')
    {
        return Err(CoreError::bad_input(format!(
            "path traversal in file name: {name:?}"
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(CoreError::bad_input(
            "non-printable characters in file name",
        ));
    }
    if name.is_empty() {
        return Err(CoreError::bad_input("empty file name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_validation() {
        assert!(validate_project_id("tower-anime").is_ok());
        assert!(validate_project_id("general").is_ok());
        assert!(validate_project_id("p;rm -rf /").is_err());
        assert!(validate_project_id("").is_err());
    }

    #[test]
    fn test_traversal_rejected() {
        assert!(validate_source_name("anime_gen_00001_.png").is_ok());
        assert!(validate_source_name("batch/anime_gen_00002_.png").is_ok());
        assert!(validate_source_name("../../etc/passwd").is_err());
        assert!(validate_source_name("%2e%2e%2fsecrets").is_err());
        assert!(validate_source_name("/absolute/path.png").is_err());
        assert!(validate_source_name("bad\u{0}name.png").is_err());
    }
}
