use anyhow::{Result, anyhow};

/// Longest accepted file type, dot included
pub const MAX_FILE_TYPE_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates the declared file type before it becomes part of an on-disk name.
///
/// Accepts an empty type (no extension) or an optional dot followed by ASCII
/// letters, digits, `-`, `_` and inner dots, such as `.json`, `.tar.gz` or
/// `json`. Anything that could leave the upload directory is rejected.
pub fn validate_file_type(file_type: &str) -> Result<()> {
    if file_type.is_empty() {
        return Ok(());
    }

    if file_type.len() > MAX_FILE_TYPE_LEN {
        return Err(anyhow!(ValidationError {
            code: "FILE_TYPE_TOO_LONG",
            message: format!(
                "File type is {} bytes, maximum is {}",
                file_type.len(),
                MAX_FILE_TYPE_LEN
            ),
        }));
    }

    // A missing leading dot is allowed; the type is appended verbatim.
    let rest = file_type.strip_prefix('.').unwrap_or(file_type);

    let well_formed = !rest.is_empty()
        && !rest.starts_with('.')
        && !rest.ends_with('.')
        && !rest.contains("..")
        && rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));

    if !well_formed {
        tracing::warn!("Rejected file type: {:?}", file_type);
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILE_TYPE",
            message: format!("File type '{}' contains unsupported characters", file_type),
        }));
    }

    Ok(())
}
