use crate::TransferError;

/// Longest file name written to disk, in characters.
pub const MAX_FILE_NAME_LEN: usize = 200;

/// Turns an announced file name into one that is safe to create inside the
/// download directory.
///
/// - Any directory part is stripped (both `/` and `\` separators).
/// - Characters outside `[A-Za-z0-9-_. ]` become `_`.
/// - The result is cut to [`MAX_FILE_NAME_LEN`] characters.
///
/// Rejects names that end up empty or consist only of dots (`.`, `..`).
pub fn sanitize_file_name(name: &str) -> Result<String, TransferError> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Err(TransferError::InvalidPath(format!("empty file name: {name:?}")));
    }
    if trimmed.chars().all(|c| c == '.') {
        return Err(TransferError::InvalidPath(format!(
            "directory reference not allowed: {name:?}"
        )));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("   ").is_err());
    }

    #[test]
    fn rejects_dot_names() {
        assert!(sanitize_file_name(".").is_err());
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name("../..").is_err());
    }

    #[test]
    fn strips_parent_dir_traversal() {
        assert_eq!(sanitize_file_name("../../../etc/passwd").unwrap(), "passwd");
    }

    #[test]
    fn strips_absolute_unix_path() {
        assert_eq!(sanitize_file_name("/tmp/malicious").unwrap(), "malicious");
    }

    #[test]
    fn strips_windows_path() {
        assert_eq!(sanitize_file_name("C:\\Windows\\evil.dll").unwrap(), "evil.dll");
    }

    #[test]
    fn accepts_simple_filename() {
        assert_eq!(sanitize_file_name("report 2024.pdf").unwrap(), "report 2024.pdf");
    }

    #[test]
    fn accepts_dotfile() {
        assert_eq!(sanitize_file_name(".bashrc").unwrap(), ".bashrc");
    }

    #[test]
    fn replaces_disallowed_characters() {
        assert_eq!(sanitize_file_name("a:b*c?.txt").unwrap(), "a_b_c_.txt");
        assert_eq!(sanitize_file_name("café.png").unwrap(), "caf_.png");
    }

    #[test]
    fn truncates_long_names() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_file_name(&long).unwrap().len(), MAX_FILE_NAME_LEN);
    }
}
