//! Error types for the contextweave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Unknown message ids are never errors: the store signals them with
//! `false`/`None`. Errors here describe collaborator failures.
//! Configuration errors live in the config crate.

use thiserror::Error;

/// Failures raised by the external collaborators the layering engine calls.
///
/// The engine never lets these escape a turn: it logs them and falls back to
/// sending the user's raw text.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Template processing failed: {0}")]
    Template(String),

    #[error("Rendering failed for {path}: {reason}")]
    Render { path: String, reason: String },

    #[error("Compaction failed: {0}")]
    Compaction(String),

    #[error("URL resolution failed: {0}")]
    UrlResolution(String),

    #[error("File reference resolution failed: {0}")]
    FileResolution(String),

    #[error("Active tab unavailable: {0}")]
    ActiveTab(String),
}

impl ContextError {
    pub fn render(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_error_displays_path() {
        let err = ContextError::render("notes/A.md", "unsupported file type");
        assert!(err.to_string().contains("notes/A.md"));
        assert!(err.to_string().contains("unsupported file type"));
    }

    #[test]
    fn folder_error_names_the_folder() {
        let err = ContextError::FileResolution("folder 'work' not found in vault".into());
        assert_eq!(
            err.to_string(),
            "File reference resolution failed: folder 'work' not found in vault"
        );
    }
}
