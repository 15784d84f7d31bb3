//! Collaborator traits: the seams between the layering engine and the host.
//!
//! The engine never parses notes, fetches URLs or summarizes text itself. It
//! calls these traits, which the host implements against its vault, browser
//! and model. Implementations must be cheap to share (`Send + Sync`) since
//! one engine serves every conversation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::attachment::{NoteRef, SelectedTextContext, WebTab};
use crate::chain::ChainKind;
use crate::error::ContextError;

/// One rendered note block, e.g. `<note_context>…</note_context>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedNote {
    pub path: String,
    pub content: String,
}

/// Renders attachments into XML-like text blocks.
#[async_trait]
pub trait ContextRenderer: Send + Sync {
    /// Render each note not listed in `exclude`.
    ///
    /// A single unreadable or unsupported note is skipped, not reported as an
    /// error; `Err` means the renderer as a whole is unusable.
    async fn render_notes(
        &self,
        notes: &[NoteRef],
        exclude: &HashSet<String>,
        chain: ChainKind,
    ) -> Result<Vec<RenderedNote>, ContextError>;

    /// Render the selected-text snippets of a turn into one block.
    async fn render_selected_text(
        &self,
        items: &[SelectedTextContext],
    ) -> Result<String, ContextError>;

    /// Render the browser tabs of a turn into one block.
    async fn render_web_tabs(&self, tabs: &[WebTab]) -> Result<String, ContextError>;
}

/// Result of a compaction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionOutcome {
    pub was_compacted: bool,
    pub content: String,
    pub original_char_count: usize,
    pub compacted_char_count: usize,
}

impl CompactionOutcome {
    /// An outcome that leaves the text untouched.
    pub fn unchanged(text: &str) -> Self {
        let count = text.chars().count();
        Self {
            was_compacted: false,
            content: text.to_string(),
            original_char_count: count,
            compacted_char_count: count,
        }
    }
}

/// Summarizes oversized context.
#[async_trait]
pub trait ContextCompactor: Send + Sync {
    async fn compact(&self, text: &str) -> Result<CompactionOutcome, ContextError>;
}

/// Output of the custom-prompt template pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedPrompt {
    pub processed_prompt: String,
    /// Paths inlined by template references; excluded from later context.
    #[serde(default)]
    pub included_files: Vec<String>,
}

/// Resolves inline template references (note embeds, tag queries, …).
#[async_trait]
pub trait PromptTemplateProcessor: Send + Sync {
    async fn process_prompt(
        &self,
        text: &str,
        selection: Option<&str>,
        active_note: Option<&NoteRef>,
    ) -> Result<ProcessedPrompt, ContextError>;
}

/// Template processor that resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTemplates;

#[async_trait]
impl PromptTemplateProcessor for PassthroughTemplates {
    async fn process_prompt(
        &self,
        text: &str,
        _selection: Option<&str>,
        _active_note: Option<&NoteRef>,
    ) -> Result<ProcessedPrompt, ContextError> {
        Ok(ProcessedPrompt {
            processed_prompt: text.to_string(),
            included_files: Vec::new(),
        })
    }
}

/// Fetched URL content for a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlContext {
    pub url_context: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Fetches and renders URLs attached to (or mentioned in) a turn.
#[async_trait]
pub trait UrlContextResolver: Send + Sync {
    async fn resolve(&self, text: &str, urls: &[String]) -> Result<UrlContext, ContextError>;
}

/// URL resolver for hosts without network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUrlContext;

#[async_trait]
impl UrlContextResolver for NoUrlContext {
    async fn resolve(&self, _text: &str, _urls: &[String]) -> Result<UrlContext, ContextError> {
        Ok(UrlContext::default())
    }
}

/// Turns tags and folders into the notes they cover.
#[async_trait]
pub trait FileReferenceResolver: Send + Sync {
    async fn files_for_tags(&self, tags: &[String]) -> Result<Vec<NoteRef>, ContextError>;

    async fn files_in_folder(&self, folder: &str) -> Result<Vec<NoteRef>, ContextError>;

    /// Notes across several folders, first occurrence of each path kept.
    async fn files_in_folders(&self, folders: &[String]) -> Result<Vec<NoteRef>, ContextError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for folder in folders {
            for note in self.files_in_folder(folder).await? {
                if seen.insert(note.path.clone()) {
                    out.push(note);
                }
            }
        }
        Ok(out)
    }
}

/// Reports the browser tab the user is looking at.
#[async_trait]
pub trait ActiveTabProvider: Send + Sync {
    async fn active_tab(&self) -> Result<Option<WebTab>, ContextError>;
}

/// Active-tab provider for platforms without a browser integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoActiveTab;

#[async_trait]
impl ActiveTabProvider for NoActiveTab {
    async fn active_tab(&self) -> Result<Option<WebTab>, ContextError> {
        Err(ContextError::ActiveTab(
            "browser integration is not available on this platform".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FolderMap;

    #[async_trait]
    impl FileReferenceResolver for FolderMap {
        async fn files_for_tags(&self, _tags: &[String]) -> Result<Vec<NoteRef>, ContextError> {
            Ok(vec![])
        }

        async fn files_in_folder(&self, folder: &str) -> Result<Vec<NoteRef>, ContextError> {
            match folder {
                "a" => Ok(vec![NoteRef::new("a/1.md"), NoteRef::new("shared.md")]),
                "b" => Ok(vec![NoteRef::new("shared.md"), NoteRef::new("b/2.md")]),
                other => Err(ContextError::FileResolution(format!("no folder {other}"))),
            }
        }
    }

    #[tokio::test]
    async fn folders_are_merged_without_duplicates() {
        let notes = FolderMap
            .files_in_folders(&["a".into(), "b".into()])
            .await
            .unwrap();
        let paths: Vec<&str> = notes.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["a/1.md", "shared.md", "b/2.md"]);
    }

    #[tokio::test]
    async fn folder_error_propagates() {
        let err = FolderMap
            .files_in_folders(&["a".into(), "missing".into()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn passthrough_templates_keep_text() {
        let out = PassthroughTemplates
            .process_prompt("Summarize {activeNote}", None, None)
            .await
            .unwrap();
        assert_eq!(out.processed_prompt, "Summarize {activeNote}");
        assert!(out.included_files.is_empty());
    }

    #[test]
    fn unchanged_outcome_counts_chars() {
        let out = CompactionOutcome::unchanged("héllo");
        assert!(!out.was_compacted);
        assert_eq!(out.original_char_count, 5);
        assert_eq!(out.compacted_char_count, 5);
    }
}
