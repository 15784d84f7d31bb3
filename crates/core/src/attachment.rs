//! Per-turn context attachments.
//!
//! A [`MessageContext`] records everything the user attached to a turn:
//! notes, URLs, tags, folders, selected text and browser tabs. It is fixed
//! once attached to a message, except `web_tabs`, which is rewritten at send
//! time to freeze the active tab snapshot.

use serde::{Deserialize, Serialize};

/// A reference to a note (or any vault file) by path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteRef {
    /// Vault-relative path, e.g. `projects/plan.md`.
    pub path: String,

    /// Display title. Falls back to the file stem when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl NoteRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// The title, or the file name without its extension.
    pub fn display_title(&self) -> &str {
        if let Some(title) = &self.title {
            return title;
        }
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
    }
}

/// Where a piece of selected text came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sourceType", rename_all = "camelCase")]
pub enum SelectedTextSource {
    /// A range of lines inside a note.
    #[serde(rename_all = "camelCase")]
    Note {
        note_path: String,
        start_line: u32,
        end_line: u32,
    },
    /// A selection made on a web page.
    #[serde(rename_all = "camelCase")]
    Web {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

/// A snippet of text the user selected and attached to the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedTextContext {
    pub id: String,
    pub content: String,
    #[serde(flatten)]
    pub source: SelectedTextSource,
}

impl SelectedTextContext {
    pub fn is_web(&self) -> bool {
        matches!(self.source, SelectedTextSource::Web { .. })
    }
}

/// A browser tab attached to a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebTab {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,

    /// Set on the single tab that was active when the turn was sent.
    #[serde(default)]
    pub is_active: bool,
}

impl WebTab {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            favicon_url: None,
            is_active: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Everything attached to a single turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<NoteRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_text_contexts: Vec<SelectedTextContext>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_tabs: Vec<WebTab>,
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(mut self, notes: Vec<NoteRef>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_folders(mut self, folders: Vec<String>) -> Self {
        self.folders = folders;
        self
    }

    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_selected_text(mut self, items: Vec<SelectedTextContext>) -> Self {
        self.selected_text_contexts = items;
        self
    }

    pub fn with_web_tabs(mut self, tabs: Vec<WebTab>) -> Self {
        self.web_tabs = tabs;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
            && self.urls.is_empty()
            && self.tags.is_empty()
            && self.folders.is_empty()
            && self.selected_text_contexts.is_empty()
            && self.web_tabs.is_empty()
    }

    /// True when any attachment was taken from a web page.
    pub fn has_web_sourced_selection(&self) -> bool {
        self.selected_text_contexts.iter().any(|s| s.is_web())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_title_falls_back_to_stem() {
        assert_eq!(NoteRef::new("projects/plan.md").display_title(), "plan");
        assert_eq!(NoteRef::new("README").display_title(), "README");
        assert_eq!(
            NoteRef::new("a/b.md").with_title("Bee").display_title(),
            "Bee"
        );
    }

    #[test]
    fn selected_text_serializes_with_source_type() {
        let item = SelectedTextContext {
            id: "sel-1".into(),
            content: "fn main() {}".into(),
            source: SelectedTextSource::Note {
                note_path: "code.md".into(),
                start_line: 3,
                end_line: 5,
            },
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["sourceType"], "note");
        assert_eq!(json["notePath"], "code.md");
        assert_eq!(json["startLine"], 3);

        let back: SelectedTextContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn web_selection_detected() {
        let ctx = MessageContext::new().with_selected_text(vec![SelectedTextContext {
            id: "sel-2".into(),
            content: "quoted".into(),
            source: SelectedTextSource::Web {
                url: "https://example.com".into(),
                title: None,
            },
        }]);
        assert!(ctx.has_web_sourced_selection());
        assert!(!MessageContext::new().has_web_sourced_selection());
    }

    #[test]
    fn empty_context_omits_fields() {
        let json = serde_json::to_string(&MessageContext::new()).unwrap();
        assert_eq!(json, "{}");
        assert!(MessageContext::new().is_empty());
    }
}
