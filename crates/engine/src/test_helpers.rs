//! Shared mock collaborators for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use contextweave_core::{
    ActiveTabProvider, ChainKind, CompactionOutcome, ContextCompactor, ContextError,
    ContextRenderer, FileReferenceResolver, NoteRef, ProcessedPrompt, PromptTemplateProcessor,
    RenderedNote, SelectedTextContext, UrlContext, UrlContextResolver, WebTab,
};

/// The block the mock vault renders for a note.
pub fn note_block(path: &str, body: &str) -> String {
    format!("<note_context>\n<path>{path}</path>\n<content>\n{body}\n</content>\n</note_context>")
}

/// In-memory vault: renders notes and resolves tags and folders.
#[derive(Default)]
pub struct MockVault {
    notes: HashMap<String, String>,
    tags: HashMap<String, Vec<String>>,
    /// Every batch of paths the renderer was asked for.
    pub render_calls: Mutex<Vec<Vec<String>>>,
    pub fail_rendering: bool,
}

impl MockVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_note(mut self, path: &str, body: &str) -> Self {
        self.notes.insert(path.to_string(), body.to_string());
        self
    }

    pub fn with_tag(mut self, tag: &str, paths: &[&str]) -> Self {
        self.tags
            .insert(tag.to_string(), paths.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_rendering: true,
            ..Self::default()
        }
    }

    /// Paths rendered across all calls, in order.
    pub fn rendered_paths(&self) -> Vec<String> {
        self.render_calls.lock().unwrap().concat()
    }
}

#[async_trait]
impl ContextRenderer for MockVault {
    async fn render_notes(
        &self,
        notes: &[NoteRef],
        exclude: &HashSet<String>,
        _chain: ChainKind,
    ) -> Result<Vec<RenderedNote>, ContextError> {
        if self.fail_rendering {
            return Err(ContextError::render("*", "vault offline"));
        }
        let rendered: Vec<RenderedNote> = notes
            .iter()
            .filter(|n| !exclude.contains(&n.path))
            .filter_map(|n| {
                self.notes.get(&n.path).map(|body| RenderedNote {
                    path: n.path.clone(),
                    content: note_block(&n.path, body),
                })
            })
            .collect();
        self.render_calls
            .lock()
            .unwrap()
            .push(rendered.iter().map(|r| r.path.clone()).collect());
        Ok(rendered)
    }

    async fn render_selected_text(
        &self,
        items: &[SelectedTextContext],
    ) -> Result<String, ContextError> {
        Ok(items
            .iter()
            .map(|s| format!("<selected_text>\n<content>{}</content>\n</selected_text>", s.content))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    async fn render_web_tabs(&self, tabs: &[WebTab]) -> Result<String, ContextError> {
        Ok(tabs
            .iter()
            .map(|t| format!("<web_tab_context>\n<url>{}</url>\n</web_tab_context>", t.url))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[async_trait]
impl FileReferenceResolver for MockVault {
    async fn files_for_tags(&self, tags: &[String]) -> Result<Vec<NoteRef>, ContextError> {
        Ok(tags
            .iter()
            .filter_map(|t| self.tags.get(t))
            .flatten()
            .map(NoteRef::new)
            .collect())
    }

    async fn files_in_folder(&self, folder: &str) -> Result<Vec<NoteRef>, ContextError> {
        let prefix = format!("{}/", folder.trim_end_matches('/'));
        let mut paths: Vec<&String> = self.notes.keys().filter(|p| p.starts_with(&prefix)).collect();
        paths.sort();
        Ok(paths.into_iter().map(NoteRef::new).collect())
    }
}

/// Compactor that replaces text with a short summary and records inputs.
#[derive(Default)]
pub struct RecordingCompactor {
    pub inputs: Mutex<Vec<String>>,
    /// Report "nothing to compact" instead of summarizing.
    pub decline: bool,
}

impl RecordingCompactor {
    pub fn declining() -> Self {
        Self {
            decline: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }
}

#[async_trait]
impl ContextCompactor for RecordingCompactor {
    async fn compact(&self, text: &str) -> Result<CompactionOutcome, ContextError> {
        self.inputs.lock().unwrap().push(text.to_string());
        if self.decline {
            return Ok(CompactionOutcome::unchanged(text));
        }
        let content = format!(
            "<compacted_context>\nsummary of {} chars\n</compacted_context>",
            text.chars().count()
        );
        Ok(CompactionOutcome {
            was_compacted: true,
            original_char_count: text.chars().count(),
            compacted_char_count: content.chars().count(),
            content,
        })
    }
}

/// Template processor that inlines fixed files into the prompt.
pub struct InliningTemplates {
    pub included: Vec<String>,
}

#[async_trait]
impl PromptTemplateProcessor for InliningTemplates {
    async fn process_prompt(
        &self,
        text: &str,
        _selection: Option<&str>,
        _active_note: Option<&NoteRef>,
    ) -> Result<ProcessedPrompt, ContextError> {
        let inlined: Vec<String> = self
            .included
            .iter()
            .map(|p| format!("[inlined {p}]"))
            .collect();
        Ok(ProcessedPrompt {
            processed_prompt: format!("{text}\n{}", inlined.join("\n")),
            included_files: self.included.clone(),
        })
    }
}

pub struct FailingTemplates;

#[async_trait]
impl PromptTemplateProcessor for FailingTemplates {
    async fn process_prompt(
        &self,
        _text: &str,
        _selection: Option<&str>,
        _active_note: Option<&NoteRef>,
    ) -> Result<ProcessedPrompt, ContextError> {
        Err(ContextError::Template("unterminated {{".into()))
    }
}

/// URL resolver that "fetches" every URL it is given.
#[derive(Default)]
pub struct EchoUrls {
    pub calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl UrlContextResolver for EchoUrls {
    async fn resolve(&self, _text: &str, urls: &[String]) -> Result<UrlContext, ContextError> {
        self.calls.lock().unwrap().push(urls.to_vec());
        Ok(UrlContext {
            url_context: urls
                .iter()
                .map(|u| format!("<url_content>\n<url>{u}</url>\n<content>page at {u}</content>\n</url_content>"))
                .collect::<Vec<_>>()
                .join("\n\n"),
            image_urls: Vec::new(),
        })
    }
}

pub struct FixedActiveTab(pub WebTab);

#[async_trait]
impl ActiveTabProvider for FixedActiveTab {
    async fn active_tab(&self) -> Result<Option<WebTab>, ContextError> {
        Ok(Some(self.0.clone()))
    }
}
