//! Filesystem-backed vault: renders markdown notes and resolves tags and
//! folders by scanning the directory tree.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use contextweave_core::{
    ChainKind, ContextError, ContextRenderer, FileReferenceResolver, NoteRef, RenderedNote,
    SelectedTextContext, SelectedTextSource, WebTab,
};
use tracing::{debug, warn};

pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute location of a vault-relative path. `None` when the path
    /// would leave the vault.
    fn resolve(&self, note_path: &str) -> Option<PathBuf> {
        let relative = Path::new(note_path.trim_start_matches('/'));
        let inside = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        inside.then(|| self.root.join(relative))
    }

    /// Vault-relative paths of every markdown file under `dir`, sorted.
    async fn markdown_files(&self, dir: &Path) -> Result<Vec<String>, ContextError> {
        let mut pending = vec![dir.to_path_buf()];
        let mut files = Vec::new();

        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await.map_err(|e| {
                ContextError::FileResolution(format!("{}: {e}", current.display()))
            })?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| ContextError::FileResolution(e.to_string()))?
            {
                let path = entry.path();
                let is_hidden = entry.file_name().to_string_lossy().starts_with('.');
                if is_hidden {
                    continue;
                }
                if path.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "md") {
                    if let Some(relative) = self.relative(&path) {
                        files.push(relative);
                    }
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        Some(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
        )
    }
}

/// Tags a note declares inline (`#tag`) or in a frontmatter `tags:` line.
pub fn note_tags(content: &str) -> HashSet<String> {
    let mut tags = HashSet::new();

    for line in content.lines() {
        if let Some(list) = line.trim().strip_prefix("tags:") {
            for tag in list.trim().trim_matches(['[', ']']).split(',') {
                let tag = normalize_tag(tag.trim().trim_matches(['"', '\'']));
                if !tag.is_empty() {
                    tags.insert(tag);
                }
            }
        }
        for token in line.split_whitespace() {
            if let Some(raw) = token.strip_prefix('#') {
                let tag = normalize_tag(
                    raw.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_'),
                );
                if !tag.is_empty() {
                    tags.insert(tag);
                }
            }
        }
    }
    tags
}

fn normalize_tag(tag: &str) -> String {
    tag.trim_start_matches('#').to_lowercase()
}

pub fn render_note(note: &NoteRef, content: &str) -> String {
    format!(
        "<note_context>\n<title>{}</title>\n<path>{}</path>\n<content>\n{}\n</content>\n</note_context>",
        note.display_title(),
        note.path,
        content.trim_end()
    )
}

#[async_trait]
impl ContextRenderer for FsVault {
    async fn render_notes(
        &self,
        notes: &[NoteRef],
        exclude: &HashSet<String>,
        _chain: ChainKind,
    ) -> Result<Vec<RenderedNote>, ContextError> {
        let mut rendered = Vec::new();
        for note in notes.iter().filter(|n| !exclude.contains(&n.path)) {
            let Some(file) = self.resolve(&note.path) else {
                warn!(path = %note.path, "Skipping note outside the vault");
                continue;
            };
            match tokio::fs::read_to_string(file).await {
                Ok(content) => rendered.push(RenderedNote {
                    path: note.path.clone(),
                    content: render_note(note, &content),
                }),
                Err(e) => warn!(path = %note.path, error = %e, "Skipping unreadable note"),
            }
        }
        debug!(requested = notes.len(), rendered = rendered.len(), "Rendered notes");
        Ok(rendered)
    }

    async fn render_selected_text(
        &self,
        items: &[SelectedTextContext],
    ) -> Result<String, ContextError> {
        let blocks: Vec<String> = items
            .iter()
            .map(|item| match &item.source {
                SelectedTextSource::Note {
                    note_path,
                    start_line,
                    end_line,
                } => format!(
                    "<selected_text>\n<path>{note_path}</path>\n<lines>{start_line}-{end_line}</lines>\n<content>\n{}\n</content>\n</selected_text>",
                    item.content
                ),
                SelectedTextSource::Web { url, title } => format!(
                    "<selected_text>\n<title>{}</title>\n<url>{url}</url>\n<content>\n{}\n</content>\n</selected_text>",
                    title.as_deref().unwrap_or(url),
                    item.content
                ),
            })
            .collect();
        Ok(blocks.join("\n\n"))
    }

    async fn render_web_tabs(&self, tabs: &[WebTab]) -> Result<String, ContextError> {
        let blocks: Vec<String> = tabs
            .iter()
            .map(|tab| {
                let active = if tab.is_active { "\n<active>true</active>" } else { "" };
                format!(
                    "<web_tab_context>\n<title>{}</title>\n<url>{}</url>{active}\n</web_tab_context>",
                    tab.title.as_deref().unwrap_or(&tab.url),
                    tab.url
                )
            })
            .collect();
        Ok(blocks.join("\n\n"))
    }
}

#[async_trait]
impl FileReferenceResolver for FsVault {
    async fn files_for_tags(&self, tags: &[String]) -> Result<Vec<NoteRef>, ContextError> {
        let wanted: HashSet<String> = tags.iter().map(|t| normalize_tag(t)).collect();
        let mut matches = Vec::new();
        for path in self.markdown_files(&self.root).await? {
            let Some(file) = self.resolve(&path) else {
                continue;
            };
            let Ok(content) = tokio::fs::read_to_string(file).await else {
                continue;
            };
            if note_tags(&content).iter().any(|t| wanted.contains(t)) {
                matches.push(NoteRef::new(path));
            }
        }
        Ok(matches)
    }

    async fn files_in_folder(&self, folder: &str) -> Result<Vec<NoteRef>, ContextError> {
        let Some(dir) = self.resolve(folder.trim_end_matches('/')) else {
            return Err(ContextError::FileResolution(format!(
                "folder '{folder}' is outside the vault"
            )));
        };
        if !dir.is_dir() {
            return Err(ContextError::FileResolution(format!(
                "folder '{folder}' not found in vault"
            )));
        }
        Ok(self
            .markdown_files(&dir)
            .await?
            .into_iter()
            .map(NoteRef::new)
            .collect())
    }
}
