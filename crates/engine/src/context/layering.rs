//! Context layering pipeline: turns a user message into layered prompt text.
//!
//! For each turn the engine:
//!
//! 1. Runs the custom-prompt template pass
//! 2. Builds the previous-turn library (`L2_PREVIOUS`) from prior envelopes
//! 3. Resolves URLs (for chains that support it)
//! 4. Renders notes, tags and folders not already seen in this conversation
//! 5. Renders selected text and browser tabs
//! 6. Concatenates `user text + library + new context`
//! 7. Compacts the context portion when it crosses the chain's threshold
//! 8. Records the result as a [`PromptContextEnvelope`]
//!
//! Any collaborator failure degrades the turn to the raw user text.

use std::collections::HashSet;
use std::sync::Arc;

use contextweave_config::{ChatConfig, LayeringConfig};
use contextweave_core::{
    ActiveTabProvider, ChainKind, CompactionOutcome, ContextCompactor, ContextError,
    ContextRenderer, FileReferenceResolver, LayerId, NoActiveTab, NoUrlContext, NoteRef,
    PassthroughTemplates, PromptContextEnvelope, PromptLayerSegment, PromptTemplateProcessor,
    SegmentMetadata, SegmentSource, SelectedTextContext, StoredMessage, UrlContextResolver,
};
use contextweave_store::MessageRepository;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::library::PreviousTurnLibrary;
use crate::context::token::{char_len, exceeds_threshold};
use crate::web_tabs::{inject_active_tab, normalize_url, should_include_active_tab};

/// Segment id of a compacted `L3_TURN`.
pub const COMPACTED_SEGMENT_ID: &str = "compacted_context";

// ── Types ─────────────────────────────────────────────────────────────────

/// Per-turn settings that are not part of the stored message.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub chain: ChainKind,

    /// Attach `active_note` as new context (subject to deduplication).
    pub include_active_note: bool,

    pub active_note: Option<NoteRef>,

    /// Empty means no `L1_SYSTEM` layer.
    pub system_prompt: String,

    /// Files the system prompt already inlines; never rendered again.
    pub system_prompt_covered_paths: Vec<String>,

    /// Capture the active browser tab into the message's snapshot.
    pub include_active_web_tab: bool,
}

impl TurnRequest {
    pub fn new(chain: ChainKind) -> Self {
        Self {
            chain,
            ..Self::default()
        }
    }

    /// Request defaults taken from the `[chat]` config section.
    pub fn from_config(chat: &ChatConfig) -> Self {
        Self {
            chain: chat.default_chain,
            include_active_note: chat.include_active_note,
            system_prompt: chat.system_prompt.clone(),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_active_note(mut self, note: NoteRef) -> Self {
        self.active_note = Some(note);
        self.include_active_note = true;
        self
    }

    pub fn with_covered_paths(mut self, paths: Vec<String>) -> Self {
        self.system_prompt_covered_paths = paths;
        self
    }
}

/// Output of processing one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedTurn {
    /// Text sent to the model for this message.
    pub processed_content: String,

    /// `None` when processing degraded to the raw text.
    pub context_envelope: Option<PromptContextEnvelope>,

    pub was_compacted: bool,

    /// Images found while resolving URLs.
    pub image_urls: Vec<String>,
}

impl ProcessedTurn {
    fn raw(text: &str) -> Self {
        Self {
            processed_content: text.to_string(),
            context_envelope: None,
            was_compacted: false,
            image_urls: Vec::new(),
        }
    }
}

/// New context gathered for the current turn, in prompt order.
#[derive(Default)]
struct TurnContext {
    notes: Vec<PromptLayerSegment>,
    tags: Option<PromptLayerSegment>,
    folders: Option<PromptLayerSegment>,
    urls: Option<PromptLayerSegment>,
    selected_text: Option<PromptLayerSegment>,
    web_tabs: Option<PromptLayerSegment>,
    /// Paths rendered from notes, tags and folders.
    paths: Vec<String>,
    /// URLs whose content was resolved.
    fetched_urls: Vec<String>,
    image_urls: Vec<String>,
}

impl TurnContext {
    fn into_segments(self) -> Vec<PromptLayerSegment> {
        self.notes
            .into_iter()
            .chain(self.tags)
            .chain(self.folders)
            .chain(self.urls)
            .chain(self.selected_text)
            .chain(self.web_tabs)
            .collect()
    }
}

// ── Engine ────────────────────────────────────────────────────────────────

/// Builds the layered prompt for each user turn.
///
/// Holds no per-conversation state. One engine serves any number of
/// [`MessageRepository`] instances.
pub struct ContextLayeringEngine {
    renderer: Arc<dyn ContextRenderer>,
    compactor: Arc<dyn ContextCompactor>,
    files: Arc<dyn FileReferenceResolver>,
    templates: Arc<dyn PromptTemplateProcessor>,
    urls: Arc<dyn UrlContextResolver>,
    active_tab: Arc<dyn ActiveTabProvider>,
    policy: LayeringConfig,
}

impl ContextLayeringEngine {
    /// Create an engine with pass-through templates and no URL or
    /// browser integration.
    pub fn new(
        renderer: Arc<dyn ContextRenderer>,
        compactor: Arc<dyn ContextCompactor>,
        files: Arc<dyn FileReferenceResolver>,
        policy: LayeringConfig,
    ) -> Self {
        Self {
            renderer,
            compactor,
            files,
            templates: Arc::new(PassthroughTemplates),
            urls: Arc::new(NoUrlContext),
            active_tab: Arc::new(NoActiveTab),
            policy,
        }
    }

    pub fn with_templates(mut self, templates: Arc<dyn PromptTemplateProcessor>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_url_resolver(mut self, urls: Arc<dyn UrlContextResolver>) -> Self {
        self.urls = urls;
        self
    }

    pub fn with_active_tab_provider(mut self, provider: Arc<dyn ActiveTabProvider>) -> Self {
        self.active_tab = provider;
        self
    }

    pub fn policy(&self) -> &LayeringConfig {
        &self.policy
    }

    /// Process one message against the prior user messages of its
    /// conversation (oldest first). Never fails: collaborator errors yield
    /// the raw display text and no envelope.
    pub async fn process_message_context(
        &self,
        message: &StoredMessage,
        prior: &[&StoredMessage],
        request: &TurnRequest,
    ) -> ProcessedTurn {
        match self.build_turn(message, prior, request).await {
            Ok(turn) => turn,
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "Context processing failed, sending raw text"
                );
                ProcessedTurn::raw(&message.display_text)
            }
        }
    }

    /// Rebuild a stored user message's processed text and envelope, e.g.
    /// after an edit. Returns `None` for unknown ids and non-user messages.
    pub async fn reprocess_message_context(
        &self,
        id: &str,
        store: &mut MessageRepository,
        request: &TurnRequest,
    ) -> Option<ProcessedTurn> {
        let turn = {
            let message = store.stored(id)?;
            if !message.is_user() {
                debug!(message_id = %id, sender = %message.sender, "Skipping non-user message");
                return None;
            }
            let prior = store.prior_user_messages(id);
            self.process_message_context(message, &prior, request).await
        };

        store.update_processed_text(
            id,
            turn.processed_content.clone(),
            turn.context_envelope.clone(),
        );
        Some(turn)
    }

    /// Send path: freeze the browser-tab snapshot, then process and store.
    pub async fn process_and_store(
        &self,
        id: &str,
        store: &mut MessageRepository,
        request: &TurnRequest,
    ) -> Option<ProcessedTurn> {
        let (context, include_active) = {
            let message = store.stored(id)?;
            let include = message.is_user()
                && should_include_active_tab(request.include_active_web_tab, &message.display_text);
            (message.context.clone().unwrap_or_default(), include)
        };

        if include_active || !context.web_tabs.is_empty() {
            let tabs = inject_active_tab(
                &context.web_tabs,
                include_active,
                &context,
                self.active_tab.as_ref(),
            )
            .await;
            if tabs != context.web_tabs {
                store.update_web_tabs(id, tabs);
            }
        }

        self.reprocess_message_context(id, store, request).await
    }

    async fn build_turn(
        &self,
        message: &StoredMessage,
        prior: &[&StoredMessage],
        request: &TurnRequest,
    ) -> Result<ProcessedTurn, ContextError> {
        let attachments = message.context.clone().unwrap_or_default();
        let mut excluded: HashSet<String> =
            request.system_prompt_covered_paths.iter().cloned().collect();

        // 1. Template pass
        let selection = selection_text(&attachments.selected_text_contexts);
        let prompt = self
            .templates
            .process_prompt(
                &message.display_text,
                selection.as_deref(),
                request.active_note.as_ref(),
            )
            .await?;
        excluded.extend(prompt.included_files.iter().cloned());
        let user_text = prompt.processed_prompt;

        // 2. Previous-turn library
        let library = PreviousTurnLibrary::build(prior, &self.policy);
        excluded.extend(library.excluded_paths().iter().cloned());
        debug!(
            message_id = %message.id,
            prior_turns = prior.len(),
            library_segments = library.segments().len(),
            excluded = excluded.len(),
            "Previous-turn library built"
        );

        // 3-5. New context for this turn
        let mut turn = TurnContext::default();
        if request.chain.supports_url_context() {
            self.collect_urls(&user_text, &attachments.urls, &mut excluded, &mut turn)
                .await?;
        }
        self.collect_notes(&attachments.notes, request, &mut excluded, &mut turn)
            .await?;

        if !attachments.tags.is_empty() {
            let refs = self.files.files_for_tags(&attachments.tags).await?;
            turn.tags = self
                .render_group(
                    "tags",
                    SegmentSource::Tags,
                    refs,
                    request.chain,
                    &mut excluded,
                    &mut turn.paths,
                )
                .await?;
        }
        if !attachments.folders.is_empty() {
            let refs = self.files.files_in_folders(&attachments.folders).await?;
            turn.folders = self
                .render_group(
                    "folders",
                    SegmentSource::Folders,
                    refs,
                    request.chain,
                    &mut excluded,
                    &mut turn.paths,
                )
                .await?;
        }

        if !attachments.selected_text_contexts.is_empty() {
            let rendered = self
                .renderer
                .render_selected_text(&attachments.selected_text_contexts)
                .await?;
            turn.selected_text =
                aggregate_segment("selected_text", SegmentSource::SelectedText, rendered);
        }
        if !attachments.web_tabs.is_empty() {
            let rendered = self.renderer.render_web_tabs(&attachments.web_tabs).await?;
            turn.web_tabs = aggregate_segment("web_tabs", SegmentSource::WebTabs, rendered);
        }

        // 6. Candidate
        let library_text = library.text();
        let turn_paths = std::mem::take(&mut turn.paths);
        let fetched_urls = std::mem::take(&mut turn.fetched_urls);
        let image_urls = std::mem::take(&mut turn.image_urls);
        let turn_segments = turn.into_segments();
        let context_portion = join_non_empty(
            std::iter::once(library_text.as_str())
                .chain(turn_segments.iter().map(|s| s.content.as_str())),
        );

        // 7. Compaction trigger
        let threshold = self.policy.char_threshold_for(request.chain);
        let chars = char_len(&context_portion);
        let mut compaction: Option<CompactionOutcome> = None;
        if exceeds_threshold(chars, threshold) {
            debug!(message_id = %message.id, chars, threshold, "Context over threshold, compacting");
            let outcome = self.compactor.compact(&context_portion).await?;
            if outcome.was_compacted {
                info!(
                    message_id = %message.id,
                    original_chars = outcome.original_char_count,
                    compacted_chars = outcome.compacted_char_count,
                    "Turn context compacted"
                );
                compaction = Some(outcome);
            }
        }

        // 8. Envelope
        let mut envelope = PromptContextEnvelope::new(&message.id);
        if !request.system_prompt.trim().is_empty() {
            envelope.push(
                LayerId::L1System,
                PromptLayerSegment::new("system", request.system_prompt.clone(), true)
                    .with_metadata(SegmentMetadata {
                        note_paths: request.system_prompt_covered_paths.clone(),
                        ..SegmentMetadata::from_source(SegmentSource::System)
                    }),
            );
        }

        let was_compacted = compaction.is_some();
        // A compacted turn already carries the library inside its summary.
        if !was_compacted {
            for segment in library.into_segments() {
                envelope.push(LayerId::L2Previous, segment);
            }
        }

        let context_text = match compaction {
            Some(outcome) => {
                envelope.push(
                    LayerId::L3Turn,
                    PromptLayerSegment::new(COMPACTED_SEGMENT_ID, outcome.content.clone(), false)
                        .with_metadata(SegmentMetadata {
                            was_compacted: true,
                            compacted_paths: turn_paths,
                            urls: fetched_urls,
                            original_char_count: Some(outcome.original_char_count),
                            compacted_char_count: Some(outcome.compacted_char_count),
                            ..SegmentMetadata::from_source(SegmentSource::Compacted)
                        }),
                );
                outcome.content
            }
            None => {
                for segment in turn_segments {
                    envelope.push(LayerId::L3Turn, segment);
                }
                context_portion
            }
        };

        envelope.push(
            LayerId::L5User,
            PromptLayerSegment::new("user", user_text.clone(), false)
                .with_metadata(SegmentMetadata::from_source(SegmentSource::User)),
        );

        Ok(ProcessedTurn {
            processed_content: join_non_empty([user_text.as_str(), context_text.as_str()]),
            context_envelope: Some(envelope),
            was_compacted,
            image_urls,
        })
    }

    async fn collect_urls(
        &self,
        text: &str,
        attached: &[String],
        excluded: &mut HashSet<String>,
        turn: &mut TurnContext,
    ) -> Result<(), ContextError> {
        let known: HashSet<String> = excluded.iter().map(|p| normalize_url(p)).collect();
        let mut seen = HashSet::new();
        let urls: Vec<String> = attached
            .iter()
            .filter(|u| {
                let key = normalize_url(u);
                !known.contains(&key) && seen.insert(key)
            })
            .cloned()
            .collect();

        let resolved = self.urls.resolve(text, &urls).await?;
        turn.image_urls = resolved.image_urls;
        if resolved.url_context.trim().is_empty() {
            return Ok(());
        }

        for url in &urls {
            excluded.insert(url.clone());
            turn.fetched_urls.push(url.clone());
        }
        turn.urls = aggregate_segment("urls", SegmentSource::Urls, resolved.url_context).map(
            |segment| {
                let metadata = SegmentMetadata {
                    urls: urls.clone(),
                    ..segment.metadata.clone()
                };
                segment.with_metadata(metadata)
            },
        );
        Ok(())
    }

    async fn collect_notes(
        &self,
        attached: &[NoteRef],
        request: &TurnRequest,
        excluded: &mut HashSet<String>,
        turn: &mut TurnContext,
    ) -> Result<(), ContextError> {
        let mut seen = HashSet::new();
        let mut notes: Vec<NoteRef> = attached
            .iter()
            .filter(|n| !excluded.contains(&n.path) && seen.insert(n.path.clone()))
            .cloned()
            .collect();

        let active_path = request
            .active_note
            .as_ref()
            .filter(|_| request.include_active_note)
            .map(|n| n.path.clone());
        if let Some(active) = request.active_note.as_ref().filter(|_| request.include_active_note)
            && !excluded.contains(&active.path)
            && seen.insert(active.path.clone())
        {
            notes.push(active.clone());
        }

        if notes.is_empty() {
            return Ok(());
        }

        let rendered = self
            .renderer
            .render_notes(&notes, excluded, request.chain)
            .await?;
        for note in rendered {
            if note.content.trim().is_empty() || !excluded.insert(note.path.clone()) {
                continue;
            }
            let source = if active_path.as_deref() == Some(note.path.as_str()) {
                SegmentSource::ActiveNote
            } else {
                SegmentSource::Note
            };
            turn.paths.push(note.path.clone());
            turn.notes.push(
                PromptLayerSegment::new(note.path.clone(), note.content, false).with_metadata(
                    SegmentMetadata {
                        note_path: Some(note.path),
                        ..SegmentMetadata::from_source(source)
                    },
                ),
            );
        }
        Ok(())
    }

    /// Render tag or folder matches into one aggregate segment.
    async fn render_group(
        &self,
        id: &str,
        source: SegmentSource,
        refs: Vec<NoteRef>,
        chain: ChainKind,
        excluded: &mut HashSet<String>,
        paths: &mut Vec<String>,
    ) -> Result<Option<PromptLayerSegment>, ContextError> {
        let refs: Vec<NoteRef> = refs
            .into_iter()
            .filter(|n| !excluded.contains(&n.path))
            .collect();
        if refs.is_empty() {
            return Ok(None);
        }

        let rendered = self.renderer.render_notes(&refs, excluded, chain).await?;
        let mut note_paths = Vec::new();
        let mut blocks = Vec::new();
        for note in rendered {
            if note.content.trim().is_empty() || !excluded.insert(note.path.clone()) {
                continue;
            }
            note_paths.push(note.path.clone());
            blocks.push(note.content);
        }
        paths.extend(note_paths.iter().cloned());

        Ok(aggregate_segment(id, source, blocks.join("\n\n")).map(|segment| {
            segment.with_metadata(SegmentMetadata {
                note_paths,
                ..SegmentMetadata::from_source(source)
            })
        }))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn aggregate_segment(
    id: &str,
    source: SegmentSource,
    content: String,
) -> Option<PromptLayerSegment> {
    if content.trim().is_empty() {
        return None;
    }
    Some(
        PromptLayerSegment::new(id, content, false)
            .with_metadata(SegmentMetadata::from_source(source)),
    )
}

/// Selected-text contents joined by blank lines, `None` when empty.
fn selection_text(items: &[SelectedTextContext]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    Some(
        items
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

fn join_non_empty<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
