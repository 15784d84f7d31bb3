//! `contextweave replay`: run a scripted conversation through the layering
//! engine and report how each turn's prompt was assembled.
//!
//! Script format (JSON):
//!
//! ```json
//! {
//!   "name": "research",
//!   "chain": "copilot_plus",
//!   "systemPrompt": "You are terse.",
//!   "turns": [
//!     { "text": "Summarize", "notes": ["Plans.md"], "reply": "…" },
//!     { "text": "Compare with #ideas", "tags": ["ideas"] },
//!     { "text": "Summarize briefly", "edit": 0 }
//!   ]
//! }
//! ```
//!
//! A turn with `edit` replaces the text of an earlier turn, drops every
//! message after it and reprocesses it in place.

use std::path::Path;
use std::sync::Arc;

use contextweave_config::AppConfig;
use contextweave_core::{
    ChainKind, LayerId, MessageContext, NoteRef, SelectedTextContext, Sender, WebTab,
};
use contextweave_engine::context::token::estimate_tokens;
use contextweave_engine::{ContextLayeringEngine, ProcessedTurn, TurnRequest};
use contextweave_store::{ConversationId, ConversationRegistry, MessageRepository};
use serde::Deserialize;
use tracing::info;

use crate::compactor::OutlineCompactor;
use crate::vault::FsVault;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationScript {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub chain: Option<ChainKind>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub active_note: Option<String>,
    pub turns: Vec<ScriptTurn>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptTurn {
    pub text: String,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub selected_text: Vec<SelectedTextContext>,
    #[serde(default)]
    pub web_tabs: Vec<WebTab>,
    /// AI reply appended after the turn.
    #[serde(default)]
    pub reply: Option<String>,
    /// Index of an earlier turn to edit instead of sending a new message.
    #[serde(default)]
    pub edit: Option<usize>,
}

impl ScriptTurn {
    fn context(&self) -> MessageContext {
        MessageContext::default()
            .with_notes(self.notes.iter().map(NoteRef::new).collect())
            .with_tags(self.tags.clone())
            .with_folders(self.folders.clone())
            .with_urls(self.urls.clone())
            .with_selected_text(self.selected_text.clone())
            .with_web_tabs(self.web_tabs.clone())
    }
}

pub struct ReplayOptions {
    pub chain: Option<ChainKind>,
    pub show_prompt: bool,
    pub json: bool,
}

pub async fn run(
    config: &AppConfig,
    script_path: &Path,
    vault_root: &Path,
    options: ReplayOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(script_path)
        .map_err(|e| format!("Failed to read script {}: {e}", script_path.display()))?;
    let script: ConversationScript = serde_json::from_str(&raw)?;

    if !vault_root.is_dir() {
        return Err(format!("Vault directory not found: {}", vault_root.display()).into());
    }

    let vault = Arc::new(FsVault::new(vault_root));
    let compactor = Arc::new(OutlineCompactor::new(
        config.layering.l2_preview_chars,
        config.layering.l2_max_headings,
    ));
    let engine =
        ContextLayeringEngine::new(vault.clone(), compactor, vault, config.layering.clone());

    let mut request = TurnRequest::from_config(&config.chat);
    if let Some(chain) = options.chain.or(script.chain) {
        request.chain = chain;
    }
    if let Some(prompt) = &script.system_prompt {
        request.system_prompt = prompt.clone();
    }
    if let Some(active) = &script.active_note {
        request = request.with_active_note(NoteRef::new(active));
    }

    let conversation = script
        .name
        .as_deref()
        .map(ConversationId::from)
        .unwrap_or_default();
    let mut registry = ConversationRegistry::new();
    let store = registry.get_or_create(&conversation);

    println!("🧵 Replaying {} turn(s) as {}", script.turns.len(), request.chain);
    println!("   Conversation: {conversation}");
    println!();

    let mut turn_ids: Vec<String> = Vec::new();
    for (index, turn) in script.turns.iter().enumerate() {
        let (id, processed) = match turn.edit {
            Some(target) => {
                edit_turn(&engine, store, &mut turn_ids, target, turn, &request).await?
            }
            None => send_turn(&engine, store, &mut turn_ids, turn, &request).await?,
        };

        report(index, &id, &processed, engine.policy().chars_per_token);
        if options.show_prompt {
            println!("{}\n", processed.processed_content);
        }

        if let Some(reply) = &turn.reply {
            store.add_message(reply.as_str(), reply.as_str(), Sender::Ai, None);
        }
    }

    let stats = store.debug_info();
    info!(
        conversation = %conversation,
        total = stats.total_messages,
        user = stats.user_messages,
        ai = stats.ai_messages,
        "Replay finished"
    );
    println!(
        "📊 {} messages ({} user, {} AI, {} visible)",
        stats.total_messages, stats.user_messages, stats.ai_messages, stats.visible_messages
    );

    if options.json {
        println!("{}", serde_json::to_string_pretty(&store.llm_messages())?);
    }
    Ok(())
}

async fn send_turn(
    engine: &ContextLayeringEngine,
    store: &mut MessageRepository,
    turn_ids: &mut Vec<String>,
    turn: &ScriptTurn,
    request: &TurnRequest,
) -> Result<(String, ProcessedTurn), Box<dyn std::error::Error>> {
    let id = store.add_message(
        turn.text.as_str(),
        turn.text.as_str(),
        Sender::User,
        Some(turn.context()),
    );
    let processed = engine
        .process_and_store(&id, store, request)
        .await
        .ok_or_else(|| format!("Message {id} vanished before processing"))?;
    turn_ids.push(id.clone());
    Ok((id, processed))
}

async fn edit_turn(
    engine: &ContextLayeringEngine,
    store: &mut MessageRepository,
    turn_ids: &mut Vec<String>,
    target: usize,
    turn: &ScriptTurn,
    request: &TurnRequest,
) -> Result<(String, ProcessedTurn), Box<dyn std::error::Error>> {
    let id = turn_ids
        .get(target)
        .cloned()
        .ok_or_else(|| format!("Edit refers to turn {target}, which does not exist"))?;

    store.edit_message(&id, &turn.text);
    store.truncate_after_message_id(&id);
    turn_ids.truncate(target + 1);

    let processed = engine
        .reprocess_message_context(&id, store, request)
        .await
        .ok_or_else(|| format!("Message {id} could not be reprocessed"))?;
    Ok((id, processed))
}

fn report(index: usize, id: &str, turn: &ProcessedTurn, chars_per_token: usize) {
    let chars = turn.processed_content.chars().count();
    println!(
        "Turn {} [{id}]: {chars} chars (~{} tokens){}",
        index + 1,
        estimate_tokens(&turn.processed_content, chars_per_token),
        if turn.was_compacted { ", compacted" } else { "" }
    );

    let Some(envelope) = &turn.context_envelope else {
        println!("   ⚠️  Context processing degraded; raw text sent");
        println!();
        return;
    };

    println!("   {} segment(s)", envelope.segment_count());
    for layer in LayerId::ALL {
        let segments = envelope.layer(layer);
        if segments.is_empty() {
            continue;
        }
        let ids: Vec<&str> = segments.iter().map(|s| s.id.as_str()).collect();
        println!("   {:<12} {}", layer.as_str(), ids.join(", "));
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_parses_with_defaults() {
        let script: ConversationScript = serde_json::from_str(
            r#"{
                "chain": "project",
                "turns": [
                    { "text": "one", "notes": ["A.md"], "reply": "ok" },
                    { "text": "two", "edit": 0 }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(script.chain, Some(ChainKind::Project));
        assert_eq!(script.turns.len(), 2);
        assert_eq!(script.turns[0].context().notes[0].path, "A.md");
        assert!(script.turns[0].tags.is_empty());
        assert_eq!(script.turns[1].edit, Some(0));
    }

    #[tokio::test]
    async fn replay_runs_against_a_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault = dir.path().join("vault");
        std::fs::create_dir_all(&vault).unwrap();
        std::fs::write(vault.join("A.md"), "# A\nalpha").unwrap();
        let script = dir.path().join("script.json");
        std::fs::write(
            &script,
            r#"{ "turns": [
                { "text": "first", "notes": ["A.md"], "reply": "ok" },
                { "text": "second", "notes": ["A.md"] },
                { "text": "first, again", "edit": 0 }
            ] }"#,
        )
        .unwrap();

        let options = ReplayOptions {
            chain: None,
            show_prompt: true,
            json: true,
        };
        run(&AppConfig::default(), &script, &vault, options)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn edit_of_unknown_turn_fails() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script.json");
        std::fs::write(&script, r#"{ "turns": [ { "text": "x", "edit": 3 } ] }"#).unwrap();

        let options = ReplayOptions {
            chain: None,
            show_prompt: false,
            json: false,
        };
        let err = run(&AppConfig::default(), &script, dir.path(), options)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("turn 3"));
    }
}
