//! The contextweave layering engine.
//!
//! Given a stored user message and the conversation it belongs to, the
//! engine assembles the text actually sent to the model:
//!
//! 1. **Library**: earlier turns' context, reduced to outline and preview
//! 2. **New context**: notes, tags, folders and URLs not seen before
//! 3. **Ephemeral context**: selected text and browser tabs, every turn
//! 4. **Compaction**: when the context crosses the chain's threshold
//!
//! The result is written back to the [`contextweave_store::MessageRepository`]
//! as processed text plus a layered [`contextweave_core::PromptContextEnvelope`].

pub mod context;
pub mod web_tabs;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{
    COMPACTED_SEGMENT_ID, ContextLayeringEngine, L2Reduction, PreviousTurnLibrary, ProcessedTurn,
    REFETCH_INSTRUCTION, REFETCH_SEGMENT_ID, TurnRequest, compact_for_l2,
};
pub use web_tabs::{
    ACTIVE_WEB_TAB_MARKER, inject_active_tab, normalize_url, sanitize_web_tabs,
    should_include_active_tab,
};
