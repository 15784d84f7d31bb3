//! # contextweave Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! contextweave prompt-context layering engine. This crate has **zero
//! framework dependencies**. It defines the domain model that the store,
//! the engine and the host application implement against.
//!
//! ## Design Philosophy
//!
//! Everything the engine does not own (rendering notes, fetching URLs,
//! summarizing text, querying the browser) is a trait here. This enables:
//! - Swapping implementations per host
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod attachment;
pub mod chain;
pub mod context;
pub mod envelope;
pub mod error;
pub mod message;

// Re-export key types at crate root for ergonomics
pub use attachment::{MessageContext, NoteRef, SelectedTextContext, SelectedTextSource, WebTab};
pub use chain::ChainKind;
pub use context::{
    ActiveTabProvider, CompactionOutcome, ContextCompactor, ContextRenderer,
    FileReferenceResolver, NoActiveTab, NoUrlContext, PassthroughTemplates, ProcessedPrompt,
    PromptTemplateProcessor, RenderedNote, UrlContext, UrlContextResolver,
};
pub use envelope::{
    LayerId, PromptContextEnvelope, PromptLayerSegment, SegmentMetadata, SegmentSource,
};
pub use error::ContextError;
pub use message::{ChatMessage, NewMessage, Sender, Source, StoredMessage, generate_message_id};
