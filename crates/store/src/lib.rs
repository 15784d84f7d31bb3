//! Message storage for contextweave.
//!
//! - [`MessageRepository`] keeps one conversation's messages and computes the
//!   display and LLM views on demand.
//! - [`ConversationRegistry`] keeps one repository per conversation.

pub mod registry;
pub mod repository;

pub use registry::{ConversationId, ConversationRegistry};
pub use repository::{DebugInfo, MessageRepository};
