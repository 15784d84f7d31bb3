//! Per-turn context assembly.
//!
//! | Module | Role |
//! |--------|------|
//! | [`layering`] | The pipeline: dedup, compaction, envelope |
//! | [`library`] | Previous-turn library built from stored envelopes |
//! | [`reduce`] | Structure-plus-preview reduction for the library |
//! | [`token`] | Character and token estimates |

pub mod layering;
pub mod library;
pub mod reduce;
pub mod token;

pub use layering::{COMPACTED_SEGMENT_ID, ContextLayeringEngine, ProcessedTurn, TurnRequest};
pub use library::{PreviousTurnLibrary, REFETCH_INSTRUCTION, REFETCH_SEGMENT_ID};
pub use reduce::{L2Reduction, compact_for_l2};
