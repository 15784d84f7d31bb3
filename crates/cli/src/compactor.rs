//! Offline compactor: keeps each block's outline and a short preview.
//!
//! Hosts with model access would summarize instead. This one needs no
//! network, so replays stay deterministic.

use async_trait::async_trait;
use contextweave_core::{CompactionOutcome, ContextCompactor, ContextError};
use contextweave_engine::compact_for_l2;
use tracing::debug;

pub struct OutlineCompactor {
    preview_chars: usize,
    max_headings: usize,
}

impl OutlineCompactor {
    pub fn new(preview_chars: usize, max_headings: usize) -> Self {
        Self {
            preview_chars,
            max_headings,
        }
    }
}

#[async_trait]
impl ContextCompactor for OutlineCompactor {
    async fn compact(&self, text: &str) -> Result<CompactionOutcome, ContextError> {
        let reduced = compact_for_l2(text, self.preview_chars, self.max_headings);
        let content = format!("<compacted_context>\n{}\n</compacted_context>", reduced.content);

        let original_char_count = text.chars().count();
        let compacted_char_count = content.chars().count();
        if compacted_char_count >= original_char_count {
            debug!(original_char_count, "Compaction would not shrink the text");
            return Ok(CompactionOutcome::unchanged(text));
        }

        Ok(CompactionOutcome {
            was_compacted: true,
            content,
            original_char_count,
            compacted_char_count,
        })
    }
}
