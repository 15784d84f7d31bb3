//! The previous-turn library (`L2_PREVIOUS`).
//!
//! Built from the stored envelopes of a conversation's earlier user turns:
//!
//! - Every source path any prior `L3_TURN` segment accounts for joins the
//!   exclusion set, whether or not its text is still present.
//! - Text is only carried from the most recent compacted turn onward. That
//!   turn's compacted segment already summarizes everything before it.
//! - Compacted segments are carried verbatim; everything else is reduced
//!   with [`compact_for_l2`].

use std::collections::HashSet;

use contextweave_config::LayeringConfig;
use contextweave_core::{
    LayerId, PromptLayerSegment, SegmentMetadata, SegmentSource, StoredMessage,
};

use crate::context::reduce::compact_for_l2;

/// Segment id of the re-fetch instruction.
pub const REFETCH_SEGMENT_ID: &str = "refetch_instruction";

/// Appended once when the library holds summarized or previewed material.
pub const REFETCH_INSTRUCTION: &str = "<refetch_instruction>\n\
Some notes from earlier in this conversation are shown only as summaries or \
previews. If you need the full content of one of them, ask the user to \
attach it again or reference it by its path.\n\
</refetch_instruction>";

#[derive(Debug, Clone, Default)]
pub struct PreviousTurnLibrary {
    segments: Vec<PromptLayerSegment>,
    excluded_paths: HashSet<String>,
    has_reduced_material: bool,
}

impl PreviousTurnLibrary {
    /// Build the library from prior user messages, oldest first.
    pub fn build(prior: &[&StoredMessage], policy: &LayeringConfig) -> Self {
        let mut library = Self::default();

        let envelopes: Vec<_> = prior
            .iter()
            .filter_map(|m| m.context_envelope.as_ref().map(|env| (m.id.as_str(), env)))
            .collect();

        for (_, envelope) in &envelopes {
            library
                .excluded_paths
                .extend(envelope.turn_source_paths().map(str::to_string));
        }

        let start = envelopes
            .iter()
            .rposition(|(_, env)| env.is_turn_compacted())
            .unwrap_or(0);

        for (message_id, envelope) in &envelopes[start..] {
            for segment in envelope.layer(LayerId::L3Turn) {
                library.push_prior_segment(message_id, segment, policy);
            }
        }

        if library.has_reduced_material {
            library.segments.push(
                PromptLayerSegment::new(REFETCH_SEGMENT_ID, REFETCH_INSTRUCTION, true)
                    .with_metadata(SegmentMetadata::from_source(
                        SegmentSource::RefetchInstruction,
                    )),
            );
        }

        library
    }

    fn push_prior_segment(
        &mut self,
        message_id: &str,
        segment: &PromptLayerSegment,
        policy: &LayeringConfig,
    ) {
        let content = if segment.is_compacted() {
            self.has_reduced_material = true;
            segment.content.clone()
        } else {
            let reduced =
                compact_for_l2(&segment.content, policy.l2_preview_chars, policy.l2_max_headings);
            self.has_reduced_material |= reduced.truncated;
            reduced.content
        };
        if content.is_empty() {
            return;
        }

        let id = match &segment.metadata.note_path {
            Some(path) => path.clone(),
            None => format!("{message_id}#{}", segment.id),
        };
        let metadata = SegmentMetadata {
            source: Some(SegmentSource::PreviousTurn),
            message_id: Some(message_id.to_string()),
            ..segment.metadata.clone()
        };
        self.segments
            .push(PromptLayerSegment::new(id, content, true).with_metadata(metadata));
    }

    pub fn segments(&self) -> &[PromptLayerSegment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<PromptLayerSegment> {
        self.segments
    }

    /// Paths later turns must not render again.
    pub fn excluded_paths(&self) -> &HashSet<String> {
        &self.excluded_paths
    }

    /// Whether the re-fetch instruction was appended.
    pub fn has_reduced_material(&self) -> bool {
        self.has_reduced_material
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The library as prompt text, segments separated by a blank line.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
