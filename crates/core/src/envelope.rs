//! Prompt context envelope: the structured record of what went into a turn.
//!
//! An envelope groups [`PromptLayerSegment`]s under fixed layer ids. The
//! layers always sort in semantic order:
//!
//! | Layer | Contents | Stable across turns |
//! |-------|----------|---------------------|
//! | `L1_SYSTEM` | System prompt | yes |
//! | `L2_PREVIOUS` | Library built from earlier turns | yes |
//! | `L3_TURN` | Context first attached on this turn | no |
//! | `L5_USER` | The user's processed input | no |
//!
//! `L4` is reserved. Nothing may be stored under it and the remaining ids
//! keep their numbers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Layer identifier. Declaration order is the semantic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LayerId {
    #[serde(rename = "L1_SYSTEM")]
    L1System,
    #[serde(rename = "L2_PREVIOUS")]
    L2Previous,
    #[serde(rename = "L3_TURN")]
    L3Turn,
    #[serde(rename = "L5_USER")]
    L5User,
}

impl LayerId {
    pub const ALL: [LayerId; 4] = [
        LayerId::L1System,
        LayerId::L2Previous,
        LayerId::L3Turn,
        LayerId::L5User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerId::L1System => "L1_SYSTEM",
            LayerId::L2Previous => "L2_PREVIOUS",
            LayerId::L3Turn => "L3_TURN",
            LayerId::L5User => "L5_USER",
        }
    }

    /// Whether segments in this layer are expected to be byte-identical
    /// from one turn to the next.
    pub fn is_stable(&self) -> bool {
        matches!(self, LayerId::L1System | LayerId::L2Previous)
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of material a segment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentSource {
    System,
    Note,
    ActiveNote,
    Tags,
    Folders,
    Urls,
    SelectedText,
    WebTabs,
    Compacted,
    PreviousTurn,
    RefetchInstruction,
    User,
}

/// Free-form bookkeeping attached to a segment.
///
/// The path fields feed cross-turn deduplication: every path recorded here on
/// an `L3_TURN` segment is excluded from later turns' new context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SegmentSource>,

    /// Path of the single note this segment renders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_path: Option<String>,

    /// Paths covered by an aggregate segment (tags, folders).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub note_paths: Vec<String>,

    /// Paths folded into a compacted segment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compacted_paths: Vec<String>,

    #[serde(default)]
    pub was_compacted: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_char_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compacted_char_count: Option<usize>,

    /// Message the material was first attached to (L2 segments).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl SegmentMetadata {
    pub fn from_source(source: SegmentSource) -> Self {
        Self {
            source: Some(source),
            ..Default::default()
        }
    }

    /// Every source path this segment accounts for.
    pub fn source_paths(&self) -> impl Iterator<Item = &str> {
        self.note_path
            .iter()
            .chain(self.note_paths.iter())
            .chain(self.compacted_paths.iter())
            .chain(self.urls.iter())
            .map(String::as_str)
    }
}

/// One addressable unit of content within a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptLayerSegment {
    /// Stable identity: a file path, a segment kind, or a note path.
    pub id: String,
    pub content: String,
    pub stable: bool,
    #[serde(default)]
    pub metadata: SegmentMetadata,
}

impl PromptLayerSegment {
    pub fn new(id: impl Into<String>, content: impl Into<String>, stable: bool) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            stable,
            metadata: SegmentMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: SegmentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_compacted(&self) -> bool {
        self.metadata.was_compacted
    }
}

/// Per-message record of the layered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContextEnvelope {
    pub message_id: String,
    pub layers: BTreeMap<LayerId, Vec<PromptLayerSegment>>,
}

impl PromptContextEnvelope {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            layers: BTreeMap::new(),
        }
    }

    /// Append a segment to a layer.
    pub fn push(&mut self, layer: LayerId, segment: PromptLayerSegment) {
        self.layers.entry(layer).or_default().push(segment);
    }

    /// Segments of a layer, empty when the layer is absent.
    pub fn layer(&self, layer: LayerId) -> &[PromptLayerSegment] {
        self.layers.get(&layer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when this turn's new context was replaced by a compacted summary.
    pub fn is_turn_compacted(&self) -> bool {
        self.layer(LayerId::L3Turn).iter().any(|s| s.is_compacted())
    }

    /// Every source path recorded on the `L3_TURN` segments.
    pub fn turn_source_paths(&self) -> impl Iterator<Item = &str> {
        self.layer(LayerId::L3Turn)
            .iter()
            .flat_map(|s| s.metadata.source_paths())
    }

    pub fn segment_count(&self) -> usize {
        self.layers.values().map(Vec::len).sum()
    }

    /// Concatenated content of one layer, segments separated by a blank line.
    pub fn layer_text(&self, layer: LayerId) -> String {
        self.layer(layer)
            .iter()
            .map(|s| s.content.as_str())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
