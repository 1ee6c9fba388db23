//! Pad and link descriptors for the media graph.
//!
//! Each entity declares its pads at creation; the graph uses the pad flags
//! to validate link connections. Pad flags never change afterwards.

use crate::pipeline::id::{EntityId, LinkId, PadId};
use serde::{Deserialize, Serialize};

/// Whether a pad produces or consumes frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadDirection {
    Source,
    Sink,
}

/// Where the data behind a source pad comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadOrigin {
    /// Frames produced inside the managed graph.
    #[default]
    Managed,
    /// Frames injected from outside the graph (client buffers on an output
    /// endpoint). Links leaving such a pad skip format validation.
    External,
}

/// Flags fixed on a pad at entity creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PadFlags {
    pub direction: PadDirection,
    #[serde(default)]
    pub origin: PadOrigin,
}

impl PadFlags {
    pub const fn source() -> Self {
        Self {
            direction: PadDirection::Source,
            origin: PadOrigin::Managed,
        }
    }

    pub const fn sink() -> Self {
        Self {
            direction: PadDirection::Sink,
            origin: PadOrigin::Managed,
        }
    }

    pub const fn external_source() -> Self {
        Self {
            direction: PadDirection::Source,
            origin: PadOrigin::External,
        }
    }

    #[inline]
    pub fn is_source(&self) -> bool {
        self.direction == PadDirection::Source
    }

    #[inline]
    pub fn is_sink(&self) -> bool {
        self.direction == PadDirection::Sink
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.origin == PadOrigin::External
    }
}

/// A pad owned by an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pad {
    pub id: PadId,
    pub flags: PadFlags,
}

impl Pad {
    pub fn new(entity: EntityId, index: u16, flags: PadFlags) -> Self {
        Self {
            id: PadId::new(entity, index),
            flags,
        }
    }

    #[inline]
    pub fn entity(&self) -> EntityId {
        self.id.entity()
    }

    #[inline]
    pub fn index(&self) -> u16 {
        self.id.pad_index()
    }
}

/// Connection flags carried by a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkFlags {
    /// The link carries frames in the current topology.
    #[serde(default)]
    pub enabled: bool,
    /// The enabled state cannot be changed after creation.
    #[serde(default)]
    pub immutable: bool,
}

impl LinkFlags {
    pub const DISABLED: LinkFlags = LinkFlags {
        enabled: false,
        immutable: false,
    };

    pub const ENABLED: LinkFlags = LinkFlags {
        enabled: true,
        immutable: false,
    };

    pub const IMMUTABLE: LinkFlags = LinkFlags {
        enabled: true,
        immutable: true,
    };
}

/// A directed edge from a source pad to a sink pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub source: PadId,
    pub sink: PadId,
    pub flags: LinkFlags,
}

impl Link {
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.flags.enabled
    }

    /// Whether either end of this link belongs to `entity`.
    pub fn touches(&self, entity: EntityId) -> bool {
        self.source.entity() == entity || self.sink.entity() == entity
    }
}
