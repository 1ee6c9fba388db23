//! Identity types for the media graph.
//!
//! Entity and link IDs index the graph's slot vectors directly. Slots are
//! never reused, so a stale ID finds an empty slot rather than a different
//! entity. Pads are addressed by packing the owning entity and the pad index
//! into one word.

use std::fmt;

macro_rules! slot_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

slot_id!(
    /// Slot of an entity in the graph.
    EntityId
);

slot_id!(
    /// Slot of a link in the graph.
    LinkId
);

/// Pad address: entity slot in the high 20 bits, pad index in the low 12.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadId(pub u32);

impl PadId {
    const PAD_BITS: u32 = 12;
    const PAD_MASK: u32 = (1 << Self::PAD_BITS) - 1;

    /// Largest number of pads one entity may own.
    pub const MAX_PADS: usize = 1 << Self::PAD_BITS;

    pub fn new(entity: EntityId, pad_index: u16) -> Self {
        debug_assert!((pad_index as usize) < Self::MAX_PADS);
        Self((entity.0 << Self::PAD_BITS) | (u32::from(pad_index) & Self::PAD_MASK))
    }

    #[inline]
    pub fn entity(self) -> EntityId {
        EntityId(self.0 >> Self::PAD_BITS)
    }

    #[inline]
    pub fn pad_index(self) -> u16 {
        (self.0 & Self::PAD_MASK) as u16
    }
}

impl fmt::Debug for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pad({}:{})", self.entity().0, self.pad_index())
    }
}
