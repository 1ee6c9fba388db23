//! Entity kind enumeration for registry-driven entity creation.

use crate::pipeline::pad::PadFlags;
use serde::{Deserialize, Serialize};

/// Kinds of entities the graph knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    // Producers
    /// Synthetic frame generator.
    Sensor,

    // Transforms
    /// Bayer to RGB conversion.
    Debayer,
    /// Integer upscaler.
    Scaler,

    // Endpoints
    /// Copies frames into client buffers.
    Capture,
    /// Feeds client buffers into the graph.
    Output,

    /// Externally supplied entity behind the plugin trait.
    Custom,
}

impl EntityKind {
    /// Get the display name for this entity kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            EntityKind::Sensor => "Sensor",
            EntityKind::Debayer => "Debayer",
            EntityKind::Scaler => "Scaler",
            EntityKind::Capture => "Capture",
            EntityKind::Output => "Output",
            EntityKind::Custom => "Custom",
        }
    }

    /// Driver name used in topology descriptions.
    pub fn driver_name(&self) -> &'static str {
        match self {
            EntityKind::Sensor => "sensor",
            EntityKind::Debayer => "debayer",
            EntityKind::Scaler => "scaler",
            EntityKind::Capture => "capture",
            EntityKind::Output => "output",
            EntityKind::Custom => "custom",
        }
    }

    /// All kinds with a builtin implementation.
    pub fn builtin() -> &'static [EntityKind] {
        &[
            EntityKind::Sensor,
            EntityKind::Debayer,
            EntityKind::Scaler,
            EntityKind::Capture,
            EntityKind::Output,
        ]
    }

    /// Endpoints exchange frames with clients through a buffer queue.
    pub fn is_endpoint(&self) -> bool {
        matches!(self, EntityKind::Capture | EntityKind::Output)
    }

    pub fn is_transform(&self) -> bool {
        matches!(self, EntityKind::Debayer | EntityKind::Scaler)
    }

    /// Pad layout used when a topology description does not list pads.
    pub fn default_pads(&self) -> &'static [PadFlags] {
        const SOURCE_ONLY: &[PadFlags] = &[PadFlags::source()];
        const SINK_SOURCE: &[PadFlags] = &[PadFlags::sink(), PadFlags::source()];
        const SINK_ONLY: &[PadFlags] = &[PadFlags::sink()];
        const EXTERNAL_SOURCE: &[PadFlags] = &[PadFlags::external_source()];

        match self {
            EntityKind::Sensor => SOURCE_ONLY,
            EntityKind::Debayer | EntityKind::Scaler | EntityKind::Custom => SINK_SOURCE,
            EntityKind::Capture => SINK_ONLY,
            EntityKind::Output => EXTERNAL_SOURCE,
        }
    }

    /// Check whether `pads` is a layout this kind can serve.
    pub fn check_pads(&self, pads: &[PadFlags]) -> Result<(), String> {
        let sinks = pads.iter().filter(|p| p.is_sink()).count();
        let sources = pads.len() - sinks;
        let ok = match self {
            EntityKind::Sensor => sinks == 0 && sources >= 1,
            EntityKind::Debayer | EntityKind::Scaler => sinks >= 1 && sources >= 1,
            EntityKind::Capture => sinks == 1 && sources == 0,
            EntityKind::Output => sinks == 0 && sources == 1,
            EntityKind::Custom => !pads.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(format!(
                "{} cannot have {} sink and {} source pads",
                self.display_name(),
                sinks,
                sources
            ))
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pads_are_valid() {
        for kind in EntityKind::builtin() {
            assert!(kind.check_pads(kind.default_pads()).is_ok(), "{}", kind);
        }
    }

    #[test]
    fn test_bad_layouts() {
        assert!(EntityKind::Sensor.check_pads(&[PadFlags::sink()]).is_err());
        assert!(EntityKind::Capture
            .check_pads(&[PadFlags::sink(), PadFlags::sink()])
            .is_err());
        assert!(EntityKind::Scaler.check_pads(&[PadFlags::source()]).is_err());
        assert!(EntityKind::Output.check_pads(&[]).is_err());
    }

    #[test]
    fn test_kind_serde_names() {
        let kind: EntityKind = serde_json::from_str("\"debayer\"").unwrap();
        assert_eq!(kind, EntityKind::Debayer);
        assert_eq!(kind.driver_name(), "debayer");
    }
}
