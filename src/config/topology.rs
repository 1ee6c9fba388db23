//! Topology description stored in the configuration file.

use crate::pipeline::PadFlags;
use serde::{Deserialize, Serialize};

/// One entity, written `driver:name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub node: String,
    /// Explicit pad layout; the driver default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pads: Option<Vec<PadFlags>>,
}

impl EntityConfig {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            pads: None,
        }
    }

    pub fn with_pads(mut self, pads: Vec<PadFlags>) -> Self {
        self.pads = Some(pads);
        self
    }
}

/// One link, written `source:pad->sink:pad`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub path: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub immutable: bool,
}

fn default_enabled() -> bool {
    true
}

impl LinkConfig {
    pub fn enabled(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
            immutable: false,
        }
    }

    pub fn disabled(path: impl Into<String>) -> Self {
        Self {
            enabled: false,
            ..Self::enabled(path)
        }
    }

    pub fn immutable(path: impl Into<String>) -> Self {
        Self {
            immutable: true,
            ..Self::enabled(path)
        }
    }
}

/// Entities and links to build at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub entities: Vec<EntityConfig>,
    pub links: Vec<LinkConfig>,
}

impl TopologyConfig {
    /// A description with no entities.
    pub fn empty() -> Self {
        Self {
            entities: Vec::new(),
            links: Vec::new(),
        }
    }
}

/// The classic virtual media controller layout: two sensors each feeding a
/// raw capture and a debayer, one debayer at a time feeding the scaler, and
/// an RGB/YUV output that can replace the debayers as scaler input.
impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            entities: vec![
                EntityConfig::new("vimc-sensor:Sensor A"),
                EntityConfig::new("vimc-sensor:Sensor B"),
                EntityConfig::new("vimc-debayer:Debayer A"),
                EntityConfig::new("vimc-debayer:Debayer B"),
                EntityConfig::new("vimc-capture:Raw Capture 0"),
                EntityConfig::new("vimc-capture:Raw Capture 1"),
                EntityConfig::new("vimc-output:RGB/YUV Input"),
                EntityConfig::new("vimc-scaler:Scaler"),
                EntityConfig::new("vimc-capture:RGB/YUV Capture"),
            ],
            links: vec![
                LinkConfig::immutable("Sensor A:0->Debayer A:0"),
                LinkConfig::immutable("Sensor A:0->Raw Capture 0:0"),
                LinkConfig::immutable("Sensor B:0->Debayer B:0"),
                LinkConfig::immutable("Sensor B:0->Raw Capture 1:0"),
                LinkConfig::enabled("Debayer A:1->Scaler:0"),
                LinkConfig::disabled("Debayer B:1->Scaler:0"),
                LinkConfig::disabled("RGB/YUV Input:0->Scaler:0"),
                LinkConfig::immutable("Scaler:1->RGB/YUV Capture:0"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let topology = TopologyConfig::default();
        assert_eq!(topology.entities.len(), 9);
        let into_scaler: Vec<_> = topology
            .links
            .iter()
            .filter(|l| l.path.ends_with("->Scaler:0"))
            .collect();
        assert_eq!(into_scaler.len(), 3);
        assert_eq!(into_scaler.iter().filter(|l| l.enabled).count(), 1);
    }

    #[test]
    fn test_link_defaults_from_toml() {
        let link: LinkConfig = toml::from_str(r#"path = "A:0->B:0""#).unwrap();
        assert!(link.enabled);
        assert!(!link.immutable);
    }
}
