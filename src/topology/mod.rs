//! Building a media graph from a topology description.
//!
//! A description lists entities as `driver:name` strings and links as
//! `source:pad->sink:pad` strings (see [`crate::config::TopologyConfig`]).
//! Construction is all or nothing: when any entity or link fails, every
//! entity created so far is destroyed again.

pub mod parser;
pub mod registry;

pub use parser::{parse_entity, parse_link, EntityDescriptor, LinkDescriptor, PadRef};
pub use registry::{EntityFactory, EntityRegistry, EntitySpec};

use crate::config::{LinkConfig, TopologyConfig};
use crate::error::{Result, ResultExt, SimError};
use crate::pipeline::{EntityId, LinkFlags, LinkId, MediaGraph, PadFlags, PadId};
use std::collections::HashMap;

/// Entities and links created by one [`TopologyBuilder::build`] call.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub entities: HashMap<String, EntityId>,
    pub links: Vec<LinkId>,
}

impl Topology {
    pub fn entity(&self, name: &str) -> Option<EntityId> {
        self.entities.get(name).copied()
    }
}

pub struct TopologyBuilder<'r> {
    registry: &'r EntityRegistry,
}

impl<'r> TopologyBuilder<'r> {
    pub fn new(registry: &'r EntityRegistry) -> Self {
        Self { registry }
    }

    /// Create every entity and link of `config` in `graph`.
    pub fn build(&self, graph: &MediaGraph, config: &TopologyConfig) -> Result<Topology> {
        // Parse everything up front so malformed text never touches the graph
        let entities = config
            .entities
            .iter()
            .map(|e| parse_entity(&e.node).map(|d| (d, e.pads.as_deref())))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Invalid entity descriptor")?;
        let links = config
            .links
            .iter()
            .map(|l| parse_link(&l.path).map(|d| (d, l)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Invalid link descriptor")?;

        for (descriptor, _) in &entities {
            if !self.registry.contains(&descriptor.driver) {
                return Err(SimError::Topology(format!(
                    "unknown driver '{}' for '{}'",
                    descriptor.driver, descriptor.name
                )));
            }
        }

        let mut topology = Topology::default();
        let result = self.populate(graph, &entities, &links, &mut topology);
        if let Err(e) = result {
            tracing::warn!(
                "Topology build failed, removing {} entities: {}",
                topology.entities.len(),
                e
            );
            for id in topology.entities.values() {
                if let Err(destroy_err) = graph.destroy_entity(*id) {
                    tracing::error!("Failed to remove {:?}: {}", id, destroy_err);
                }
            }
            return Err(e);
        }

        tracing::info!(
            "Built topology with {} entities and {} links",
            topology.entities.len(),
            topology.links.len()
        );
        Ok(topology)
    }

    fn populate(
        &self,
        graph: &MediaGraph,
        entities: &[(EntityDescriptor, Option<&[PadFlags]>)],
        links: &[(LinkDescriptor, &LinkConfig)],
        topology: &mut Topology,
    ) -> Result<()> {
        for (descriptor, pads) in entities {
            let spec = EntitySpec {
                name: &descriptor.name,
                pads: *pads,
                params: graph.params(),
            };
            let entity = self
                .registry
                .create(&descriptor.driver, &spec)
                .with_context(|| format!("Failed to create '{}'", descriptor.name))?;
            let id = graph
                .add_entity(&descriptor.name, entity)
                .with_context(|| format!("Failed to add '{}'", descriptor.name))?;
            topology.entities.insert(descriptor.name.clone(), id);
        }

        for (descriptor, config) in links {
            let source = resolve_pad(topology, &descriptor.source)?;
            let sink = resolve_pad(topology, &descriptor.sink)?;
            let flags = LinkFlags {
                enabled: config.enabled,
                immutable: config.immutable,
            };
            let id = graph
                .create_link(source, sink, flags)
                .with_context(|| format!("Failed to create link '{}'", config.path))?;
            topology.links.push(id);
        }
        Ok(())
    }
}

fn resolve_pad(topology: &Topology, pad: &PadRef) -> Result<PadId> {
    let entity = topology.entity(&pad.entity).ok_or_else(|| {
        SimError::Topology(format!("link names unknown entity '{}'", pad.entity))
    })?;
    Ok(PadId::new(entity, pad.pad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EntityConfig, LinkConfig};

    fn small_config() -> TopologyConfig {
        TopologyConfig {
            entities: vec![
                EntityConfig::new("vimc-sensor:Sensor A"),
                EntityConfig::new("vimc-capture:Raw Capture 0"),
            ],
            links: vec![LinkConfig::immutable("Sensor A:0->Raw Capture 0:0")],
        }
    }

    #[test]
    fn test_build_small_topology() {
        let graph = MediaGraph::default();
        let registry = EntityRegistry::with_builtins();
        let topology = TopologyBuilder::new(&registry)
            .build(&graph, &small_config())
            .unwrap();

        assert_eq!(topology.entities.len(), 2);
        assert_eq!(topology.links.len(), 1);
        let link = graph.link(topology.links[0]).unwrap();
        assert!(link.flags.immutable);
        assert_eq!(link.source.entity(), topology.entity("Sensor A").unwrap());
    }

    #[test]
    fn test_unknown_driver_creates_nothing() {
        let graph = MediaGraph::default();
        let registry = EntityRegistry::with_builtins();
        let mut config = small_config();
        config.entities.push(EntityConfig::new("vimc-lens:Lens"));

        let err = TopologyBuilder::new(&registry)
            .build(&graph, &config)
            .unwrap_err();
        assert!(matches!(err, SimError::Topology(_)));
        assert!(graph.entity_ids().is_empty());
    }

    #[test]
    fn test_bad_link_rolls_back_entities() {
        let graph = MediaGraph::default();
        let registry = EntityRegistry::with_builtins();
        let mut config = small_config();
        config.links.push(LinkConfig::enabled("Sensor A:0->Nowhere:0"));

        assert!(TopologyBuilder::new(&registry).build(&graph, &config).is_err());
        assert!(graph.entity_ids().is_empty());
        assert!(graph.entity_id("Sensor A").is_none());
    }

    #[test]
    fn test_malformed_descriptor() {
        let graph = MediaGraph::default();
        let registry = EntityRegistry::with_builtins();
        let mut config = small_config();
        config.links[0].path = "Sensor A:0 Raw Capture 0:0".to_string();

        let err = TopologyBuilder::new(&registry)
            .build(&graph, &config)
            .unwrap_err();
        assert!(matches!(
            err.pipeline_error(),
            Some(crate::pipeline::PipelineError::InvalidArgument(_))
        ));
        assert!(graph.entity_ids().is_empty());
    }
}
