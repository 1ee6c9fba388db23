//! Driver name to entity factory mapping.

use crate::pipeline::{
    AnyEntity, BuiltinEntity, EntityKind, EntityParams, PadFlags, PipelineError, PipelineResult,
};
use std::collections::BTreeMap;

/// Everything a factory gets to build one entity.
pub struct EntitySpec<'a> {
    pub name: &'a str,
    /// Pad layout from the description, `None` to use the driver default.
    pub pads: Option<&'a [PadFlags]>,
    pub params: &'a EntityParams,
}

/// Builds an entity from a spec.
pub type EntityFactory = Box<dyn Fn(&EntitySpec<'_>) -> PipelineResult<AnyEntity> + Send + Sync>;

/// Explicit registry of entity drivers, passed by reference to the topology
/// builder.
#[derive(Default)]
pub struct EntityRegistry {
    factories: BTreeMap<String, EntityFactory>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every builtin kind under its plain driver name and a
    /// `vimc-` prefixed alias.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for &kind in EntityKind::builtin() {
            registry.register(kind.driver_name(), builtin_factory(kind));
            registry.register(&format!("vimc-{}", kind.driver_name()), builtin_factory(kind));
        }
        registry
    }

    /// Register `factory` under `driver`, replacing any previous one.
    pub fn register(&mut self, driver: &str, factory: EntityFactory) {
        if self.factories.insert(driver.to_string(), factory).is_some() {
            tracing::debug!("Driver '{}' re-registered", driver);
        }
    }

    pub fn contains(&self, driver: &str) -> bool {
        self.factories.contains_key(driver)
    }

    pub fn drivers(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, driver: &str, spec: &EntitySpec<'_>) -> PipelineResult<AnyEntity> {
        let factory = self
            .factories
            .get(driver)
            .ok_or_else(|| PipelineError::invalid(format!("unknown driver '{}'", driver)))?;
        factory(spec)
    }
}

fn builtin_factory(kind: EntityKind) -> EntityFactory {
    Box::new(move |spec| {
        let pads = spec.pads.unwrap_or(kind.default_pads()).to_vec();
        Ok(BuiltinEntity::build(kind, pads, spec.params)?.into())
    })
}
