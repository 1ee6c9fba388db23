use crate::pipeline::id::{EntityId, LinkId};

/// Pipeline of one endpoint, computed at stream start.
/// Contains the entities that feed the endpoint through enabled links.
#[derive(Debug, Clone)]
pub struct StreamPlan {
    /// Entity the plan was compiled for
    pub endpoint: EntityId,

    /// Entities in topological order, producers first
    pub entities: Vec<EntityId>,

    /// Links to validate and route
    pub links: Vec<LinkId>,

    /// Graph generation the plan was compiled against
    pub generation: u64,

    /// Compilation statistics
    pub stats: PlanStats,
}

/// Statistics about a compiled plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Live entities in the graph
    pub total_entities: usize,

    /// Entities in the plan
    pub plan_entities: usize,

    /// Links in the plan
    pub plan_links: usize,

    /// Plan entities with no upstream link in the plan
    pub producers: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl StreamPlan {
    /// Entities in start order: consumers before producers.
    pub fn start_order(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().rev().copied()
    }

    /// Entities in stop order: producers before consumers.
    pub fn stop_order(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().copied()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }
}
