//! The media graph: entities, pads, links and the streaming lifecycle.
//!
//! All topology state sits behind one mutex. Entity slots are shared with the
//! router through `Arc`, so the frame path never touches the graph lock.
//! Topology changes are refused while any pipeline streams.

use crate::pipeline::buffer::BufferState;
use crate::pipeline::compiled_plan::StreamPlan;
use crate::pipeline::compiler::PipelineCompiler;
use crate::pipeline::entities::EntityParams;
use crate::pipeline::entity::{AnyEntity, BuiltinEntity, StreamState};
use crate::pipeline::entity_kind::EntityKind;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::{MbusFormat, PixFormat};
use crate::pipeline::id::{EntityId, LinkId, PadId};
use crate::pipeline::pad::{Link, LinkFlags, PadFlags};
use crate::pipeline::router::{Router, RouteSpec, SharedRouter};
use crate::pipeline::slot::{EntitySlot, EntityStats};
use crate::pipeline::sync::{lock, read, write};
use crate::pipeline::validate::validate_link;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct GraphState {
    entities: Vec<Option<Arc<EntitySlot>>>,
    links: Vec<Option<Link>>,
    names: HashMap<String, EntityId>,
    active_plans: HashMap<EntityId, StreamPlan>,
    /// Bumped on every topology change.
    generation: u64,
}

impl GraphState {
    fn slot(&self, id: EntityId) -> PipelineResult<&Arc<EntitySlot>> {
        self.entities
            .get(id.index())
            .and_then(|s| s.as_ref())
            .ok_or(PipelineError::UnknownEntity(id))
    }

    fn link(&self, id: LinkId) -> PipelineResult<&Link> {
        self.links
            .get(id.index())
            .and_then(|l| l.as_ref())
            .ok_or(PipelineError::UnknownLink(id))
    }

    fn pad_flags(&self, pad: PadId) -> PipelineResult<PadFlags> {
        let slot = self.slot(pad.entity())?;
        slot.pad(pad.pad_index())
            .map(|p| p.flags)
            .ok_or_else(|| PipelineError::invalid(format!("{:?} does not exist", pad)))
    }

    /// Refuse topology changes while anything streams.
    fn ensure_idle(&self) -> PipelineResult<()> {
        match self.active_plans.keys().next() {
            Some(endpoint) => {
                let name = self
                    .slot(*endpoint)
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|_| endpoint.to_string());
                Err(PipelineError::AlreadyStreaming(name))
            }
            None => Ok(()),
        }
    }

    fn enabled_into(&self, sink: PadId, except: Option<LinkId>) -> Option<LinkId> {
        self.links
            .iter()
            .flatten()
            .find(|l| l.sink == sink && l.is_enabled() && Some(l.id) != except)
            .map(|l| l.id)
    }

    /// Check if adding a link from `from` to `to` would create a cycle.
    fn would_create_cycle(&self, from: EntityId, to: EntityId) -> bool {
        // If `to` can reach `from` through existing links, adding from->to creates a cycle.
        let mut visited = vec![false; self.entities.len()];
        let mut stack = vec![to];

        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            let idx = current.index();
            if idx >= self.entities.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;

            for link in self.links.iter().flatten() {
                if link.source.entity() == current {
                    stack.push(link.sink.entity());
                }
            }
        }
        false
    }

    fn compile(&self, endpoint: EntityId) -> StreamPlan {
        PipelineCompiler::compile(endpoint, &self.entities, &self.links, self.generation)
    }

    fn validate(&self, link: &Link) -> PipelineResult<()> {
        let source_flags = self.pad_flags(link.source)?;
        let source = self
            .slot(link.source.entity())?
            .entity()
            .format(link.source.pad_index())?;
        let sink = self
            .slot(link.sink.entity())?
            .entity()
            .format(link.sink.pad_index())?;
        validate_link(link, source_flags, &source, &sink)
    }
}

/// Serializable view of the graph.
#[derive(Debug, Clone, Serialize)]
pub struct TopologySnapshot {
    pub entities: Vec<EntitySnapshot>,
    pub links: Vec<LinkSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitySnapshot {
    pub id: u32,
    pub name: String,
    pub kind: EntityKind,
    pub state: StreamState,
    pub pads: Vec<PadSnapshot>,
    pub stats: EntityStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct PadSnapshot {
    pub index: u16,
    pub flags: PadFlags,
    pub format: Option<MbusFormat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkSnapshot {
    pub id: u32,
    pub source: String,
    pub sink: String,
    pub enabled: bool,
    pub immutable: bool,
    /// Routed by an active pipeline.
    pub active: bool,
}

/// Entity/pad/link graph with its streaming state machine.
pub struct MediaGraph {
    state: Mutex<GraphState>,
    router: SharedRouter,
    params: EntityParams,
}

impl Default for MediaGraph {
    fn default() -> Self {
        Self::new(EntityParams::default())
    }
}

impl MediaGraph {
    pub fn new(params: EntityParams) -> Self {
        Self {
            state: Mutex::new(GraphState::default()),
            router: Router::shared(),
            params,
        }
    }

    /// Parameters used for builtin entities created by this graph.
    pub fn params(&self) -> &EntityParams {
        &self.params
    }

    fn state(&self) -> MutexGuard<'_, GraphState> {
        lock(&self.state)
    }

    // ── Construction ──

    /// Create a builtin entity of `kind` with the given pad layout.
    pub fn create_entity(
        &self,
        kind: EntityKind,
        name: &str,
        pad_count: usize,
        pad_flags: &[PadFlags],
    ) -> PipelineResult<EntityId> {
        if pad_count != pad_flags.len() {
            return Err(PipelineError::invalid(format!(
                "'{}' declares {} pads but {} pad flags",
                name,
                pad_count,
                pad_flags.len()
            )));
        }
        if pad_count == 0 || pad_count > PadId::MAX_PADS {
            return Err(PipelineError::invalid(format!(
                "'{}' must have 1 to {} pads, got {}",
                name,
                PadId::MAX_PADS,
                pad_count
            )));
        }
        let entity = BuiltinEntity::build(kind, pad_flags.to_vec(), &self.params)?;
        self.add_entity(name, entity.into())
    }

    /// Insert a ready-made entity. It reports its own pad layout.
    pub fn add_entity(&self, name: &str, entity: AnyEntity) -> PipelineResult<EntityId> {
        let mut state = self.state();
        state.ensure_idle()?;

        if name.is_empty() {
            return Err(PipelineError::invalid("entity name is empty"));
        }
        if state.names.contains_key(name) {
            return Err(PipelineError::invalid(format!(
                "entity '{}' already exists",
                name
            )));
        }
        let pads = entity.pads();
        if pads.is_empty() || pads.len() > PadId::MAX_PADS {
            return Err(PipelineError::invalid(format!(
                "'{}' must have 1 to {} pads, got {}",
                name,
                PadId::MAX_PADS,
                pads.len()
            )));
        }
        entity
            .kind()
            .check_pads(pads)
            .map_err(PipelineError::InvalidArgument)?;

        let id = EntityId(state.entities.len() as u32);
        let kind = entity.kind();
        let slot = Arc::new(EntitySlot::new(id, name.to_string(), entity));
        state.entities.push(Some(slot));
        state.names.insert(name.to_string(), id);
        state.generation += 1;

        tracing::info!("Created {} entity '{}' as {:?}", kind, name, id);
        Ok(id)
    }

    pub fn create_link(
        &self,
        source: PadId,
        sink: PadId,
        flags: LinkFlags,
    ) -> PipelineResult<LinkId> {
        let mut state = self.state();
        state.ensure_idle()?;

        if !state.pad_flags(source)?.is_source() {
            return Err(PipelineError::invalid(format!("{:?} is not a source pad", source)));
        }
        if !state.pad_flags(sink)?.is_sink() {
            return Err(PipelineError::invalid(format!("{:?} is not a sink pad", sink)));
        }
        if source.entity() == sink.entity() {
            return Err(PipelineError::invalid("cannot link an entity to itself"));
        }
        if state
            .links
            .iter()
            .flatten()
            .any(|l| l.source == source && l.sink == sink)
        {
            return Err(PipelineError::invalid(format!(
                "{:?} -> {:?} already linked",
                source, sink
            )));
        }
        if state.would_create_cycle(source.entity(), sink.entity()) {
            return Err(PipelineError::invalid(
                "adding this link would create a cycle",
            ));
        }
        if flags.enabled {
            if let Some(existing) = state.enabled_into(sink, None) {
                return Err(PipelineError::invalid(format!(
                    "{:?} already fed by enabled {:?}",
                    sink, existing
                )));
            }
        }

        let id = LinkId(state.links.len() as u32);
        state.links.push(Some(Link {
            id,
            source,
            sink,
            flags,
        }));
        state.generation += 1;

        tracing::info!("Created link {:?}: {:?} -> {:?}", id, source, sink);
        Ok(id)
    }

    /// Enable or disable a mutable link.
    pub fn setup_link(&self, id: LinkId, enabled: bool) -> PipelineResult<()> {
        let mut state = self.state();
        state.ensure_idle()?;

        let link = *state.link(id)?;
        if link.flags.enabled == enabled {
            return Ok(());
        }
        if link.flags.immutable {
            return Err(PipelineError::invalid(format!("{:?} is immutable", id)));
        }
        if enabled {
            if let Some(existing) = state.enabled_into(link.sink, Some(id)) {
                return Err(PipelineError::invalid(format!(
                    "{:?} already fed by enabled {:?}",
                    link.sink, existing
                )));
            }
        }

        if let Some(Some(link)) = state.links.get_mut(id.index()) {
            link.flags.enabled = enabled;
        }
        state.generation += 1;
        tracing::debug!("Link {:?} {}", id, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Remove an entity and every link touching it. Unknown ids are ignored.
    pub fn destroy_entity(&self, id: EntityId) -> PipelineResult<()> {
        let mut state = self.state();
        let Ok(slot) = state.slot(id).cloned() else {
            return Ok(());
        };
        if slot.is_streaming() {
            return Err(PipelineError::AlreadyStreaming(slot.name.clone()));
        }
        state.ensure_idle()?;

        for entry in state.links.iter_mut() {
            if entry.is_some_and(|l| l.touches(id)) {
                *entry = None;
            }
        }
        state.names.remove(&slot.name);
        state.entities[id.index()] = None;
        state.generation += 1;
        drop(state);

        slot.destroy();
        tracing::info!("Destroyed entity '{}'", slot.name);
        Ok(())
    }

    // ── Queries ──

    pub fn entity_id(&self, name: &str) -> Option<EntityId> {
        self.state().names.get(name).copied()
    }

    pub fn slot(&self, id: EntityId) -> PipelineResult<Arc<EntitySlot>> {
        self.state().slot(id).cloned()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.state()
            .entities
            .iter()
            .flatten()
            .map(|s| s.id)
            .collect()
    }

    pub fn link(&self, id: LinkId) -> PipelineResult<Link> {
        self.state().link(id).copied()
    }

    pub fn links(&self) -> Vec<Link> {
        self.state().links.iter().flatten().copied().collect()
    }

    /// Find the link between two pads.
    pub fn find_link(&self, source: PadId, sink: PadId) -> Option<LinkId> {
        self.state()
            .links
            .iter()
            .flatten()
            .find(|l| l.source == source && l.sink == sink)
            .map(|l| l.id)
    }

    pub fn entity_state(&self, id: EntityId) -> PipelineResult<StreamState> {
        Ok(self.slot(id)?.state())
    }

    pub fn entity_stats(&self, id: EntityId) -> PipelineResult<EntityStats> {
        Ok(self.slot(id)?.stats())
    }

    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Pipeline of `endpoint` as it would be started now.
    pub fn plan(&self, endpoint: EntityId) -> PipelineResult<StreamPlan> {
        let state = self.state();
        state.slot(endpoint)?;
        Ok(state.compile(endpoint))
    }

    // ── Formats ──

    pub fn format(&self, pad: PadId) -> PipelineResult<MbusFormat> {
        self.slot(pad.entity())?.entity().format(pad.pad_index())
    }

    pub fn try_format(&self, pad: PadId, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        self.slot(pad.entity())?
            .entity()
            .try_format(pad.pad_index(), proposed)
    }

    /// Negotiate and apply a pad format. Refused while the entity streams.
    ///
    /// The graph lock is held throughout so no stream can start between the
    /// check and the update.
    pub fn set_format(&self, pad: PadId, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        let state = self.state();
        let slot = state.slot(pad.entity())?;
        if slot.is_streaming() {
            return Err(PipelineError::AlreadyStreaming(slot.name.clone()));
        }
        let mut entity = slot.entity();
        entity.set_format(pad.pad_index(), proposed)
    }

    /// Negotiate and apply the pixel format of a video endpoint. Refused
    /// while the endpoint streams, under the same lock as [`Self::set_format`].
    pub fn set_pix_format(
        &self,
        endpoint: EntityId,
        proposed: &PixFormat,
    ) -> PipelineResult<PixFormat> {
        let state = self.state();
        let slot = state.slot(endpoint)?;
        if slot.is_streaming() {
            return Err(PipelineError::AlreadyStreaming(slot.name.clone()));
        }
        let mut entity = slot.entity();
        let video = entity.endpoint_mut().ok_or_else(|| {
            PipelineError::invalid(format!("'{}' is not a video endpoint", slot.name))
        })?;
        Ok(video.set_pix_format(proposed))
    }

    pub fn validate_link(&self, id: LinkId) -> PipelineResult<()> {
        let state = self.state();
        let link = *state.link(id)?;
        state.validate(&link)
    }

    /// Copy every source pad format of the endpoint's pipeline onto the sink
    /// pad it feeds, external sources first, then producers before consumers.
    pub fn sync_formats(&self, endpoint: EntityId) -> PipelineResult<()> {
        let (plan, links) = {
            let state = self.state();
            state.slot(endpoint)?;
            let plan = state.compile(endpoint);
            let links: Vec<Link> = plan
                .links
                .iter()
                .filter_map(|id| state.link(*id).ok().copied())
                .collect();
            (plan, links)
        };

        // Links entering from outside the plan (external sources) go first
        let outside = links.iter().filter(|l| !plan.contains(l.source.entity()));
        let inside = plan
            .stop_order()
            .flat_map(|entity| links.iter().filter(move |l| l.source.entity() == entity));
        for link in outside.chain(inside) {
            let format = self.format(link.source)?;
            let accepted = self.set_format(link.sink, &format)?;
            tracing::debug!(
                "Synced {:?}: {}x{} -> {}x{}",
                link.id,
                format.width,
                format.height,
                accepted.width,
                accepted.height
            );
        }
        Ok(())
    }

    // ── Streaming ──

    pub fn is_streaming(&self, endpoint: EntityId) -> bool {
        self.state().active_plans.contains_key(&endpoint)
    }

    /// Validate and start the pipeline feeding `endpoint`.
    pub fn start_stream(&self, endpoint: EntityId) -> PipelineResult<()> {
        let mut state = self.state();
        let name = state.slot(endpoint)?.name.clone();
        if state.active_plans.contains_key(&endpoint) {
            return Err(PipelineError::AlreadyStreaming(name));
        }

        let plan = state.compile(endpoint);
        let mut routes = Vec::with_capacity(plan.links.len());
        for link_id in &plan.links {
            let link = *state.link(*link_id)?;
            state.validate(&link)?;
            routes.push(RouteSpec {
                link: link.id,
                source: link.source,
                sink: link.sink,
                slot: state.slot(link.sink.entity())?.clone(),
            });
        }

        let fed: HashSet<EntityId> = routes.iter().map(|r| r.sink.entity()).collect();
        write(&self.router).activate(routes);

        let mut started: Vec<Arc<EntitySlot>> = Vec::with_capacity(plan.entities.len());
        for id in plan.start_order() {
            let slot = state.slot(id)?.clone();
            if let Err(e) = slot.start(&self.router, !fed.contains(&id)) {
                tracing::warn!("Starting '{}' failed, rolling back: {}", name, e);
                for slot in started.iter().rev() {
                    slot.stop();
                }
                write(&self.router).deactivate(&plan.links);
                return Err(e);
            }
            started.push(slot);
        }

        tracing::info!(
            "Streaming '{}': {} entities, {} links",
            name,
            plan.stats.plan_entities,
            plan.stats.plan_links
        );
        state.active_plans.insert(endpoint, plan);
        Ok(())
    }

    /// Stop the pipeline feeding `endpoint`. Does nothing if it is not
    /// streaming.
    pub fn stop_stream(&self, endpoint: EntityId) {
        let mut state = self.state();
        let Some(plan) = state.active_plans.remove(&endpoint) else {
            tracing::debug!("{:?} is not streaming", endpoint);
            return;
        };

        for id in plan.stop_order() {
            if let Ok(slot) = state.slot(id) {
                slot.stop();
            }
        }
        write(&self.router).deactivate(&plan.links);

        if let Ok(slot) = state.slot(endpoint) {
            let flushed = slot
                .entity()
                .endpoint()
                .map(|e| e.queue().flush(BufferState::Error))
                .unwrap_or(0);
            tracing::info!(
                "Stopped '{}', {} queued buffers returned",
                slot.name,
                flushed
            );
        }
    }

    /// Stop every active pipeline.
    pub fn stop_all(&self) {
        let endpoints: Vec<EntityId> = self.state().active_plans.keys().copied().collect();
        for endpoint in endpoints {
            self.stop_stream(endpoint);
        }
    }

    /// Deliver `frame` to a streaming entity as if it had been generated
    /// there.
    pub fn inject_frame(&self, id: EntityId, frame: &[u8]) -> PipelineResult<()> {
        let slot = self.slot(id)?;
        if slot.state() != StreamState::Streaming {
            return Err(PipelineError::NotStreaming(slot.name.clone()));
        }
        let router = read(&self.router);
        slot.process_frame(None, frame, &router);
        Ok(())
    }

    /// Produce one frame now on a manually paced producer.
    pub fn trigger(&self, id: EntityId) -> PipelineResult<()> {
        let slot = self.slot(id)?;
        if slot.state() != StreamState::Streaming {
            return Err(PipelineError::NotStreaming(slot.name.clone()));
        }
        let entity = slot.entity();
        entity.trigger()
    }

    /// Trigger every producer of the active pipeline of `endpoint`.
    /// Producers are the plan entities without sink pads, plus the endpoint
    /// itself when nothing feeds it.
    pub fn trigger_stream(&self, endpoint: EntityId) -> PipelineResult<()> {
        let producers: Vec<Arc<EntitySlot>> = {
            let state = self.state();
            let name = state.slot(endpoint)?.name.clone();
            let plan = state
                .active_plans
                .get(&endpoint)
                .ok_or(PipelineError::NotStreaming(name))?;
            let endpoint_fed = plan
                .links
                .iter()
                .filter_map(|id| state.link(*id).ok())
                .any(|link| link.sink.entity() == endpoint);
            plan.stop_order()
                .filter_map(|id| state.slot(id).ok().cloned())
                .filter(|slot| {
                    slot.pads().iter().all(|p| p.flags.is_source())
                        || (slot.id == endpoint && !endpoint_fed)
                })
                .collect()
        };
        for slot in producers {
            slot.entity().trigger()?;
        }
        Ok(())
    }

    // ── Snapshot ──

    pub fn snapshot(&self) -> TopologySnapshot {
        let state = self.state();
        let router = read(&self.router);

        let entities = state
            .entities
            .iter()
            .flatten()
            .map(|slot| {
                let entity = slot.entity();
                EntitySnapshot {
                    id: slot.id.0,
                    name: slot.name.clone(),
                    kind: slot.kind,
                    state: slot.state(),
                    pads: slot
                        .pads()
                        .iter()
                        .map(|pad| PadSnapshot {
                            index: pad.index(),
                            flags: pad.flags,
                            format: entity.format(pad.index()).ok(),
                        })
                        .collect(),
                    stats: slot.stats(),
                }
            })
            .collect();

        let pad_name = |pad: PadId| {
            let entity = state
                .slot(pad.entity())
                .map(|s| s.name.clone())
                .unwrap_or_else(|_| pad.entity().to_string());
            format!("{}:{}", entity, pad.pad_index())
        };

        let links = state
            .links
            .iter()
            .flatten()
            .map(|link| LinkSnapshot {
                id: link.id.0,
                source: pad_name(link.source),
                sink: pad_name(link.sink),
                enabled: link.flags.enabled,
                immutable: link.flags.immutable,
                active: router.is_active(link.id),
            })
            .collect();

        TopologySnapshot { entities, links }
    }
}

impl Drop for MediaGraph {
    fn drop(&mut self) {
        self.stop_all();
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        for slot in state.entities.iter().flatten() {
            slot.destroy();
        }
    }
}
