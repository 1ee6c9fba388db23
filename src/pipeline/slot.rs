//! Graph-side holder of an entity.
//!
//! Locking is two-tier. `status` is a short-held lock guarding the stream
//! state and is the only thing the frame path checks before touching the
//! entity. `entity` guards the working state and is held for the duration of
//! one configure, start, stop or process call.

use crate::pipeline::entity::{AnyEntity, FrameContext, StartContext, StreamState};
use crate::pipeline::entity_kind::EntityKind;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::id::{EntityId, PadId};
use crate::pipeline::pad::Pad;
use crate::pipeline::router::{Router, SharedRouter};
use crate::pipeline::sync::lock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Default)]
struct StreamStatus {
    state: StreamState,
    /// Active pipelines using this entity.
    users: u32,
}

/// Frame counters of one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EntityStats {
    pub frames_processed: u64,
    pub frames_dropped: u64,
}

pub struct EntitySlot {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pads: Vec<Pad>,
    source_pads: Vec<PadId>,
    status: Mutex<StreamStatus>,
    entity: Mutex<AnyEntity>,
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
}

impl EntitySlot {
    pub fn new(id: EntityId, name: String, entity: AnyEntity) -> Self {
        let pads: Vec<Pad> = entity
            .pads()
            .iter()
            .enumerate()
            .map(|(index, flags)| Pad::new(id, index as u16, *flags))
            .collect();
        let source_pads = pads
            .iter()
            .filter(|p| p.flags.is_source())
            .map(|p| p.id)
            .collect();

        Self {
            id,
            name,
            kind: entity.kind(),
            pads,
            source_pads,
            status: Mutex::new(StreamStatus::default()),
            entity: Mutex::new(entity),
            frames_processed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn pad(&self, index: u16) -> Option<&Pad> {
        self.pads.get(index as usize)
    }

    pub fn source_pads(&self) -> &[PadId] {
        &self.source_pads
    }

    pub fn state(&self) -> StreamState {
        lock(&self.status).state
    }

    /// Whether any active pipeline holds this entity.
    pub fn is_streaming(&self) -> bool {
        lock(&self.status).users > 0
    }

    /// Lock the entity for a configure or query call.
    pub fn entity(&self) -> MutexGuard<'_, AnyEntity> {
        lock(&self.entity)
    }

    pub fn stats(&self) -> EntityStats {
        EntityStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }

    /// Start the entity for one more pipeline. Only the first user actually
    /// starts it.
    pub fn start(&self, router: &SharedRouter, unfed: bool) -> PipelineResult<()> {
        {
            let mut status = lock(&self.status);
            if status.users > 0 {
                status.users += 1;
                tracing::debug!(
                    "Entity '{}' already streaming, now shared by {} pipelines",
                    self.name,
                    status.users
                );
                return Ok(());
            }
            status.state = StreamState::Starting;
        }

        let result = {
            let ctx = StartContext {
                name: &self.name,
                source_pads: &self.source_pads,
                router,
                unfed,
            };
            lock(&self.entity).start(&ctx)
        };

        let mut status = lock(&self.status);
        match &result {
            Ok(()) => {
                status.state = StreamState::Streaming;
                status.users = 1;
                tracing::debug!("Entity '{}' streaming", self.name);
            }
            Err(e) => {
                status.state = StreamState::Stopped;
                tracing::warn!("Entity '{}' failed to start: {}", self.name, e);
            }
        }
        result
    }

    /// Release one pipeline's hold. The last user stops the entity.
    pub fn stop(&self) {
        {
            let mut status = lock(&self.status);
            match status.users {
                0 => return,
                1 => {
                    status.users = 0;
                    status.state = StreamState::Stopping;
                }
                _ => {
                    status.users -= 1;
                    return;
                }
            }
        }

        lock(&self.entity).stop();
        lock(&self.status).state = StreamState::Stopped;
        tracing::debug!("Entity '{}' stopped", self.name);
    }

    /// Deliver one frame. Entities that are not streaming drop it.
    pub fn process_frame(&self, origin: Option<PadId>, frame: &[u8], router: &Router) {
        if lock(&self.status).state != StreamState::Streaming {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Entity '{}' not streaming, frame dropped", self.name);
            return;
        }

        let ctx = FrameContext {
            router,
            source_pads: &self.source_pads,
        };
        lock(&self.entity).process_frame(origin, frame, &ctx);
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Tear the entity down. The graph has already checked it is stopped.
    pub fn destroy(&self) {
        lock(&self.entity).destroy();
    }
}
