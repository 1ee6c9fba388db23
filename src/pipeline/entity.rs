//! Entity abstraction for the media graph.
//!
//! Two-layer design:
//! - **`EntityOps` trait**: the common interface (configure, start, stop,
//!   process frame, destroy). Builtin entities implement it and so can
//!   externally supplied plugins.
//! - **`BuiltinEntity` enum**: closed set of builtin entities dispatched by
//!   `match`, so the frame path never goes through a vtable for them.
//!
//! `AnyEntity` wraps either variant so the graph can handle both uniformly.

use crate::pipeline::buffer::BufferQueue;
use crate::pipeline::entities::{
    CaptureEntity, DebayerEntity, OutputEntity, ScalerEntity, SensorEntity,
};
use crate::pipeline::entity_kind::EntityKind;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::{FrameLimits, MbusFormat, PixFormat};
use crate::pipeline::id::PadId;
use crate::pipeline::pad::PadFlags;
use crate::pipeline::router::{Router, SharedRouter};
use std::sync::Arc;

/// Per-entity streaming state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    #[default]
    Stopped,
    Starting,
    Streaming,
    Stopping,
}

/// Context passed to an entity's start operation.
pub struct StartContext<'a> {
    /// Entity name, for thread names and logs.
    pub name: &'a str,
    /// Source pads the entity emits frames on.
    pub source_pads: &'a [PadId],
    /// Router used by entities that propagate from their own task.
    pub router: &'a SharedRouter,
    /// No enabled link leads into the entity. A capture endpoint in this
    /// position renders its own test pattern.
    pub unfed: bool,
}

/// Context passed to process_frame.
pub struct FrameContext<'a> {
    pub router: &'a Router,
    pub source_pads: &'a [PadId],
}

impl FrameContext<'_> {
    /// Propagate `frame` on every source pad of the current entity.
    pub fn emit(&self, frame: &[u8]) {
        for &pad in self.source_pads {
            self.router.propagate(pad, frame);
        }
    }
}

/// Common interface of every entity.
pub trait EntityOps: Send {
    fn kind(&self) -> EntityKind {
        EntityKind::Custom
    }

    /// Pad layout, fixed at creation.
    fn pads(&self) -> &[PadFlags];

    /// Active format of `pad`.
    fn format(&self, pad: u16) -> PipelineResult<MbusFormat>;

    /// Negotiate `proposed` on `pad` without applying it.
    fn try_format(&self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat>;

    /// Negotiate and apply. The graph only calls this while the entity is
    /// stopped.
    fn set_format(&mut self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat>;

    /// Allocate working state and start any background task.
    fn start(&mut self, ctx: &StartContext<'_>) -> PipelineResult<()>;

    /// Release working state. Background tasks are joined before returning.
    fn stop(&mut self);

    /// Handle one frame arriving on `origin` (`None` for injected frames).
    fn process_frame(&mut self, origin: Option<PadId>, frame: &[u8], ctx: &FrameContext<'_>);

    /// Produce one frame now. Only manually paced producers support this.
    fn trigger(&self) -> PipelineResult<()> {
        Err(PipelineError::invalid(format!(
            "{} entities do not accept triggers",
            self.kind()
        )))
    }

    /// Release everything before the entity is dropped.
    fn destroy(&mut self) {
        self.stop();
    }
}

/// Client-facing side of capture and output endpoints.
pub trait VideoEndpoint {
    fn pix_format(&self) -> PixFormat;

    fn try_pix_format(&self, proposed: &PixFormat) -> PixFormat;

    fn set_pix_format(&mut self, proposed: &PixFormat) -> PixFormat;

    /// Frame size range accepted by the endpoint.
    fn limits(&self) -> FrameLimits;

    fn queue(&self) -> &Arc<BufferQueue>;
}

/// Check that `pad` exists in `pads` and return its flags.
pub fn pad_flags(pads: &[PadFlags], pad: u16) -> PipelineResult<PadFlags> {
    pads.get(pad as usize)
        .copied()
        .ok_or_else(|| PipelineError::invalid(format!("no pad {}", pad)))
}

/// Enum dispatch for builtin entities.
pub enum BuiltinEntity {
    Sensor(SensorEntity),
    Debayer(DebayerEntity),
    Scaler(ScalerEntity),
    Capture(CaptureEntity),
    Output(OutputEntity),
}

macro_rules! dispatch {
    ($self:expr, $e:ident => $body:expr) => {
        match $self {
            BuiltinEntity::Sensor($e) => $body,
            BuiltinEntity::Debayer($e) => $body,
            BuiltinEntity::Scaler($e) => $body,
            BuiltinEntity::Capture($e) => $body,
            BuiltinEntity::Output($e) => $body,
        }
    };
}

impl BuiltinEntity {
    pub fn kind(&self) -> EntityKind {
        dispatch!(self, e => e.kind())
    }

    pub fn pads(&self) -> &[PadFlags] {
        dispatch!(self, e => e.pads())
    }

    pub fn format(&self, pad: u16) -> PipelineResult<MbusFormat> {
        dispatch!(self, e => e.format(pad))
    }

    pub fn try_format(&self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        dispatch!(self, e => e.try_format(pad, proposed))
    }

    pub fn set_format(&mut self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        dispatch!(self, e => e.set_format(pad, proposed))
    }

    pub fn start(&mut self, ctx: &StartContext<'_>) -> PipelineResult<()> {
        dispatch!(self, e => e.start(ctx))
    }

    pub fn stop(&mut self) {
        dispatch!(self, e => e.stop())
    }

    pub fn process_frame(&mut self, origin: Option<PadId>, frame: &[u8], ctx: &FrameContext<'_>) {
        dispatch!(self, e => e.process_frame(origin, frame, ctx))
    }

    pub fn trigger(&self) -> PipelineResult<()> {
        dispatch!(self, e => e.trigger())
    }

    pub fn destroy(&mut self) {
        dispatch!(self, e => e.destroy())
    }

    pub fn endpoint(&self) -> Option<&dyn VideoEndpoint> {
        match self {
            BuiltinEntity::Capture(e) => Some(e),
            BuiltinEntity::Output(e) => Some(e),
            _ => None,
        }
    }

    pub fn endpoint_mut(&mut self) -> Option<&mut dyn VideoEndpoint> {
        match self {
            BuiltinEntity::Capture(e) => Some(e),
            BuiltinEntity::Output(e) => Some(e),
            _ => None,
        }
    }
}

/// Wrapper that holds either a builtin entity (enum dispatch) or a plugin
/// (trait object).
pub enum AnyEntity {
    Builtin(BuiltinEntity),
    Plugin(Box<dyn EntityOps>),
}

impl AnyEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            AnyEntity::Builtin(e) => e.kind(),
            AnyEntity::Plugin(e) => e.kind(),
        }
    }

    pub fn pads(&self) -> &[PadFlags] {
        match self {
            AnyEntity::Builtin(e) => e.pads(),
            AnyEntity::Plugin(e) => e.pads(),
        }
    }

    pub fn format(&self, pad: u16) -> PipelineResult<MbusFormat> {
        match self {
            AnyEntity::Builtin(e) => e.format(pad),
            AnyEntity::Plugin(e) => e.format(pad),
        }
    }

    pub fn try_format(&self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        match self {
            AnyEntity::Builtin(e) => e.try_format(pad, proposed),
            AnyEntity::Plugin(e) => e.try_format(pad, proposed),
        }
    }

    pub fn set_format(&mut self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        match self {
            AnyEntity::Builtin(e) => e.set_format(pad, proposed),
            AnyEntity::Plugin(e) => e.set_format(pad, proposed),
        }
    }

    pub fn start(&mut self, ctx: &StartContext<'_>) -> PipelineResult<()> {
        match self {
            AnyEntity::Builtin(e) => e.start(ctx),
            AnyEntity::Plugin(e) => e.start(ctx),
        }
    }

    pub fn stop(&mut self) {
        match self {
            AnyEntity::Builtin(e) => e.stop(),
            AnyEntity::Plugin(e) => e.stop(),
        }
    }

    pub fn process_frame(&mut self, origin: Option<PadId>, frame: &[u8], ctx: &FrameContext<'_>) {
        match self {
            AnyEntity::Builtin(e) => e.process_frame(origin, frame, ctx),
            AnyEntity::Plugin(e) => e.process_frame(origin, frame, ctx),
        }
    }

    pub fn trigger(&self) -> PipelineResult<()> {
        match self {
            AnyEntity::Builtin(e) => e.trigger(),
            AnyEntity::Plugin(e) => e.trigger(),
        }
    }

    pub fn destroy(&mut self) {
        match self {
            AnyEntity::Builtin(e) => e.destroy(),
            AnyEntity::Plugin(e) => e.destroy(),
        }
    }

    pub fn endpoint(&self) -> Option<&dyn VideoEndpoint> {
        match self {
            AnyEntity::Builtin(e) => e.endpoint(),
            AnyEntity::Plugin(_) => None,
        }
    }

    pub fn endpoint_mut(&mut self) -> Option<&mut dyn VideoEndpoint> {
        match self {
            AnyEntity::Builtin(e) => e.endpoint_mut(),
            AnyEntity::Plugin(_) => None,
        }
    }
}

impl From<BuiltinEntity> for AnyEntity {
    fn from(entity: BuiltinEntity) -> Self {
        AnyEntity::Builtin(entity)
    }
}
