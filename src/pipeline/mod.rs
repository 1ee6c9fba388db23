//! Media-controller style capture pipeline.
//!
//! Frames flow through entities connected pad to pad: Sensor (generator) →
//! Debayer / Scaler (transforms) → Capture (endpoint buffers). An Output
//! endpoint feeds client buffers back into the graph.
//!
//! # Architecture
//!
//! ```text
//! [Sensor A] ──► [Debayer A] ──► [Scaler] ──► [RGB/YUV Capture]
//!     └────────► [Raw Capture 0]     ▲
//!                                    │ (disabled)
//!                      [RGB/YUV Input]
//! ```
//!
//! # Design
//!
//! - **Enum dispatch on hot path**: `BuiltinEntity` enum for all builtin
//!   entities, `EntityOps` trait objects for plugins.
//! - **Synchronous propagation**: a frame reaches every endpoint before its
//!   producer renders the next one. Nothing is queued between entities.
//! - **Two-tier locking**: stream state and working state sit behind separate
//!   locks per entity, so dropping a frame never waits for a busy entity.
//! - **Plans**: the pipeline of an endpoint is compiled at stream start and
//!   discarded at stream stop.

pub mod buffer;
pub mod compiled_plan;
pub mod compiler;
pub mod entities;
pub mod entity;
pub mod entity_kind;
pub mod error;
pub mod format;
pub mod graph;
pub mod id;
pub mod pad;
pub mod pixfmt;
pub mod router;
pub mod slot;
mod sync;
pub mod validate;
pub mod video_node;
pub mod worker;

pub use buffer::{BufferQueue, BufferState, QueueBuffer, QueueStats};
pub use compiled_plan::{PlanStats, StreamPlan};
pub use entities::{
    CaptureEntity, DebayerEntity, EntityParams, OutputEntity, PatternSource, ScalerEntity,
    SensorEntity, TestPattern,
};
pub use entity::{AnyEntity, BuiltinEntity, EntityOps, FrameContext, StartContext, StreamState};
pub use entity_kind::EntityKind;
pub use error::{PipelineError, PipelineResult};
pub use format::{Colorimetry, Field, FrameLimits, MbusFormat, PixFormat};
pub use graph::{MediaGraph, TopologySnapshot};
pub use id::{EntityId, LinkId, PadId};
pub use pad::{Link, LinkFlags, PadFlags};
pub use pixfmt::FourCc;
pub use slot::EntityStats;
pub use video_node::{FrameSizeRange, VideoNode};
pub use worker::TickMode;
