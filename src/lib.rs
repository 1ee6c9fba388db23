//! # vimc-rs: Virtual Media Controller Simulator
//!
//! A software model of a camera capture pipeline built as a media-controller
//! graph. Entities (sensors, debayers, scalers, capture and output endpoints)
//! expose pads; links connect a source pad to a sink pad. Starting a stream
//! on an endpoint validates every link feeding it, starts the entities from
//! the producers down and propagates generated frames synchronously into the
//! endpoint's client buffers.
//!
//! ## Architecture
//!
//! - **Pipeline**: graph, format negotiation, stream state machine and the
//!   builtin entities
//! - **Topology**: textual descriptions and the driver registry that turns
//!   them into graph entities
//! - **Config**: TOML configuration for entity parameters, topology and
//!   logging
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vimc_rs::{EntityRegistry, MediaGraph, SimConfig, TopologyBuilder, VideoNode};
//!
//! let config = SimConfig::default();
//! let graph = Arc::new(MediaGraph::new(config.pipeline.entity_params()));
//! let registry = EntityRegistry::with_builtins();
//! TopologyBuilder::new(&registry).build(&graph, &config.topology)?;
//!
//! let node = VideoNode::open_by_name(graph.clone(), "RGB/YUV Capture")?;
//! graph.sync_formats(node.entity())?;
//! for buffer in node.request_buffers(4) {
//!     node.queue(buffer)?;
//! }
//! node.stream_on()?;
//! let frame = node.dequeue(Duration::from_secs(1))?;
//! node.stream_off();
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod topology;

// Re-export commonly used types
pub use config::{SimConfig, TopologyConfig};
pub use error::{Result, ResultExt, SimError};
pub use pipeline::{MediaGraph, PipelineError, VideoNode};
pub use topology::{EntityRegistry, Topology, TopologyBuilder};
