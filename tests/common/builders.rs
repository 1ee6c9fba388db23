//! Test graph builders

use std::sync::Arc;
use vimc_rs::pipeline::{
    pixfmt::code, EntityId, EntityKind, EntityParams, LinkFlags, MbusFormat, PadId,
};
use vimc_rs::{MediaGraph, VideoNode};

/// A linear sensor → [debayer] → [scaler] → capture pipeline
pub struct Chain {
    pub graph: Arc<MediaGraph>,
    pub sensor: EntityId,
    pub debayer: Option<EntityId>,
    pub scaler: Option<EntityId>,
    pub capture: EntityId,
    pub node: VideoNode,
    /// Sensor output format after negotiation
    pub sensor_format: MbusFormat,
}

impl Chain {
    /// Size of one raw sensor frame
    pub fn raw_frame_len(&self) -> usize {
        self.sensor_format.frame_size().unwrap_or(0)
    }

    /// Push one raw frame through the pipeline synchronously
    pub fn inject(&self, frame: &[u8]) {
        self.graph
            .inject_frame(self.sensor, frame)
            .expect("sensor should be streaming");
    }
}

/// Builder for creating test pipelines
pub struct ChainBuilder {
    params: EntityParams,
    width: u32,
    height: u32,
    code: u32,
    debayer: bool,
    scaler: bool,
    sync: bool,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self {
            params: super::manual_params(),
            width: 8,
            height: 6,
            code: code::SRGGB8_1X8,
            debayer: false,
            scaler: false,
            sync: true,
        }
    }

    pub fn params(mut self, params: EntityParams) -> Self {
        self.params = params;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn code(mut self, code: u32) -> Self {
        self.code = code;
        self
    }

    pub fn with_debayer(mut self) -> Self {
        self.debayer = true;
        self
    }

    pub fn with_scaler(mut self) -> Self {
        self.scaler = true;
        self
    }

    /// Leave pad formats at their defaults instead of propagating them
    pub fn unsynced(mut self) -> Self {
        self.sync = false;
        self
    }

    pub fn build(self) -> Chain {
        let graph = Arc::new(MediaGraph::new(self.params));
        let create = |kind: EntityKind, name: &str| {
            graph
                .create_entity(kind, name, kind.default_pads().len(), kind.default_pads())
                .expect("entity should be created")
        };
        let link = |source: EntityId, source_pad: u16, sink: EntityId| {
            graph
                .create_link(
                    PadId::new(source, source_pad),
                    PadId::new(sink, 0),
                    LinkFlags::ENABLED,
                )
                .expect("link should be created")
        };

        let sensor = create(EntityKind::Sensor, "Sensor");
        let mut tail = (sensor, 0);
        let debayer = self.debayer.then(|| {
            let id = create(EntityKind::Debayer, "Debayer");
            link(tail.0, tail.1, id);
            tail = (id, 1);
            id
        });
        let scaler = self.scaler.then(|| {
            let id = create(EntityKind::Scaler, "Scaler");
            link(tail.0, tail.1, id);
            tail = (id, 1);
            id
        });
        let capture = create(EntityKind::Capture, "Capture");
        link(tail.0, tail.1, capture);

        let sensor_format = graph
            .set_format(
                PadId::new(sensor, 0),
                &MbusFormat::new(self.width, self.height, self.code),
            )
            .expect("sensor format");
        if self.sync {
            graph.sync_formats(capture).expect("formats should propagate");
        }

        let node = VideoNode::open(graph.clone(), capture).expect("capture node");
        Chain {
            graph,
            sensor,
            debayer,
            scaler,
            capture,
            node,
            sensor_format,
        }
    }
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}
