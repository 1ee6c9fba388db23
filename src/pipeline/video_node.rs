//! Client handle on a capture or output endpoint.
//!
//! Mirrors the operations a video device node offers: format enumeration and
//! negotiation, buffer allocation, queue and dequeue, stream on and off.

use crate::pipeline::buffer::{BufferQueue, QueueBuffer, QueueStats};
use crate::pipeline::entity::VideoEndpoint;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::PixFormat;
use crate::pipeline::graph::MediaGraph;
use crate::pipeline::id::EntityId;
use crate::pipeline::pixfmt::{self, FourCc};
use std::sync::Arc;
use std::time::Duration;

/// Stepwise frame size range of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSizeRange {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

pub struct VideoNode {
    graph: Arc<MediaGraph>,
    entity: EntityId,
    name: String,
    queue: Arc<BufferQueue>,
}

impl VideoNode {
    /// Open the endpoint `entity` of `graph`.
    pub fn open(graph: Arc<MediaGraph>, entity: EntityId) -> PipelineResult<Self> {
        let slot = graph.slot(entity)?;
        let queue = slot
            .entity()
            .endpoint()
            .map(|e| e.queue().clone())
            .ok_or_else(|| {
                PipelineError::invalid(format!("'{}' is not a video endpoint", slot.name))
            })?;
        Ok(Self {
            graph,
            entity,
            name: slot.name.clone(),
            queue,
        })
    }

    pub fn open_by_name(graph: Arc<MediaGraph>, name: &str) -> PipelineResult<Self> {
        let entity = graph
            .entity_id(name)
            .ok_or_else(|| PipelineError::invalid(format!("no entity named '{}'", name)))?;
        Self::open(graph, entity)
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn with_endpoint<R>(&self, f: impl FnOnce(&dyn VideoEndpoint) -> R) -> PipelineResult<R> {
        let slot = self.graph.slot(self.entity)?;
        let entity = slot.entity();
        let endpoint = entity
            .endpoint()
            .ok_or_else(|| PipelineError::invalid(format!("'{}' is not a video endpoint", self.name)))?;
        Ok(f(endpoint))
    }

    /// Pixel format at `index` of the format table.
    pub fn enum_format(&self, index: usize) -> Option<FourCc> {
        pixfmt::by_index(index).map(|p| p.fourcc)
    }

    pub fn format(&self) -> PipelineResult<PixFormat> {
        self.with_endpoint(|e| e.pix_format())
    }

    pub fn try_format(&self, proposed: &PixFormat) -> PipelineResult<PixFormat> {
        self.with_endpoint(|e| e.try_pix_format(proposed))
    }

    /// Refused with `AlreadyStreaming` while the endpoint streams.
    pub fn set_format(&self, proposed: &PixFormat) -> PipelineResult<PixFormat> {
        self.graph.set_pix_format(self.entity, proposed)
    }

    /// Size range for `fourcc`, `None` if the format is not supported.
    pub fn enum_frame_sizes(&self, fourcc: FourCc) -> PipelineResult<Option<FrameSizeRange>> {
        if pixfmt::by_fourcc(fourcc).is_none() {
            return Ok(None);
        }
        let limits = self.with_endpoint(|e| e.limits())?;
        Ok(Some(FrameSizeRange {
            min_width: limits.min_width,
            max_width: limits.max_width,
            step_width: 2,
            min_height: limits.min_height,
            max_height: limits.max_height,
            step_height: 2,
        }))
    }

    /// Allocate `count` FREE buffers of the negotiated image size.
    pub fn request_buffers(&self, count: usize) -> Vec<QueueBuffer> {
        self.queue.allocate(count)
    }

    pub fn queue(&self, buffer: QueueBuffer) -> PipelineResult<()> {
        self.queue.submit(buffer)
    }

    /// Next completed buffer. `Ok(None)` when `timeout` elapses first.
    pub fn dequeue(&self, timeout: Duration) -> PipelineResult<Option<QueueBuffer>> {
        if let Some(buffer) = self.queue.try_dequeue() {
            return Ok(Some(buffer));
        }
        if !self.queue.is_streaming() && self.queue.queued_len() == 0 {
            return Err(PipelineError::NotStreaming(self.name.clone()));
        }
        Ok(self.queue.dequeue(timeout))
    }

    pub fn stream_on(&self) -> PipelineResult<()> {
        self.graph.start_stream(self.entity)
    }

    pub fn stream_off(&self) {
        self.graph.stop_stream(self.entity)
    }

    pub fn is_streaming(&self) -> bool {
        self.graph.is_streaming(self.entity)
    }

    /// Produce one frame now when the pipeline is manually paced.
    pub fn trigger(&self) -> PipelineResult<()> {
        self.graph.trigger_stream(self.entity)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::entity_kind::EntityKind;
    use crate::pipeline::pad::PadFlags;

    fn capture_node() -> VideoNode {
        let graph = Arc::new(MediaGraph::default());
        let capture = graph
            .create_entity(EntityKind::Capture, "cap", 1, &[PadFlags::sink()])
            .unwrap();
        VideoNode::open(graph, capture).unwrap()
    }

    #[test]
    fn test_open_requires_endpoint() {
        let graph = Arc::new(MediaGraph::default());
        graph
            .create_entity(EntityKind::Sensor, "sensor", 1, &[PadFlags::source()])
            .unwrap();
        assert!(VideoNode::open_by_name(graph.clone(), "sensor").is_err());
        assert!(VideoNode::open_by_name(graph, "missing").is_err());
    }

    #[test]
    fn test_format_enumeration() {
        let node = capture_node();
        assert_eq!(node.enum_format(1), Some(FourCc::RGB24));
        assert_eq!(node.enum_format(pixfmt::PIXEL_MAP.len()), None);

        let sizes = node.enum_frame_sizes(FourCc::RGB24).unwrap().unwrap();
        assert_eq!(sizes.step_width, 2);
        assert_eq!(sizes.max_width, 4096);
        assert!(node.enum_frame_sizes(FourCc::new(b"NV12")).unwrap().is_none());
    }

    #[test]
    fn test_set_format_resizes_buffers() {
        let node = capture_node();
        let fmt = node
            .set_format(&PixFormat::new(64, 48, FourCc::RGB24))
            .unwrap();
        assert_eq!(fmt.size_image, 64 * 48 * 3);
        let buffers = node.request_buffers(2);
        assert!(buffers.iter().all(|b| b.data.len() == 64 * 48 * 3));
    }

    #[test]
    fn test_dequeue_without_stream_fails() {
        let node = capture_node();
        assert!(matches!(
            node.dequeue(Duration::from_millis(1)),
            Err(PipelineError::NotStreaming(_))
        ));
    }
}
