//! Capture endpoint: copies incoming frames into client buffers.
//!
//! A capture with no enabled link into it has nothing to copy. While such a
//! capture streams, a task of its own renders the test pattern straight into
//! the client buffers at the configured frame rate.

use crate::pipeline::buffer::{BufferQueue, BufferState};
use crate::pipeline::entities::{
    check_layout, default_pix_format, mbus_to_pix, negotiate_pix, pix_to_mbus, EntityParams,
    PatternSource, TestPattern,
};
use crate::pipeline::entity::{pad_flags, EntityOps, FrameContext, StartContext, VideoEndpoint};
use crate::pipeline::entity_kind::EntityKind;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::{Field, FrameLimits, MbusFormat, PixFormat};
use crate::pipeline::id::PadId;
use crate::pipeline::pad::PadFlags;
use crate::pipeline::worker::{TaskHandle, TickMode};
use std::sync::Arc;
use std::time::Instant;

/// Fill the head buffer of `queue` and complete it DONE. `fill` writes the
/// payload and returns the bytes used. Returns `false` when nothing was
/// queued.
fn complete_head(
    queue: &BufferQueue,
    sequence: u32,
    started: Instant,
    field: Field,
    fill: impl FnOnce(&mut [u8]) -> usize,
) -> bool {
    let Some(mut buffer) = queue.pop_active() else {
        tracing::trace!("No buffer queued, frame dropped");
        return false;
    };

    buffer.bytes_used = fill(&mut buffer.data);
    buffer.sequence = sequence;
    buffer.timestamp = started.elapsed();
    buffer.field = field;

    tracing::trace!("Buffer {} done, sequence {}", buffer.index(), sequence);
    queue.complete(buffer, BufferState::Done);
    true
}

pub struct CaptureEntity {
    pads: Vec<PadFlags>,
    pix: PixFormat,
    limits: FrameLimits,
    queue: Arc<BufferQueue>,
    sequence: u32,
    started: Option<Instant>,
    mode: TickMode,
    pattern: TestPattern,
    /// Pattern task of an unfed capture.
    generator: Option<TaskHandle<()>>,
}

impl CaptureEntity {
    pub fn new(pads: Vec<PadFlags>, params: &EntityParams) -> PipelineResult<Self> {
        check_layout(EntityKind::Capture, &pads)?;
        let pix = default_pix_format(&params.limits);
        Ok(Self {
            pads,
            pix,
            limits: params.limits,
            queue: Arc::new(BufferQueue::new(pix.size_image as usize)),
            sequence: 0,
            started: None,
            mode: TickMode::from_rate(params.frame_rate_hz),
            pattern: params.pattern,
            generator: None,
        })
    }

    /// Whether the capture renders its own frames.
    pub fn is_generating(&self) -> bool {
        self.generator.is_some()
    }

    fn spawn_generator(&self, name: &str, started: Instant) -> PipelineResult<TaskHandle<()>> {
        let queue = self.queue.clone();
        let mut pattern = self.pattern;
        let format = pix_to_mbus(&self.pix);
        let size = self.pix.size_image as usize;
        let field = self.pix.field;

        TaskHandle::spawn(&format!("{}-pattern", name), self.mode, move |mut ticker| {
            let mut sequence = 0u32;
            while ticker.wait() {
                let filled = complete_head(&queue, sequence, started, field, |data| {
                    let len = size.min(data.len());
                    pattern.fill(&format, u64::from(sequence), &mut data[..len]);
                    len
                });
                if filled {
                    sequence = sequence.wrapping_add(1);
                }
            }
        })
    }
}

impl VideoEndpoint for CaptureEntity {
    fn pix_format(&self) -> PixFormat {
        self.pix
    }

    fn try_pix_format(&self, proposed: &PixFormat) -> PixFormat {
        negotiate_pix(proposed, &self.limits)
    }

    fn set_pix_format(&mut self, proposed: &PixFormat) -> PixFormat {
        self.pix = negotiate_pix(proposed, &self.limits);
        self.queue.set_min_size(self.pix.size_image as usize);
        tracing::debug!(
            "Capture format {}x{} {}, {} bytes",
            self.pix.width,
            self.pix.height,
            self.pix.pixelformat,
            self.pix.size_image
        );
        self.pix
    }

    fn limits(&self) -> FrameLimits {
        self.limits
    }

    fn queue(&self) -> &Arc<BufferQueue> {
        &self.queue
    }
}

impl EntityOps for CaptureEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Capture
    }

    fn pads(&self) -> &[PadFlags] {
        &self.pads
    }

    fn format(&self, pad: u16) -> PipelineResult<MbusFormat> {
        pad_flags(&self.pads, pad)?;
        Ok(pix_to_mbus(&self.pix))
    }

    fn try_format(&self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        pad_flags(&self.pads, pad)?;
        Ok(pix_to_mbus(&self.try_pix_format(&mbus_to_pix(proposed))))
    }

    fn set_format(&mut self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        pad_flags(&self.pads, pad)?;
        let pix = self.set_pix_format(&mbus_to_pix(proposed));
        Ok(pix_to_mbus(&pix))
    }

    fn start(&mut self, ctx: &StartContext<'_>) -> PipelineResult<()> {
        let started = Instant::now();
        self.sequence = 0;
        self.started = Some(started);
        self.queue.set_min_size(self.pix.size_image as usize);
        self.queue.set_streaming(true);

        if ctx.unfed {
            match self.spawn_generator(ctx.name, started) {
                Ok(generator) => {
                    tracing::debug!("Capture '{}' is unfed, rendering a test pattern", ctx.name);
                    self.generator = Some(generator);
                }
                Err(e) => {
                    self.queue.set_streaming(false);
                    self.started = None;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.queue.set_streaming(false);
        if let Some(generator) = self.generator.take() {
            generator.stop();
        }
        self.started = None;
    }

    fn process_frame(&mut self, _origin: Option<PadId>, frame: &[u8], _ctx: &FrameContext<'_>) {
        if !self.queue.is_streaming() {
            return;
        }
        let started = self.started.unwrap_or_else(Instant::now);
        let filled = complete_head(&self.queue, self.sequence, started, self.pix.field, |data| {
            let len = frame.len().min(data.len());
            data[..len].copy_from_slice(&frame[..len]);
            len
        });
        if filled {
            self.sequence = self.sequence.wrapping_add(1);
        }
    }

    fn trigger(&self) -> PipelineResult<()> {
        match &self.generator {
            Some(_) if self.mode != TickMode::Manual => Err(PipelineError::invalid(
                "capture pattern runs at a fixed rate and does not accept triggers",
            )),
            Some(generator) if generator.trigger() => Ok(()),
            Some(_) => Err(PipelineError::NotStreaming(EntityKind::Capture.to_string())),
            None => Err(PipelineError::invalid(
                "capture is fed by its pipeline and does not accept triggers",
            )),
        }
    }
}
