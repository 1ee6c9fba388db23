//! Output endpoint: feeds client buffers into the graph.
//!
//! A consumer task pops one queued buffer per tick and propagates its payload
//! from the endpoint's external source pad, then hands the buffer back DONE.

use crate::pipeline::buffer::{BufferQueue, BufferState};
use crate::pipeline::entities::{
    check_layout, default_pix_format, mbus_to_pix, negotiate_pix, pix_to_mbus, EntityParams,
};
use crate::pipeline::entity::{pad_flags, EntityOps, FrameContext, StartContext, VideoEndpoint};
use crate::pipeline::entity_kind::EntityKind;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::{FrameLimits, MbusFormat, PixFormat};
use crate::pipeline::id::PadId;
use crate::pipeline::pad::PadFlags;
use crate::pipeline::sync::read;
use crate::pipeline::worker::{TaskHandle, TickMode};
use std::sync::Arc;
use std::time::Instant;

pub struct OutputEntity {
    pads: Vec<PadFlags>,
    pix: PixFormat,
    limits: FrameLimits,
    queue: Arc<BufferQueue>,
    mode: TickMode,
    consumer: Option<TaskHandle<()>>,
}

impl OutputEntity {
    pub fn new(pads: Vec<PadFlags>, params: &EntityParams) -> PipelineResult<Self> {
        check_layout(EntityKind::Output, &pads)?;
        let pix = default_pix_format(&params.limits);
        Ok(Self {
            pads,
            pix,
            limits: params.limits,
            queue: Arc::new(BufferQueue::new(pix.size_image as usize)),
            mode: TickMode::from_rate(params.frame_rate_hz),
            consumer: None,
        })
    }
}

impl VideoEndpoint for OutputEntity {
    fn pix_format(&self) -> PixFormat {
        self.pix
    }

    fn try_pix_format(&self, proposed: &PixFormat) -> PixFormat {
        negotiate_pix(proposed, &self.limits)
    }

    fn set_pix_format(&mut self, proposed: &PixFormat) -> PixFormat {
        self.pix = negotiate_pix(proposed, &self.limits);
        self.queue.set_min_size(self.pix.size_image as usize);
        self.pix
    }

    fn limits(&self) -> FrameLimits {
        self.limits
    }

    fn queue(&self) -> &Arc<BufferQueue> {
        &self.queue
    }
}

impl EntityOps for OutputEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Output
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
        let pad = *ctx
            .source_pads
            .first()
            .ok_or_else(|| PipelineError::invalid("output endpoint has no source pad"))?;
        let size = self.pix.size_image as usize;
        self.queue.set_min_size(size);
        self.queue.set_streaming(true);

        let queue = self.queue.clone();
        let router = ctx.router.clone();
        let consumer = TaskHandle::spawn(
            &format!("{}-consumer", ctx.name),
            self.mode,
            move |mut ticker| {
                let started = Instant::now();
                let mut sequence = 0u32;
                while ticker.wait() {
                    let Some(mut buffer) = queue.pop_active() else {
                        continue;
                    };
                    let len = size.min(buffer.data.len());
                    read(&router).propagate(pad, &buffer.data[..len]);

                    buffer.bytes_used = len;
                    buffer.sequence = sequence;
                    buffer.timestamp = started.elapsed();
                    sequence = sequence.wrapping_add(1);
                    queue.complete(buffer, BufferState::Done);
                }
            },
        );

        match consumer {
            Ok(consumer) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            Err(e) => {
                self.queue.set_streaming(false);
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        self.queue.set_streaming(false);
        if let Some(consumer) = self.consumer.take() {
            consumer.stop();
        }
    }

    /// Frames enter through client buffers only.
    fn process_frame(&mut self, _origin: Option<PadId>, _frame: &[u8], _ctx: &FrameContext<'_>) {}

    fn trigger(&self) -> PipelineResult<()> {
        match &self.consumer {
            Some(consumer) if consumer.trigger() => Ok(()),
            _ => Err(PipelineError::NotStreaming(EntityKind::Output.to_string())),
        }
    }
}
