//! Synthetic frame generator.
//!
//! While streaming, a background task renders one frame per tick from the
//! sensor's [`PatternSource`] and propagates it on every source pad.

use crate::pipeline::entities::{alloc_frame, check_layout, negotiate_mbus, EntityParams};
use crate::pipeline::entity::{pad_flags, EntityOps, FrameContext, StartContext};
use crate::pipeline::entity_kind::EntityKind;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::{FrameLimits, MbusFormat, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::pipeline::id::PadId;
use crate::pipeline::pad::PadFlags;
use crate::pipeline::pixfmt::{self, code, BayerOrder};
use crate::pipeline::sync::read;
use crate::pipeline::worker::{TaskHandle, TickMode};
use serde::{Deserialize, Serialize};

/// Renders frame content for a sensor.
#[cfg_attr(test, mockall::automock)]
pub trait PatternSource: Send {
    /// Render frame number `sequence` in `format` into `frame`.
    fn fill(&mut self, format: &MbusFormat, sequence: u64, frame: &mut [u8]);
}

/// Builtin patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestPattern {
    /// Every pixel the same RGB colour.
    Solid([u8; 3]),
    /// Eight vertical bars: white, yellow, cyan, green, magenta, red, blue, black.
    #[default]
    ColorBars,
}

const BARS: [[u8; 3]; 8] = [
    [0xff, 0xff, 0xff],
    [0xff, 0xff, 0x00],
    [0x00, 0xff, 0xff],
    [0x00, 0xff, 0x00],
    [0xff, 0x00, 0xff],
    [0xff, 0x00, 0x00],
    [0x00, 0x00, 0xff],
    [0x00, 0x00, 0x00],
];

impl TestPattern {
    fn color_at(&self, column: usize, width: usize) -> [u8; 3] {
        match self {
            TestPattern::Solid(rgb) => *rgb,
            TestPattern::ColorBars => BARS[column * BARS.len() / width.max(1)],
        }
    }
}

impl PatternSource for TestPattern {
    fn fill(&mut self, format: &MbusFormat, _sequence: u64, frame: &mut [u8]) {
        let Some(bpp) = format.bpp() else {
            frame.fill(0);
            return;
        };
        let bpp = bpp as usize;
        let width = format.width as usize;
        let bayer = pixfmt::bayer_order(format.code);

        for (index, pixel) in frame.chunks_exact_mut(bpp).enumerate() {
            let (line, column) = (index / width.max(1), index % width.max(1));
            let rgb = self.color_at(column, width);
            write_pixel(format.code, bayer, rgb, line, column, pixel);
        }
    }
}

fn write_pixel(
    bus_code: u32,
    bayer: Option<&BayerOrder>,
    rgb: [u8; 3],
    line: usize,
    column: usize,
    out: &mut [u8],
) {
    if let Some(order) = bayer {
        let sample = rgb[order.color_at(line, column).channel()];
        if order.bits == 8 {
            out[0] = sample;
        } else {
            let wide = (sample as u16) << (order.bits - 8);
            out.copy_from_slice(&wide.to_le_bytes());
        }
        return;
    }

    match bus_code {
        code::BGR888_1X24 => out.copy_from_slice(&[rgb[2], rgb[1], rgb[0]]),
        code::ARGB8888_1X32 => out.copy_from_slice(&[0xff, rgb[0], rgb[1], rgb[2]]),
        _ => out.copy_from_slice(&rgb),
    }
}

pub struct SensorEntity {
    pads: Vec<PadFlags>,
    format: MbusFormat,
    limits: FrameLimits,
    mode: TickMode,
    /// Parked here while stopped; owned by the generator task while streaming.
    pattern: Option<Box<dyn PatternSource>>,
    generator: Option<TaskHandle<Box<dyn PatternSource>>>,
}

impl SensorEntity {
    pub const DEFAULT_CODE: u32 = code::SRGGB8_1X8;

    pub fn new(pads: Vec<PadFlags>, params: &EntityParams) -> PipelineResult<Self> {
        check_layout(EntityKind::Sensor, &pads)?;
        Ok(Self {
            pads,
            format: MbusFormat::new(DEFAULT_WIDTH, DEFAULT_HEIGHT, Self::DEFAULT_CODE),
            limits: params.limits,
            mode: TickMode::from_rate(params.frame_rate_hz),
            pattern: Some(Box::new(params.pattern)),
            generator: None,
        })
    }

    /// Replace the pattern source used from the next start on.
    pub fn with_pattern(mut self, pattern: Box<dyn PatternSource>) -> Self {
        self.pattern = Some(pattern);
        self
    }

    fn negotiate(&self, proposed: &MbusFormat) -> MbusFormat {
        negotiate_mbus(proposed, &self.limits, Self::DEFAULT_CODE, |_| true)
    }
}

impl EntityOps for SensorEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Sensor
    }

    fn pads(&self) -> &[PadFlags] {
        &self.pads
    }

    fn format(&self, pad: u16) -> PipelineResult<MbusFormat> {
        pad_flags(&self.pads, pad)?;
        Ok(self.format)
    }

    fn try_format(&self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        pad_flags(&self.pads, pad)?;
        Ok(self.negotiate(proposed))
    }

    fn set_format(&mut self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        pad_flags(&self.pads, pad)?;
        self.format = self.negotiate(proposed);
        tracing::debug!(
            "Sensor format {}x{} {}",
            self.format.width,
            self.format.height,
            pixfmt::code_name(self.format.code)
        );
        Ok(self.format)
    }

    fn start(&mut self, ctx: &StartContext<'_>) -> PipelineResult<()> {
        let size = self.format.frame_size().ok_or_else(|| {
            PipelineError::invalid(format!("sensor code {:#x} has no size", self.format.code))
        })?;
        let mut frame = alloc_frame(size)?;
        let mut pattern = self
            .pattern
            .take()
            .unwrap_or_else(|| Box::new(TestPattern::default()) as Box<dyn PatternSource>);

        let format = self.format;
        let router = ctx.router.clone();
        let pads: Vec<PadId> = ctx.source_pads.to_vec();
        let generator = TaskHandle::spawn(
            &format!("{}-generator", ctx.name),
            self.mode,
            move |mut ticker| {
                let mut sequence = 0u64;
                while ticker.wait() {
                    pattern.fill(&format, sequence, &mut frame);
                    let router = read(&router);
                    for &pad in &pads {
                        router.propagate(pad, &frame);
                    }
                    tracing::trace!("Generated frame {}", sequence);
                    sequence += 1;
                }
                pattern
            },
        )?;

        self.generator = Some(generator);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(generator) = self.generator.take() else {
            return;
        };
        self.pattern = match generator.stop() {
            Some(pattern) => Some(pattern),
            None => {
                tracing::warn!("Generator lost its pattern source, using the default");
                Some(Box::new(TestPattern::default()) as Box<dyn PatternSource>)
            }
        };
    }

    /// Injected frames are propagated as if generated.
    fn process_frame(&mut self, origin: Option<PadId>, frame: &[u8], ctx: &FrameContext<'_>) {
        if origin.is_none() {
            ctx.emit(frame);
        }
    }

    fn trigger(&self) -> PipelineResult<()> {
        match &self.generator {
            Some(_) if self.mode != TickMode::Manual => Err(PipelineError::invalid(
                "sensor runs at a fixed rate and does not accept triggers",
            )),
            Some(generator) if generator.trigger() => Ok(()),
            _ => Err(PipelineError::NotStreaming(EntityKind::Sensor.to_string())),
        }
    }
}
