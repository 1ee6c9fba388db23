//! Integer upscaler.

use crate::pipeline::entities::{
    alloc_frame, check_layout, negotiate_mbus, EntityParams, MAX_SCALER_MULTIPLIER,
};
use crate::pipeline::entity::{pad_flags, EntityOps, FrameContext, StartContext};
use crate::pipeline::entity_kind::EntityKind;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::{FrameLimits, MbusFormat, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::pipeline::id::PadId;
use crate::pipeline::pad::PadFlags;
use crate::pipeline::pixfmt::{self, code};

/// Replicate every pixel of `src` into a `multiplier`×`multiplier` block.
pub fn upscale(
    src: &[u8],
    width: usize,
    height: usize,
    bpp: usize,
    multiplier: usize,
    dst: &mut [u8],
) {
    let out_line = width * multiplier * bpp;
    for line in 0..height {
        let base = line * multiplier * out_line;
        let row = &mut dst[base..base + out_line];
        for column in 0..width {
            let at = (line * width + column) * bpp;
            let pixel = &src[at..at + bpp];
            for copy in 0..multiplier {
                let out = (column * multiplier + copy) * bpp;
                row[out..out + bpp].copy_from_slice(pixel);
            }
        }
        for copy in 1..multiplier {
            dst.copy_within(base..base + out_line, base + copy * out_line);
        }
    }
}

pub struct ScalerEntity {
    pads: Vec<PadFlags>,
    sink: MbusFormat,
    limits: FrameLimits,
    multiplier: u32,
    frame: Option<Vec<u8>>,
}

impl ScalerEntity {
    pub const DEFAULT_SINK_CODE: u32 = code::RGB888_1X24;

    pub fn new(pads: Vec<PadFlags>, params: &EntityParams) -> PipelineResult<Self> {
        check_layout(EntityKind::Scaler, &pads)?;
        if !(1..=MAX_SCALER_MULTIPLIER).contains(&params.scaler_multiplier) {
            return Err(PipelineError::invalid(format!(
                "scaler multiplier must be in 1..={}, got {}",
                MAX_SCALER_MULTIPLIER, params.scaler_multiplier
            )));
        }
        Ok(Self {
            pads,
            sink: MbusFormat::new(DEFAULT_WIDTH, DEFAULT_HEIGHT, Self::DEFAULT_SINK_CODE),
            limits: params.limits,
            multiplier: params.scaler_multiplier,
            frame: None,
        })
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Source pad format for `sink`. Fails when the scaled size does not fit.
    fn scaled(&self, sink: &MbusFormat) -> PipelineResult<MbusFormat> {
        let width = sink.width.checked_mul(self.multiplier);
        let height = sink.height.checked_mul(self.multiplier);
        match (width, height) {
            (Some(width), Some(height)) => Ok(MbusFormat {
                width,
                height,
                ..*sink
            }),
            _ => Err(PipelineError::invalid(format!(
                "{}x{} scaled x{} overflows",
                sink.width, sink.height, self.multiplier
            ))),
        }
    }

    fn source_format(&self) -> PipelineResult<MbusFormat> {
        self.scaled(&self.sink)
    }

    fn negotiate(&self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        if pad_flags(&self.pads, pad)?.is_source() {
            return self.source_format();
        }
        let accepted = negotiate_mbus(
            proposed,
            &self.limits,
            Self::DEFAULT_SINK_CODE,
            |c| pixfmt::by_code(c).is_some_and(|p| !p.bayer),
        );
        // A sink size whose source cannot be represented is refused outright
        self.scaled(&accepted)?;
        Ok(accepted)
    }
}

impl EntityOps for ScalerEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Scaler
    }

    fn pads(&self) -> &[PadFlags] {
        &self.pads
    }

    fn format(&self, pad: u16) -> PipelineResult<MbusFormat> {
        if pad_flags(&self.pads, pad)?.is_source() {
            self.source_format()
        } else {
            Ok(self.sink)
        }
    }

    fn try_format(&self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        self.negotiate(pad, proposed)
    }

    fn set_format(&mut self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        let accepted = self.negotiate(pad, proposed)?;
        if pad_flags(&self.pads, pad)?.is_sink() {
            self.sink = accepted;
            tracing::debug!(
                "Scaler sink {}x{} {}, source x{}",
                accepted.width,
                accepted.height,
                pixfmt::code_name(accepted.code),
                self.multiplier
            );
        }
        Ok(accepted)
    }

    fn start(&mut self, _ctx: &StartContext<'_>) -> PipelineResult<()> {
        let size = self.source_format()?.frame_size().ok_or_else(|| {
            PipelineError::invalid(format!("scaler code {:#x} has no size", self.sink.code))
        })?;
        self.frame = Some(alloc_frame(size)?);
        Ok(())
    }

    fn stop(&mut self) {
        self.frame = None;
    }

    fn process_frame(&mut self, _origin: Option<PadId>, frame: &[u8], ctx: &FrameContext<'_>) {
        let Some(out) = self.frame.as_mut() else {
            return;
        };
        let Some(bpp) = self.sink.bpp() else {
            return;
        };
        let width = self.sink.width as usize;
        let height = self.sink.height as usize;
        let expected = width * height * bpp as usize;
        if frame.len() < expected {
            tracing::warn!(
                "Scaler got {} bytes, {} expected; frame dropped",
                frame.len(),
                expected
            );
            return;
        }

        upscale(
            frame,
            width,
            height,
            bpp as usize,
            self.multiplier as usize,
            out,
        );
        ctx.emit(&out[..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_upscale_2x2_by_3() {
        // Four distinct RGB pixels
        let src: Vec<u8> = (0..4u8).flat_map(|p| [p * 10, p * 10 + 1, p * 10 + 2]).collect();
        let mut dst = vec![0u8; 6 * 6 * 3];
        upscale(&src, 2, 2, 3, 3, &mut dst);

        for line in 0..6 {
            for column in 0..6 {
                let source_pixel = (line / 3) * 2 + column / 3;
                let at = (line * 6 + column) * 3;
                assert_eq!(
                    &dst[at..at + 3],
                    &src[source_pixel * 3..source_pixel * 3 + 3],
                    "pixel ({}, {})",
                    line,
                    column
                );
            }
        }
    }

    #[test]
    fn test_multiplier_one_is_copy() {
        let src: Vec<u8> = (0..24).collect();
        let mut dst = vec![0u8; 24];
        upscale(&src, 4, 2, 3, 1, &mut dst);
        assert_eq!(src, dst);
    }

    #[test]
    fn test_source_is_multiplied_sink() {
        let mut scaler = ScalerEntity::new(
            EntityKind::Scaler.default_pads().to_vec(),
            &EntityParams::default(),
        )
        .unwrap();
        scaler
            .set_format(0, &MbusFormat::new(100, 50, code::ARGB8888_1X32))
            .unwrap();
        let source = scaler.format(1).unwrap();
        assert_eq!((source.width, source.height), (300, 150));
        assert_eq!(source.code, code::ARGB8888_1X32);
    }

    #[test]
    fn test_bayer_sink_rejected() {
        let scaler = ScalerEntity::new(
            EntityKind::Scaler.default_pads().to_vec(),
            &EntityParams::default(),
        )
        .unwrap();
        let accepted = scaler
            .try_format(0, &MbusFormat::new(64, 64, code::SRGGB8_1X8))
            .unwrap();
        assert_eq!(accepted.code, code::RGB888_1X24);
    }

    #[test]
    fn test_multiplier_bounds() {
        let pads = EntityKind::Scaler.default_pads().to_vec();
        for multiplier in [0, MAX_SCALER_MULTIPLIER + 1, 1 << 20] {
            let params = EntityParams {
                scaler_multiplier: multiplier,
                ..EntityParams::default()
            };
            assert!(matches!(
                ScalerEntity::new(pads.clone(), &params),
                Err(PipelineError::InvalidArgument(_))
            ));
        }
        let params = EntityParams {
            scaler_multiplier: MAX_SCALER_MULTIPLIER,
            ..EntityParams::default()
        };
        assert!(ScalerEntity::new(pads, &params).is_ok());
    }

    #[test]
    fn test_largest_sink_does_not_overflow_source() {
        let params = EntityParams {
            scaler_multiplier: MAX_SCALER_MULTIPLIER,
            ..EntityParams::default()
        };
        let mut scaler =
            ScalerEntity::new(EntityKind::Scaler.default_pads().to_vec(), &params).unwrap();
        scaler
            .set_format(0, &MbusFormat::new(4096, 2160, code::RGB888_1X24))
            .unwrap();
        let source = scaler.format(1).unwrap();
        assert_eq!((source.width, source.height), (4096 * 16, 2160 * 16));
    }

    #[test]
    fn test_unrepresentable_source_is_refused() {
        let params = EntityParams {
            scaler_multiplier: MAX_SCALER_MULTIPLIER,
            limits: FrameLimits {
                max_width: u32::MAX,
                ..FrameLimits::default()
            },
            ..EntityParams::default()
        };
        let mut scaler =
            ScalerEntity::new(EntityKind::Scaler.default_pads().to_vec(), &params).unwrap();
        let huge = MbusFormat::new(u32::MAX / 2, 480, code::RGB888_1X24);
        assert!(matches!(
            scaler.try_format(0, &huge),
            Err(PipelineError::InvalidArgument(_))
        ));
        assert!(scaler.set_format(0, &huge).is_err());
        // The previous sink format is kept
        assert_eq!(scaler.format(0).unwrap().width, DEFAULT_WIDTH);
        assert!(scaler.format(1).is_ok());
    }

    proptest! {
        #[test]
        fn prop_scaler_negotiation_is_idempotent(
            width in 0u32..5000,
            height in 0u32..3000,
            index in 0usize..pixfmt::PIXEL_MAP.len() + 3,
            pad in 0u16..2,
        ) {
            let scaler = ScalerEntity::new(
                EntityKind::Scaler.default_pads().to_vec(),
                &EntityParams::default(),
            ).unwrap();
            let bus_code = pixfmt::by_index(index).map(|p| p.code).unwrap_or(0xbeef);
            let once = scaler.try_format(pad, &MbusFormat::new(width, height, bus_code)).unwrap();
            let twice = scaler.try_format(pad, &once).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
