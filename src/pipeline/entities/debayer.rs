//! Bayer to RGB888 conversion.

use crate::pipeline::entities::{alloc_frame, check_layout, negotiate_mbus, EntityParams};
use crate::pipeline::entity::{pad_flags, EntityOps, FrameContext, StartContext};
use crate::pipeline::entity_kind::EntityKind;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::{FrameLimits, MbusFormat, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::pipeline::id::PadId;
use crate::pipeline::pad::PadFlags;
use crate::pipeline::pixfmt::{self, code, BayerOrder};

/// Convert one bayer frame to packed RGB888.
///
/// Each output channel is the mean of the samples of that colour inside a
/// `window`×`window` square centred on the pixel. The square is clipped at the
/// frame edges. Samples deeper than 8 bits are scaled down.
pub fn debayer_frame(
    order: &BayerOrder,
    width: usize,
    height: usize,
    window: usize,
    src: &[u8],
    dst: &mut [u8],
) {
    let bpp = if order.bits > 8 { 2 } else { 1 };
    let reach = window / 2;
    let shift = order.bits.saturating_sub(8);

    for line in 0..height {
        let lines = line.saturating_sub(reach)..=(line + reach).min(height - 1);
        for column in 0..width {
            let columns = column.saturating_sub(reach)..=(column + reach).min(width - 1);
            let mut sums = [0u32; 3];
            let mut counts = [0u32; 3];

            for wline in lines.clone() {
                for wcolumn in columns.clone() {
                    let at = (wline * width + wcolumn) * bpp;
                    let sample = if bpp == 1 {
                        src[at] as u32
                    } else {
                        u16::from_le_bytes([src[at], src[at + 1]]) as u32
                    };
                    let channel = order.color_at(wline, wcolumn).channel();
                    sums[channel] += sample;
                    counts[channel] += 1;
                }
            }

            let out = (line * width + column) * 3;
            for channel in 0..3 {
                let mean = match counts[channel] {
                    0 => 0,
                    n => sums[channel] / n,
                };
                dst[out + channel] = (mean >> shift).min(0xff) as u8;
            }
        }
    }
}

pub struct DebayerEntity {
    pads: Vec<PadFlags>,
    sink: MbusFormat,
    limits: FrameLimits,
    window: usize,
    order: Option<&'static BayerOrder>,
    frame: Option<Vec<u8>>,
}

impl DebayerEntity {
    pub const DEFAULT_SINK_CODE: u32 = code::SRGGB8_1X8;
    pub const SOURCE_CODE: u32 = code::RGB888_1X24;

    pub fn new(pads: Vec<PadFlags>, params: &EntityParams) -> PipelineResult<Self> {
        check_layout(EntityKind::Debayer, &pads)?;
        if params.debayer_window % 2 == 0 {
            return Err(PipelineError::invalid(format!(
                "debayer window must be odd, got {}",
                params.debayer_window
            )));
        }
        Ok(Self {
            pads,
            sink: MbusFormat::new(DEFAULT_WIDTH, DEFAULT_HEIGHT, Self::DEFAULT_SINK_CODE),
            limits: params.limits,
            window: params.debayer_window as usize,
            order: None,
            frame: None,
        })
    }

    fn source_format(&self) -> MbusFormat {
        MbusFormat {
            code: Self::SOURCE_CODE,
            ..self.sink
        }
    }

    fn negotiate(&self, pad: u16, proposed: &MbusFormat) -> PipelineResult<MbusFormat> {
        if pad_flags(&self.pads, pad)?.is_source() {
            return Ok(self.source_format());
        }
        Ok(negotiate_mbus(
            proposed,
            &self.limits,
            Self::DEFAULT_SINK_CODE,
            |c| pixfmt::bayer_order(c).is_some(),
        ))
    }
}

impl EntityOps for DebayerEntity {
    fn kind(&self) -> EntityKind {
        EntityKind::Debayer
    }

    fn pads(&self) -> &[PadFlags] {
        &self.pads
    }

    fn format(&self, pad: u16) -> PipelineResult<MbusFormat> {
        if pad_flags(&self.pads, pad)?.is_source() {
            Ok(self.source_format())
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
                "Debayer sink {}x{} {}",
                accepted.width,
                accepted.height,
                pixfmt::code_name(accepted.code)
            );
        }
        Ok(accepted)
    }

    fn start(&mut self, _ctx: &StartContext<'_>) -> PipelineResult<()> {
        let order = pixfmt::bayer_order(self.sink.code).ok_or_else(|| {
            PipelineError::invalid(format!(
                "debayer sink code {} is not bayer",
                pixfmt::code_name(self.sink.code)
            ))
        })?;
        let size = self.sink.width as usize * self.sink.height as usize * 3;
        self.frame = Some(alloc_frame(size)?);
        self.order = Some(order);
        Ok(())
    }

    fn stop(&mut self) {
        self.frame = None;
        self.order = None;
    }

    fn process_frame(&mut self, _origin: Option<PadId>, frame: &[u8], ctx: &FrameContext<'_>) {
        let (Some(out), Some(order)) = (self.frame.as_mut(), self.order) else {
            return;
        };
        let width = self.sink.width as usize;
        let height = self.sink.height as usize;
        let bpp = if order.bits > 8 { 2 } else { 1 };
        if frame.len() < width * height * bpp {
            tracing::warn!(
                "Debayer got {} bytes, {} expected; frame dropped",
                frame.len(),
                width * height * bpp
            );
            return;
        }

        debayer_frame(order, width, height, self.window, frame, out);
        ctx.emit(&out[..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::entities::{PatternSource, TestPattern};
    use proptest::prelude::*;

    #[test]
    fn test_uniform_bayer_debayers_to_color() {
        let order = pixfmt::bayer_order(code::SRGGB8_1X8).unwrap();
        let format = MbusFormat::new(4, 4, code::SRGGB8_1X8);
        let mut raw = vec![0u8; 16];
        TestPattern::Solid([200, 100, 50]).fill(&format, 0, &mut raw);

        let mut rgb = vec![0u8; 4 * 4 * 3];
        debayer_frame(order, 4, 4, 3, &raw, &mut rgb);

        // Corners and edges included: no border artifacts
        for pixel in rgb.chunks_exact(3) {
            assert_eq!(pixel, &[200, 100, 50]);
        }
    }

    #[test]
    fn test_deep_samples_scale_to_eight_bits() {
        let order = pixfmt::bayer_order(code::SBGGR12_1X12).unwrap();
        let format = MbusFormat::new(4, 4, code::SBGGR12_1X12);
        let mut raw = vec![0u8; 32];
        TestPattern::Solid([16, 32, 64]).fill(&format, 0, &mut raw);

        let mut rgb = vec![0u8; 48];
        debayer_frame(order, 4, 4, 5, &raw, &mut rgb);
        for pixel in rgb.chunks_exact(3) {
            assert_eq!(pixel, &[16, 32, 64]);
        }
    }

    #[test]
    fn test_window_of_one_keeps_only_site_color() {
        let order = pixfmt::bayer_order(code::SRGGB8_1X8).unwrap();
        let raw = vec![90u8; 4];
        let mut rgb = vec![0u8; 12];
        debayer_frame(order, 2, 2, 1, &raw, &mut rgb);
        assert_eq!(&rgb[..3], &[90, 0, 0]);
        assert_eq!(&rgb[9..], &[0, 0, 90]);
    }

    #[test]
    fn test_source_pad_follows_sink() {
        let mut debayer = DebayerEntity::new(
            EntityKind::Debayer.default_pads().to_vec(),
            &EntityParams::default(),
        )
        .unwrap();
        debayer
            .set_format(0, &MbusFormat::new(320, 240, code::SGBRG10_1X10))
            .unwrap();

        let source = debayer.format(1).unwrap();
        assert_eq!((source.width, source.height), (320, 240));
        assert_eq!(source.code, code::RGB888_1X24);

        // Proposals on the source pad return the derived format unchanged
        let proposed = MbusFormat::new(64, 64, code::BGR888_1X24);
        assert_eq!(debayer.set_format(1, &proposed).unwrap(), source);
        assert_eq!(debayer.format(0).unwrap().code, code::SGBRG10_1X10);
    }

    #[test]
    fn test_even_window_rejected() {
        let params = EntityParams {
            debayer_window: 4,
            ..Default::default()
        };
        assert!(DebayerEntity::new(EntityKind::Debayer.default_pads().to_vec(), &params).is_err());
    }

    proptest! {
        #[test]
        fn prop_debayer_negotiation_is_idempotent(
            width in 0u32..5000,
            height in 0u32..3000,
            index in 0usize..pixfmt::PIXEL_MAP.len() + 3,
            pad in 0u16..2,
        ) {
            let debayer = DebayerEntity::new(
                EntityKind::Debayer.default_pads().to_vec(),
                &EntityParams::default(),
            ).unwrap();
            let bus_code = pixfmt::by_index(index).map(|p| p.code).unwrap_or(0xbeef);
            let once = debayer.try_format(pad, &MbusFormat::new(width, height, bus_code)).unwrap();
            let twice = debayer.try_format(pad, &once).unwrap();
            prop_assert_eq!(once, twice);
            if pad == 0 {
                prop_assert!(pixfmt::bayer_order(once.code).is_some());
            }
        }
    }
}
