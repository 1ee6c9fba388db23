//! Builtin entity implementations.

mod capture;
mod debayer;
mod output;
mod scaler;
mod sensor;

pub use capture::CaptureEntity;
pub use debayer::{debayer_frame, DebayerEntity};
pub use output::OutputEntity;
pub use scaler::{upscale, ScalerEntity};
pub use sensor::{PatternSource, SensorEntity, TestPattern};

use crate::pipeline::entity::BuiltinEntity;
use crate::pipeline::entity_kind::EntityKind;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::format::{
    Colorimetry, Field, FrameLimits, MbusFormat, PixFormat, DEFAULT_HEIGHT, DEFAULT_WIDTH,
};
use crate::pipeline::pad::PadFlags;
use crate::pipeline::pixfmt::{self, FourCc};

/// Default frame rate of generator entities, in Hz.
pub const DEFAULT_FRAME_RATE_HZ: u32 = 60;

/// Default scaler multiplier.
pub const DEFAULT_SCALER_MULTIPLIER: u32 = 3;

/// Largest accepted scaler multiplier.
pub const MAX_SCALER_MULTIPLIER: u32 = 16;

/// Default debayer mean window size.
pub const DEFAULT_DEBAYER_WINDOW: u32 = 3;

/// Construction parameters shared by the builtin entities.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityParams {
    pub limits: FrameLimits,
    /// Generator and consumer rate; 0 selects manual triggering.
    pub frame_rate_hz: u32,
    pub scaler_multiplier: u32,
    pub debayer_window: u32,
    pub pattern: TestPattern,
}

impl Default for EntityParams {
    fn default() -> Self {
        Self {
            limits: FrameLimits::default(),
            frame_rate_hz: DEFAULT_FRAME_RATE_HZ,
            scaler_multiplier: DEFAULT_SCALER_MULTIPLIER,
            debayer_window: DEFAULT_DEBAYER_WINDOW,
            pattern: TestPattern::default(),
        }
    }
}

impl BuiltinEntity {
    /// Build the builtin entity of `kind` with the given pad layout.
    pub fn build(kind: EntityKind, pads: Vec<PadFlags>, params: &EntityParams) -> PipelineResult<Self> {
        Ok(match kind {
            EntityKind::Sensor => BuiltinEntity::Sensor(SensorEntity::new(pads, params)?),
            EntityKind::Debayer => BuiltinEntity::Debayer(DebayerEntity::new(pads, params)?),
            EntityKind::Scaler => BuiltinEntity::Scaler(ScalerEntity::new(pads, params)?),
            EntityKind::Capture => BuiltinEntity::Capture(CaptureEntity::new(pads, params)?),
            EntityKind::Output => BuiltinEntity::Output(OutputEntity::new(pads, params)?),
            EntityKind::Custom => {
                return Err(PipelineError::invalid(
                    "custom entities must be supplied as plugins",
                ))
            }
        })
    }
}

fn check_layout(kind: EntityKind, pads: &[PadFlags]) -> PipelineResult<()> {
    kind.check_pads(pads).map_err(PipelineError::InvalidArgument)
}

fn supported_field(field: Field) -> Field {
    match field {
        Field::Any => Field::None,
        other => other,
    }
}

/// Negotiate a pad format: clamp the size, fall back to `default_code` when
/// the proposed code is unknown or rejected by `accepts`, resolve the field
/// and fill unset colorimetry.
pub(crate) fn negotiate_mbus(
    proposed: &MbusFormat,
    limits: &FrameLimits,
    default_code: u32,
    accepts: impl Fn(u32) -> bool,
) -> MbusFormat {
    let code = match pixfmt::by_code(proposed.code) {
        Some(pix) if accepts(pix.code) => pix.code,
        _ => default_code,
    };
    MbusFormat {
        width: limits.clamp_width(proposed.width),
        height: limits.clamp_height(proposed.height),
        code,
        field: supported_field(proposed.field),
        colorimetry: proposed.colorimetry.filled_from(&Colorimetry::SRGB),
    }
}

/// Negotiate an endpoint format. Unknown fourccs fall back to RGB24 and the
/// memory layout is always recomputed.
pub(crate) fn negotiate_pix(proposed: &PixFormat, limits: &FrameLimits) -> PixFormat {
    let (pixelformat, bpp) = match pixfmt::by_fourcc(proposed.pixelformat) {
        Some(pix) => (pix.fourcc, pix.bpp),
        None => (FourCc::RGB24, 3),
    };
    let width = limits.clamp_width(proposed.width);
    let height = limits.clamp_height(proposed.height);
    let bytes_per_line = width * bpp;
    PixFormat {
        width,
        height,
        pixelformat,
        field: supported_field(proposed.field),
        colorimetry: proposed.colorimetry.filled_from(&Colorimetry::SRGB),
        bytes_per_line,
        size_image: bytes_per_line * height,
    }
}

pub(crate) fn default_pix_format(limits: &FrameLimits) -> PixFormat {
    negotiate_pix(
        &PixFormat::new(DEFAULT_WIDTH, DEFAULT_HEIGHT, FourCc::RGB24),
        limits,
    )
}

/// Pad format of an endpoint, derived from its pixel format.
pub(crate) fn pix_to_mbus(pix: &PixFormat) -> MbusFormat {
    pix.to_mbus().unwrap_or_else(|| MbusFormat {
        colorimetry: pix.colorimetry,
        field: pix.field,
        ..MbusFormat::new(pix.width, pix.height, pixfmt::code::RGB888_1X24)
    })
}

/// Pixel format an endpoint uses for a pad format proposal.
pub(crate) fn mbus_to_pix(format: &MbusFormat) -> PixFormat {
    let fourcc = pixfmt::by_code(format.code)
        .map(|p| p.fourcc)
        .unwrap_or(FourCc::RGB24);
    PixFormat {
        field: format.field,
        colorimetry: format.colorimetry,
        ..PixFormat::new(format.width, format.height, fourcc)
    }
}

/// Allocate a zeroed working buffer, reporting allocation failure instead of
/// aborting.
pub(crate) fn alloc_frame(size: usize) -> PipelineResult<Vec<u8>> {
    let mut frame = Vec::new();
    frame.try_reserve_exact(size).map_err(|e| {
        PipelineError::ResourceExhausted(format!("{} byte frame buffer: {}", size, e))
    })?;
    frame.resize(size, 0);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::format::ColorSpace;
    use crate::pipeline::pixfmt::code;

    #[test]
    fn test_negotiate_substitutes_default_code() {
        let limits = FrameLimits::default();
        let proposed = MbusFormat::new(100, 100, 0xdead);
        let accepted = negotiate_mbus(&proposed, &limits, code::SRGGB8_1X8, |_| true);
        assert_eq!(accepted.code, code::SRGGB8_1X8);

        // Known but rejected codes also fall back
        let rgb = MbusFormat::new(100, 100, code::RGB888_1X24);
        let accepted = negotiate_mbus(&rgb, &limits, code::SRGGB8_1X8, |c| {
            pixfmt::bayer_order(c).is_some()
        });
        assert_eq!(accepted.code, code::SRGGB8_1X8);
    }

    #[test]
    fn test_negotiate_resolves_field_and_colorimetry() {
        let proposed = MbusFormat {
            field: Field::Any,
            colorimetry: Colorimetry {
                colorspace: ColorSpace::Rec709,
                ..Default::default()
            },
            ..MbusFormat::new(33, 1, code::RGB888_1X24)
        };
        let accepted = negotiate_mbus(&proposed, &FrameLimits::default(), code::RGB888_1X24, |_| {
            true
        });
        assert_eq!(accepted.width, 32);
        assert_eq!(accepted.height, 2);
        assert_eq!(accepted.field, Field::None);
        assert_eq!(accepted.colorimetry.colorspace, ColorSpace::Rec709);
        assert_eq!(
            accepted.colorimetry.quantization,
            Colorimetry::SRGB.quantization
        );
    }

    #[test]
    fn test_pix_layout() {
        let pix = negotiate_pix(
            &PixFormat::new(641, 480, FourCc::new(b"XXXX")),
            &FrameLimits::default(),
        );
        assert_eq!(pix.pixelformat, FourCc::RGB24);
        assert_eq!(pix.width, 640);
        assert_eq!(pix.bytes_per_line, 640 * 3);
        assert_eq!(pix.size_image, 640 * 3 * 480);

        let raw = negotiate_pix(
            &PixFormat::new(64, 48, FourCc::SRGGB10),
            &FrameLimits::default(),
        );
        assert_eq!(raw.bytes_per_line, 128);
        assert_eq!(pix_to_mbus(&raw).code, code::SRGGB10_1X10);
    }

    #[test]
    fn test_build_rejects_custom_and_bad_layouts() {
        let params = EntityParams::default();
        assert!(BuiltinEntity::build(EntityKind::Custom, vec![PadFlags::sink()], &params).is_err());
        assert!(matches!(
            BuiltinEntity::build(EntityKind::Capture, vec![PadFlags::source()], &params),
            Err(PipelineError::InvalidArgument(_))
        ));
        let sensor = BuiltinEntity::build(
            EntityKind::Sensor,
            EntityKind::Sensor.default_pads().to_vec(),
            &params,
        )
        .unwrap();
        assert_eq!(sensor.kind(), EntityKind::Sensor);
    }
}
