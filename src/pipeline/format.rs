//! Frame formats exchanged between pads and endpoints.
//!
//! Pads carry an [`MbusFormat`] (a bus code plus geometry), endpoints carry a
//! [`PixFormat`] (a fourcc plus memory layout). Both share the field order
//! and colorimetry types defined here.

use crate::pipeline::pixfmt::{self, FourCc};
use serde::{Deserialize, Serialize};

/// Default frame width used by every entity.
pub const DEFAULT_WIDTH: u32 = 640;

/// Default frame height used by every entity.
pub const DEFAULT_HEIGHT: u32 = 480;

/// Interlacing order of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Field {
    /// Unset; negotiation replaces it with the entity default.
    #[default]
    Any,
    /// Progressive.
    None,
    Top,
    Bottom,
    Interlaced,
    SeqTb,
    SeqBt,
    Alternate,
}

impl Field {
    /// Whether a sink pad with this field order can take frames with `source`
    /// field order. Progressive sinks take anything.
    pub fn accepts(self, source: Field) -> bool {
        self == source || matches!(self, Field::Any | Field::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    #[default]
    Default,
    Srgb,
    Rec709,
    Smpte170m,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quantization {
    #[default]
    Default,
    FullRange,
    LimitedRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferFunction {
    #[default]
    Default,
    Srgb,
    Rec709,
    None,
}

/// Colorimetry triple. `Default` members are unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Colorimetry {
    pub colorspace: ColorSpace,
    pub quantization: Quantization,
    pub xfer_func: TransferFunction,
}

impl Colorimetry {
    /// Profile used to fill unset members.
    pub const SRGB: Colorimetry = Colorimetry {
        colorspace: ColorSpace::Srgb,
        quantization: Quantization::FullRange,
        xfer_func: TransferFunction::Srgb,
    };

    /// Replace every unset member with the one from `profile`.
    pub fn filled_from(self, profile: &Colorimetry) -> Colorimetry {
        Colorimetry {
            colorspace: if self.colorspace == ColorSpace::Default {
                profile.colorspace
            } else {
                self.colorspace
            },
            quantization: if self.quantization == Quantization::Default {
                profile.quantization
            } else {
                self.quantization
            },
            xfer_func: if self.xfer_func == TransferFunction::Default {
                profile.xfer_func
            } else {
                self.xfer_func
            },
        }
    }

    /// Describe the first member both sides set to different values.
    pub fn conflict_with(&self, other: &Colorimetry) -> Option<String> {
        if self.colorspace != ColorSpace::Default
            && other.colorspace != ColorSpace::Default
            && self.colorspace != other.colorspace
        {
            return Some(format!(
                "colorspace {:?} vs {:?}",
                self.colorspace, other.colorspace
            ));
        }
        if self.quantization != Quantization::Default
            && other.quantization != Quantization::Default
            && self.quantization != other.quantization
        {
            return Some(format!(
                "quantization {:?} vs {:?}",
                self.quantization, other.quantization
            ));
        }
        if self.xfer_func != TransferFunction::Default
            && other.xfer_func != TransferFunction::Default
            && self.xfer_func != other.xfer_func
        {
            return Some(format!(
                "transfer function {:?} vs {:?}",
                self.xfer_func, other.xfer_func
            ));
        }
        None
    }
}

/// Format of a pad: geometry plus a media bus code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MbusFormat {
    pub width: u32,
    pub height: u32,
    pub code: u32,
    #[serde(default)]
    pub field: Field,
    #[serde(default)]
    pub colorimetry: Colorimetry,
}

impl MbusFormat {
    pub fn new(width: u32, height: u32, code: u32) -> Self {
        Self {
            width,
            height,
            code,
            field: Field::None,
            colorimetry: Colorimetry::SRGB,
        }
    }

    /// Size in bytes of one packed frame, `None` for codes outside the table.
    pub fn frame_size(&self) -> Option<usize> {
        let pix = pixfmt::by_code(self.code)?;
        Some(self.width as usize * self.height as usize * pix.bpp as usize)
    }

    pub fn bpp(&self) -> Option<u32> {
        pixfmt::by_code(self.code).map(|p| p.bpp)
    }
}

/// Format of an endpoint buffer: a fourcc plus memory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixFormat {
    pub width: u32,
    pub height: u32,
    pub pixelformat: FourCc,
    #[serde(default)]
    pub field: Field,
    #[serde(default)]
    pub colorimetry: Colorimetry,
    #[serde(default)]
    pub bytes_per_line: u32,
    #[serde(default)]
    pub size_image: u32,
}

impl PixFormat {
    /// Proposal with only geometry and fourcc set.
    pub fn new(width: u32, height: u32, pixelformat: FourCc) -> Self {
        Self {
            width,
            height,
            pixelformat,
            field: Field::Any,
            colorimetry: Colorimetry::default(),
            bytes_per_line: 0,
            size_image: 0,
        }
    }

    pub fn to_mbus(&self) -> Option<MbusFormat> {
        let pix = pixfmt::by_fourcc(self.pixelformat)?;
        Some(MbusFormat {
            width: self.width,
            height: self.height,
            code: pix.code,
            field: self.field,
            colorimetry: self.colorimetry,
        })
    }
}

/// Supported frame size range. Sizes are kept even.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameLimits {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            min_width: 2,
            max_width: 4096,
            min_height: 2,
            max_height: 2160,
        }
    }
}

impl FrameLimits {
    pub fn clamp_width(&self, width: u32) -> u32 {
        width.clamp(self.min_width, self.max_width) & !1
    }

    pub fn clamp_height(&self, height: u32) -> u32 {
        height.clamp(self.min_height, self.max_height) & !1
    }

    pub fn is_valid(&self) -> bool {
        self.min_width >= 2
            && self.min_height >= 2
            && self.min_width % 2 == 0
            && self.min_height % 2 == 0
            && self.min_width <= self.max_width
            && self.min_height <= self.max_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pixfmt::code;

    #[test]
    fn test_field_wildcards() {
        assert!(Field::None.accepts(Field::Interlaced));
        assert!(Field::Any.accepts(Field::Top));
        assert!(Field::Top.accepts(Field::Top));
        assert!(!Field::Top.accepts(Field::Bottom));
    }

    #[test]
    fn test_colorimetry_fill() {
        let partial = Colorimetry {
            colorspace: ColorSpace::Rec709,
            ..Default::default()
        };
        let filled = partial.filled_from(&Colorimetry::SRGB);
        assert_eq!(filled.colorspace, ColorSpace::Rec709);
        assert_eq!(filled.quantization, Quantization::FullRange);
        assert_eq!(filled.xfer_func, TransferFunction::Srgb);
    }

    #[test]
    fn test_colorimetry_conflict_ignores_unset() {
        let unset = Colorimetry::default();
        assert!(unset.conflict_with(&Colorimetry::SRGB).is_none());

        let rec709 = Colorimetry {
            colorspace: ColorSpace::Rec709,
            ..Colorimetry::SRGB
        };
        assert!(rec709.conflict_with(&Colorimetry::SRGB).is_some());
    }

    #[test]
    fn test_frame_size() {
        let fmt = MbusFormat::new(640, 480, code::RGB888_1X24);
        assert_eq!(fmt.frame_size(), Some(640 * 480 * 3));
        assert_eq!(MbusFormat::new(4, 4, 0xdead).frame_size(), None);
    }

    #[test]
    fn test_limits_clamp_even() {
        let limits = FrameLimits::default();
        assert_eq!(limits.clamp_width(641), 640);
        assert_eq!(limits.clamp_width(0), 2);
        assert_eq!(limits.clamp_width(10_000), 4096);
        assert_eq!(limits.clamp_height(3000), 2160);
        assert!(limits.is_valid());
    }
}
