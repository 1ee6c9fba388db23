//! Pixel-format table.
//!
//! Maps media bus codes (used on pads) to public fourcc pixel formats (used on
//! endpoint buffers) and to the number of bytes a pixel occupies in memory.
//! A second table gives the colour filter layout of every bayer code, used by
//! the debayer transform and by the sensor when rendering raw frames.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Media bus codes known to the table.
pub mod code {
    pub const BGR888_1X24: u32 = 0x1013;
    pub const RGB888_1X24: u32 = 0x100a;
    pub const ARGB8888_1X32: u32 = 0x100d;
    pub const SBGGR8_1X8: u32 = 0x3001;
    pub const SGBRG8_1X8: u32 = 0x3013;
    pub const SGRBG8_1X8: u32 = 0x3002;
    pub const SRGGB8_1X8: u32 = 0x3014;
    pub const SBGGR10_1X10: u32 = 0x3007;
    pub const SGBRG10_1X10: u32 = 0x300e;
    pub const SGRBG10_1X10: u32 = 0x300a;
    pub const SRGGB10_1X10: u32 = 0x300f;
    pub const SBGGR12_1X12: u32 = 0x3008;
    pub const SGBRG12_1X12: u32 = 0x3010;
    pub const SGRBG12_1X12: u32 = 0x3011;
    pub const SRGGB12_1X12: u32 = 0x3012;
}

/// Four-character pixel format code, little-endian packed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCc(pub u32);

impl FourCc {
    pub const RGB24: FourCc = FourCc::new(b"RGB3");
    pub const BGR24: FourCc = FourCc::new(b"BGR3");
    pub const ARGB32: FourCc = FourCc::new(b"BA24");
    pub const SBGGR8: FourCc = FourCc::new(b"BA81");
    pub const SGBRG8: FourCc = FourCc::new(b"GBRG");
    pub const SGRBG8: FourCc = FourCc::new(b"GRBG");
    pub const SRGGB8: FourCc = FourCc::new(b"RGGB");
    pub const SBGGR10: FourCc = FourCc::new(b"BG10");
    pub const SGBRG10: FourCc = FourCc::new(b"GB10");
    pub const SGRBG10: FourCc = FourCc::new(b"BA10");
    pub const SRGGB10: FourCc = FourCc::new(b"RG10");
    pub const SBGGR12: FourCc = FourCc::new(b"BG12");
    pub const SGBRG12: FourCc = FourCc::new(b"GB12");
    pub const SGRBG12: FourCc = FourCc::new(b"BA12");
    pub const SRGGB12: FourCc = FourCc::new(b"RG12");

    pub const fn new(chars: &[u8; 4]) -> Self {
        Self(u32::from_le_bytes(*chars))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_bytes() {
            let c = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

impl TryFrom<String> for FourCc {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes: [u8; 4] = value
            .as_bytes()
            .try_into()
            .map_err(|_| format!("fourcc must be exactly 4 bytes, got {:?}", value))?;
        Ok(FourCc::new(&bytes))
    }
}

impl From<FourCc> for String {
    fn from(value: FourCc) -> Self {
        value.to_string()
    }
}

/// One row of the pixel-format table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelMap {
    pub name: &'static str,
    pub code: u32,
    pub bpp: u32,
    pub fourcc: FourCc,
    pub bayer: bool,
}

const fn pix(name: &'static str, code: u32, bpp: u32, fourcc: FourCc, bayer: bool) -> PixelMap {
    PixelMap {
        name,
        code,
        bpp,
        fourcc,
        bayer,
    }
}

/// Table of every supported format, in enumeration order.
pub static PIXEL_MAP: &[PixelMap] = &[
    pix("BGR888_1X24", code::BGR888_1X24, 3, FourCc::BGR24, false),
    pix("RGB888_1X24", code::RGB888_1X24, 3, FourCc::RGB24, false),
    pix("ARGB8888_1X32", code::ARGB8888_1X32, 4, FourCc::ARGB32, false),
    pix("SBGGR8_1X8", code::SBGGR8_1X8, 1, FourCc::SBGGR8, true),
    pix("SGBRG8_1X8", code::SGBRG8_1X8, 1, FourCc::SGBRG8, true),
    pix("SGRBG8_1X8", code::SGRBG8_1X8, 1, FourCc::SGRBG8, true),
    pix("SRGGB8_1X8", code::SRGGB8_1X8, 1, FourCc::SRGGB8, true),
    pix("SBGGR10_1X10", code::SBGGR10_1X10, 2, FourCc::SBGGR10, true),
    pix("SGBRG10_1X10", code::SGBRG10_1X10, 2, FourCc::SGBRG10, true),
    pix("SGRBG10_1X10", code::SGRBG10_1X10, 2, FourCc::SGRBG10, true),
    pix("SRGGB10_1X10", code::SRGGB10_1X10, 2, FourCc::SRGGB10, true),
    pix("SBGGR12_1X12", code::SBGGR12_1X12, 2, FourCc::SBGGR12, true),
    pix("SGBRG12_1X12", code::SGBRG12_1X12, 2, FourCc::SGBRG12, true),
    pix("SGRBG12_1X12", code::SGRBG12_1X12, 2, FourCc::SGRBG12, true),
    pix("SRGGB12_1X12", code::SRGGB12_1X12, 2, FourCc::SRGGB12, true),
];

/// Walk the table in order; out-of-range indices return `None`.
pub fn by_index(index: usize) -> Option<&'static PixelMap> {
    PIXEL_MAP.get(index)
}

pub fn by_code(code: u32) -> Option<&'static PixelMap> {
    PIXEL_MAP.iter().find(|p| p.code == code)
}

pub fn by_fourcc(fourcc: FourCc) -> Option<&'static PixelMap> {
    PIXEL_MAP.iter().find(|p| p.fourcc == fourcc)
}

/// Human readable name of a bus code, for logs.
pub fn code_name(code: u32) -> &'static str {
    by_code(code).map(|p| p.name).unwrap_or("UNKNOWN")
}

/// Colour of a single bayer filter site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BayerColor {
    Red = 0,
    Green = 1,
    Blue = 2,
}

impl BayerColor {
    #[inline]
    pub fn channel(self) -> usize {
        self as usize
    }
}

/// Colour filter layout of a bayer code, indexed by `[line % 2][column % 2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BayerOrder {
    pub code: u32,
    pub bits: u32,
    pub order: [[BayerColor; 2]; 2],
}

impl BayerOrder {
    #[inline]
    pub fn color_at(&self, line: usize, column: usize) -> BayerColor {
        self.order[line % 2][column % 2]
    }
}

use BayerColor::{Blue as B, Green as G, Red as R};

const BGGR: [[BayerColor; 2]; 2] = [[B, G], [G, R]];
const GBRG: [[BayerColor; 2]; 2] = [[G, B], [R, G]];
const GRBG: [[BayerColor; 2]; 2] = [[G, R], [B, G]];
const RGGB: [[BayerColor; 2]; 2] = [[R, G], [G, B]];

const fn bayer(code: u32, bits: u32, order: [[BayerColor; 2]; 2]) -> BayerOrder {
    BayerOrder { code, bits, order }
}

pub static BAYER_ORDERS: &[BayerOrder] = &[
    bayer(code::SBGGR8_1X8, 8, BGGR),
    bayer(code::SGBRG8_1X8, 8, GBRG),
    bayer(code::SGRBG8_1X8, 8, GRBG),
    bayer(code::SRGGB8_1X8, 8, RGGB),
    bayer(code::SBGGR10_1X10, 10, BGGR),
    bayer(code::SGBRG10_1X10, 10, GBRG),
    bayer(code::SGRBG10_1X10, 10, GRBG),
    bayer(code::SRGGB10_1X10, 10, RGGB),
    bayer(code::SBGGR12_1X12, 12, BGGR),
    bayer(code::SGBRG12_1X12, 12, GBRG),
    bayer(code::SGRBG12_1X12, 12, GRBG),
    bayer(code::SRGGB12_1X12, 12, RGGB),
];

pub fn bayer_order(code: u32) -> Option<&'static BayerOrder> {
    BAYER_ORDERS.iter().find(|b| b.code == code)
}
