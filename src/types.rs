//! Input, output, and parameter types shared across the crate.

use crate::{wu::Cube, MAX_COLORS, MAX_PIXELS};
use palette::{cast::ComponentsAs, Srgba};
use std::{fmt::Display, num::NonZeroU8, ops::Deref};
use thiserror::Error;
#[cfg(feature = "image")]
use image::RgbaImage;

/// An error type for invalid pixel input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PixelSliceError {
    /// The raw byte buffer does not divide into whole 4-byte RGBA samples.
    #[error("raw pixel buffer of {0} bytes is not a sequence of 4-byte RGBA samples")]
    InvalidPixelFormat(usize),
    /// The input holds more pixels than the supported maximum.
    #[error("above the maximum of {} pixels", MAX_PIXELS)]
    AboveMaxLen,
}

/// An error type for palette sizes greater than [`MAX_COLORS`].
///
/// The inner value is the rejected size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("palette size {0} is above the maximum of {max}", max = MAX_COLORS)]
pub struct AboveMaxColors(pub u16);

/// A borrowed slice of RGBA pixels with the invariant that its length
/// does not exceed [`MAX_PIXELS`].
///
/// # Examples
/// From a color slice:
/// ```
/// # use wuquant::{PixelSlice, PixelSliceError};
/// # use palette::Srgba;
/// # fn main() -> Result<(), PixelSliceError> {
/// let srgba = vec![Srgba::new(0u8, 0, 0, 255)];
/// let pixels: PixelSlice = srgba.as_slice().try_into()?;
/// # Ok(())
/// # }
/// ```
///
/// From raw RGBA bytes (fails if the length is not a multiple of 4):
/// ```
/// # use wuquant::{PixelSlice, PixelSliceError};
/// # fn main() -> Result<(), PixelSliceError> {
/// let bytes = [255u8, 0, 0, 255, 0, 255, 0, 255];
/// let pixels = PixelSlice::try_from(bytes.as_slice())?;
/// assert_eq!(pixels.num_pixels(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct PixelSlice<'a>(&'a [Srgba<u8>]);

impl<'a> Clone for PixelSlice<'a> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a> Copy for PixelSlice<'a> {}

impl<'a> PixelSlice<'a> {
    /// Creates a [`PixelSlice`] without checking its length against [`MAX_PIXELS`].
    pub(crate) const fn new_unchecked(pixels: &'a [Srgba<u8>]) -> Self {
        Self(pixels)
    }

    /// Creates a [`PixelSlice`] by truncating the input to at most [`MAX_PIXELS`] pixels.
    #[must_use]
    pub fn from_truncated(pixels: &'a [Srgba<u8>]) -> Self {
        Self(&pixels[..pixels.len().min(MAX_PIXELS as usize)])
    }

    /// Returns the number of pixels in the slice.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn num_pixels(&self) -> u32 {
        self.0.len() as u32
    }
}

impl<'a> AsRef<[Srgba<u8>]> for PixelSlice<'a> {
    fn as_ref(&self) -> &[Srgba<u8>] {
        self
    }
}

impl<'a> Deref for PixelSlice<'a> {
    type Target = [Srgba<u8>];

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl<'a> From<PixelSlice<'a>> for &'a [Srgba<u8>] {
    fn from(val: PixelSlice<'a>) -> Self {
        val.0
    }
}

impl<'a> TryFrom<&'a [Srgba<u8>]> for PixelSlice<'a> {
    type Error = PixelSliceError;

    fn try_from(pixels: &'a [Srgba<u8>]) -> Result<Self, Self::Error> {
        if pixels.len() <= MAX_PIXELS as usize {
            Ok(Self(pixels))
        } else {
            Err(PixelSliceError::AboveMaxLen)
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for PixelSlice<'a> {
    type Error = PixelSliceError;

    fn try_from(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        if bytes.len() % 4 != 0 {
            return Err(PixelSliceError::InvalidPixelFormat(bytes.len()));
        }
        let pixels = bytes.len() / 4;
        if pixels > MAX_PIXELS as usize {
            return Err(PixelSliceError::AboveMaxLen);
        }
        let buf: &[Srgba<u8>] = bytes.components_as();
        Ok(Self(buf))
    }
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a RgbaImage> for PixelSlice<'a> {
    type Error = PixelSliceError;

    fn try_from(image: &'a RgbaImage) -> Result<Self, Self::Error> {
        let pixels = image.pixels().len();
        if pixels <= MAX_PIXELS as usize {
            let buf = &image.as_raw()[..(pixels * 4)];
            Ok(Self(buf.components_as()))
        } else {
            Err(PixelSliceError::AboveMaxLen)
        }
    }
}

/// Controls how pixel alpha participates in quantization.
///
/// Pixels with `alpha <= threshold` are treated as fully transparent and do
/// not contribute to the palette at all. Any remaining pixel with
/// `alpha < 255` has its alpha biased upward to
/// `min(255, alpha + alpha % fader)` before bucketing, which pulls
/// near-opaque translucency gradations together instead of spending palette
/// entries on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaPolicy {
    /// Pixels with alpha at or below this value are excluded (default `10`).
    pub threshold: u8,
    /// Divisor for the upward alpha bias (default `70`).
    pub fader: NonZeroU8,
}

impl Default for AlphaPolicy {
    fn default() -> Self {
        Self {
            threshold: 10,
            fader: NonZeroU8::new(70).unwrap_or(NonZeroU8::MIN),
        }
    }
}

impl AlphaPolicy {
    /// Returns the adjusted alpha for a pixel, or `None` if the pixel is
    /// excluded from quantization.
    #[inline]
    #[must_use]
    pub fn effective_alpha(self, alpha: u8) -> Option<u8> {
        if alpha <= self.threshold {
            None
        } else if alpha < u8::MAX {
            let faded = u16::from(alpha) + u16::from(alpha % self.fader.get());
            #[allow(clippy::cast_possible_truncation)]
            Some(faded.min(u16::from(u8::MAX)) as u8)
        } else {
            Some(alpha)
        }
    }
}

/// The (maximum) number of colors to include in a palette.
///
/// A newtype wrapper around `u16` with the invariant that it must be less
/// than or equal to [`MAX_COLORS`]. A [`PaletteSize`] of `0` makes the
/// quantization functions return an empty [`QuantizeOutput`]; sizes of `2`
/// and up are the meaningful domain.
///
/// # Examples
/// ```
/// # use wuquant::{PaletteSize, AboveMaxColors};
/// # fn main() -> Result<(), AboveMaxColors> {
/// let size = PaletteSize::from(16u8);
/// let size: PaletteSize = 128u16.try_into()?;
/// let size = PaletteSize::from_clamped(1024);
/// assert_eq!(size, PaletteSize::MAX);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PaletteSize(u16);

impl PaletteSize {
    /// The maximum supported palette size (given by [`MAX_COLORS`]).
    pub const MAX: Self = Self(MAX_COLORS);

    /// Gets the inner `u16` value.
    #[must_use]
    pub const fn into_inner(self) -> u16 {
        self.0
    }

    /// Creates a [`PaletteSize`] by clamping the given value to [`MAX_COLORS`].
    #[must_use]
    pub const fn from_clamped(value: u16) -> Self {
        if value <= MAX_COLORS {
            Self(value)
        } else {
            Self(MAX_COLORS)
        }
    }
}

impl Default for PaletteSize {
    fn default() -> Self {
        Self::MAX
    }
}

impl From<PaletteSize> for u16 {
    fn from(val: PaletteSize) -> Self {
        val.into_inner()
    }
}

impl From<u8> for PaletteSize {
    fn from(value: u8) -> Self {
        Self(value.into())
    }
}

impl TryFrom<u16> for PaletteSize {
    type Error = AboveMaxColors;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value <= MAX_COLORS {
            Ok(PaletteSize(value))
        } else {
            Err(AboveMaxColors(value))
        }
    }
}

impl Display for PaletteSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_inner())
    }
}

/// The output struct returned by the quantization functions.
///
/// `counts` and `cubes` run parallel to `palette`: `counts[i]` is the number
/// of pixels assigned to `palette[i]`, and `cubes[i]` is the histogram
/// region it was derived from. `indices` holds one palette index per input
/// pixel, but only for the `indexed_*` functions; it is empty otherwise.
///
/// When the input contained pixels excluded by the [`AlphaPolicy`] threshold,
/// the `indexed_*` functions append one fully transparent entry at the end of
/// `palette` (with an empty cube) and map the excluded pixels to it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizeOutput {
    /// The computed color palette.
    ///
    /// The colors in the palette are not guaranteed to be unique.
    pub palette: Vec<Srgba<u8>>,
    /// The number of pixels assigned to each color in `palette`.
    pub counts: Vec<u32>,
    /// The histogram region each palette entry was derived from.
    pub cubes: Vec<Cube>,
    /// The remapped image, where each pixel is replaced by an index into `palette`.
    ///
    /// This will be empty if the quantization function does not compute indices.
    pub indices: Vec<u8>,
}

impl Default for QuantizeOutput {
    fn default() -> Self {
        Self {
            palette: Vec::new(),
            counts: Vec::new(),
            cubes: Vec::new(),
            indices: Vec::new(),
        }
    }
}

/// Packs a pixel into its canonical 32-bit ARGB form,
/// with alpha in the highest byte, then red, green, and blue.
#[inline]
#[must_use]
pub fn pack_argb(pixel: Srgba<u8>) -> u32 {
    u32::from_be_bytes([
        pixel.alpha,
        pixel.color.red,
        pixel.color.green,
        pixel.color.blue,
    ])
}

/// Unpacks a 32-bit ARGB value into its four channels.
#[inline]
#[must_use]
pub fn unpack_argb(packed: u32) -> Srgba<u8> {
    let [alpha, red, green, blue] = packed.to_be_bytes();
    Srgba::new(red, green, blue, alpha)
}
