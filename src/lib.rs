//! Alpha-aware color quantization and palette generation for RGBA images.
//!
//! `wuquant` reduces an image to a palette of at most 256 colors using Wu's
//! moment-based algorithm (greedy orthogonal bipartitioning) extended to four
//! dimensions, so that alpha takes part in the partitioning alongside red,
//! green, and blue. Semi-transparent pixels are handled by an [`AlphaPolicy`]:
//! pixels at or below a threshold are excluded from the palette entirely,
//! while the remaining translucent pixels have their alpha biased upward to
//! avoid wasting palette entries on near-opaque gradations.
//!
//! # Features
//! - `threads`: exposes parallel versions of the quantization functions via [`rayon`].
//! - `image`: enables integration with the [`image`] crate.
//!
//! # Example
//! ```
//! use wuquant::{wu, AlphaPolicy, PaletteSize, PixelSlice};
//! use palette::Srgba;
//!
//! let pixels = vec![Srgba::new(255u8, 0, 0, 255); 64];
//! let pixels = PixelSlice::try_from(pixels.as_slice())?;
//!
//! let result = wu::palette(pixels, PaletteSize::default(), AlphaPolicy::default());
//! assert_eq!(result.palette, vec![Srgba::new(255, 0, 0, 255)]);
//! # Ok::<_, wuquant::PixelSliceError>(())
//! ```
//!
//! To also map every pixel to its palette index, use [`wu::indexed_palette`]
//! (or [`wu::indexed_palette_par`] with the `threads` feature).

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    clippy::missing_docs_in_private_items,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::unreadable_literal
)]

mod traits;
mod types;

pub mod wu;

pub use traits::*;
pub use types::*;

/// The maximum supported image size in number of pixels is `u32::MAX`.
pub const MAX_PIXELS: u32 = u32::MAX;

/// The maximum supported number of palette colors is `256`.
pub const MAX_COLORS: u16 = u8::MAX as u16 + 1;
