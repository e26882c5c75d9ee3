//! Wu's color quantizer (greedy orthogonal bipartitioning) over four dimensions.
//!
//! The histogram box with the greatest variance is recursively split along the
//! axis and bin giving the best separation of the resulting halves, until the
//! requested number of boxes is reached or no box can be usefully cut. Alpha
//! is a full histogram axis here, so translucent regions of an image compete
//! for palette entries just like hue regions do, subject to the exclusion and
//! fading rules of [`AlphaPolicy`].
//!
//! Each channel is bucketed into 32 bins (`(value >> 3) + 1`); bin 0 of every
//! axis is a zero sentinel row so that cumulative moments need no boundary
//! special cases.

// Relevant paper (free access):
// Xiaolin Wu, Color quantization by dynamic programming and principal analysis,
// ACM Transactions on Graphics, vol. 11, no. 4, 348-372, 1992.
// https://doi.org/10.1145/146443.146475

use crate::{
    AlphaPolicy, PaletteSize, PixelSlice, QuantizeOutput, ZeroedIsZero, MAX_COLORS,
};
use num_traits::Zero;
use ordered_float::OrderedFloat;
use palette::Srgba;
use std::{
    array,
    collections::BinaryHeap,
    ops::{Add, AddAssign, Index, IndexMut, Sub},
};
#[cfg(feature = "threads")]
use rayon::prelude::*;

/// The number of histogram axes: alpha, red, green, blue.
const N: usize = 4;

/// The number of populated bins per axis.
const BINS: u8 = 32;

/// The side length of the histogram grid, including the zero sentinel at index 0.
const SIDE: usize = BINS as usize + 1;

/// Returns the histogram bin for a channel value.
#[inline]
fn bin(component: u8) -> u8 {
    (component >> 3) + 1
}

/// Returns the histogram bin coordinates (alpha, red, green, blue) for a
/// pixel under the given policy, or `None` if the pixel is excluded as fully
/// transparent.
///
/// Callers classifying pixels against [`Cube`]s themselves must use this
/// exact mapping, or their assignment will be inconsistent with the palette.
#[inline]
#[must_use]
pub fn pixel_bins(pixel: Srgba<u8>, policy: AlphaPolicy) -> Option<[u8; N]> {
    let alpha = policy.effective_alpha(pixel.alpha)?;
    Some([alpha, pixel.color.red, pixel.color.green, pixel.color.blue].map(bin))
}

/// An axis-aligned region of histogram bins in (alpha, red, green, blue) order.
///
/// A cube covers the bins `(min[c], max[c]]` on each axis. The sentinel bin 0
/// never holds data, so a cube with `min` of 0 and `max` of 32 on every axis
/// spans the entire populated histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cube {
    /// The lower bin indices (exclusive).
    pub min: [u8; N],
    /// The upper bin indices (inclusive).
    pub max: [u8; N],
}

/// The cube spanning the entire populated histogram.
const FULL: Cube = Cube { min: [0; N], max: [BINS; N] };

impl Cube {
    /// The number of bins covered, as the product of the four axis spans.
    #[must_use]
    pub fn size(self) -> u32 {
        let Self { min, max } = self;
        (0..N).map(|c| u32::from(max[c] - min[c])).product()
    }

    /// Whether the given bin coordinates fall inside this cube.
    #[must_use]
    pub fn contains(self, bins: [u8; N]) -> bool {
        let Self { min, max } = self;
        (0..N).all(|c| min[c] < bins[c] && bins[c] <= max[c])
    }
}

/// Accumulated statistics for a set of pixels: the pixel count, the
/// per-channel sums in (alpha, red, green, blue) order, and the sum of
/// squared channel magnitudes.
///
/// All fields are linear in the contributing pixel set, so moments are closed
/// under addition and subtraction; subtracting a sub-region's moment from its
/// enclosing region's yields the moment of the complement.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Moment {
    /// The number of pixels accumulated.
    count: u32,
    /// The component-wise sums of the accumulated pixels.
    components: [u64; N],
    /// The sum of the squared components of the accumulated pixels.
    sum_squared: f64,
}

#[allow(unsafe_code)] // all fields are zero when all-zeros
unsafe impl ZeroedIsZero for Moment {}

impl Add for Moment {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            count: self.count + rhs.count,
            components: array::from_fn(|i| self.components[i] + rhs.components[i]),
            sum_squared: self.sum_squared + rhs.sum_squared,
        }
    }
}

impl Sub for Moment {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            count: self.count - rhs.count,
            components: array::from_fn(|i| self.components[i] - rhs.components[i]),
            sum_squared: self.sum_squared - rhs.sum_squared,
        }
    }
}

impl AddAssign for Moment {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.count += rhs.count;
        for i in 0..N {
            self.components[i] += rhs.components[i];
        }
        self.sum_squared += rhs.sum_squared;
    }
}

impl Zero for Moment {
    fn zero() -> Self {
        Self {
            count: 0,
            components: [0; N],
            sum_squared: 0.0,
        }
    }

    fn is_zero(&self) -> bool {
        self.count == 0 && self.sum_squared == 0.0 && self.components.iter().all(|&c| c == 0)
    }
}

impl Moment {
    /// Returns the sum of the squares of the channel sums.
    #[inline]
    fn squared_components(self) -> f64 {
        let mut square = 0.0;
        for c in self.components {
            #[allow(clippy::cast_precision_loss)]
            let c = c as f64;
            square += c * c;
        }
        square
    }

    /// The weight-scaled squared distance from the mean color, used to score
    /// candidate cut positions. Defined only for a non-zero count.
    fn weighted_distance(self) -> f64 {
        let count = f64::from(self.count);
        (self.sum_squared * count - self.squared_components()) / count
    }

    /// The total squared deviation from the mean color, used to rank cubes
    /// for splitting. Defined only for a non-zero count.
    fn variance(self) -> f64 {
        self.sum_squared - self.squared_components() / f64::from(self.count)
    }
}

/// A newtype wrapper around a 4-dimensional array with a sentinel layer per axis.
#[repr(transparent)]
#[derive(Clone, Copy)]
struct Grid<T>([[[[T; SIDE]; SIDE]; SIDE]; SIDE]);

#[allow(unsafe_code)] // Grid is repr(transparent) and the inner array is bounded
unsafe impl<T> ZeroedIsZero for Grid<T>
where
    T: Copy,
    [[[[T; SIDE]; SIDE]; SIDE]; SIDE]: ZeroedIsZero,
{
}

impl<T> Index<[usize; N]> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: [usize; N]) -> &Self::Output {
        &self.0[index[0]][index[1]][index[2]][index[3]]
    }
}

impl<T> IndexMut<[usize; N]> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, index: [usize; N]) -> &mut Self::Output {
        &mut self.0[index[0]][index[1]][index[2]][index[3]]
    }
}

impl<T> Index<[u8; N]> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: [u8; N]) -> &Self::Output {
        &self[index.map(usize::from)]
    }
}

impl<T> IndexMut<[u8; N]> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, index: [u8; N]) -> &mut Self::Output {
        &mut self[index.map(usize::from)]
    }
}

/// This macro generates the nested-difference evaluation of a cumulative
/// volume query for a fixed sequence of axes.
///
/// Because bin 0 is an all-zero sentinel, the lower bound of every axis can
/// be indexed directly, and each intermediate difference is itself the moment
/// of a partially restricted region, so the unsigned fields never underflow.
macro_rules! ndvolume {
    ($self:ident, $min:ident, $max:ident, $index:ident; $n:literal $(, $ns:literal)* $(,)?) => {{
        $index[$n] = $max[$n];
        let upper = ndvolume!($self, $min, $max, $index; $($ns,)*);

        $index[$n] = $min[$n];
        let lower = ndvolume!($self, $min, $max, $index; $($ns,)*);

        upper - lower
    }};
    ($self:ident, $min:ident, $max:ident, $index:ident;) => {
        $self[$index]
    };
}

impl Grid<Moment> {
    /// Returns the total moment of the given cube via 16-term inclusion-exclusion.
    fn volume(&self, Cube { min, max }: Cube) -> Moment {
        let mut index = [0u8; N];
        ndvolume!(self, min, max, index; 0, 1, 2, 3)
    }

    /// Returns the moment of the cube with one axis prefix-limited to `bin`
    /// instead of its own upper bound.
    fn volume_at(&self, Cube { min, max }: Cube, dim: u8, bin: u8) -> Moment {
        let mut index = [0u8; N];
        match dim {
            0 => {
                index[0] = bin;
                ndvolume!(self, min, max, index; 1, 2, 3)
            }
            1 => {
                index[1] = bin;
                ndvolume!(self, min, max, index; 0, 2, 3)
            }
            2 => {
                index[2] = bin;
                ndvolume!(self, min, max, index; 0, 1, 3)
            }
            3 => {
                index[3] = bin;
                ndvolume!(self, min, max, index; 0, 1, 2)
            }
            _ => unreachable!("dim < {N}"),
        }
    }
}

/// A reusable 4-dimensional moment histogram.
///
/// The grid is large (33⁴ cells), so callers running many quantizations can
/// allocate one [`Histogram`] up front and pass it to the `*_with` functions,
/// resetting it between calls with [`Histogram::clear`]. A histogram must not
/// be shared between two in-flight quantizations.
pub struct Histogram {
    /// The moment cells; bins 1..=32 per axis plus the zero sentinel at 0.
    grid: Box<Grid<Moment>>,
}

impl Histogram {
    /// Creates a zeroed histogram.
    #[must_use]
    pub fn new() -> Self {
        Self {
            grid: ZeroedIsZero::box_zeroed(),
        }
    }

    /// Resets every cell to zero, making the histogram ready for reuse.
    pub fn clear(&mut self) {
        self.grid.fill_zero();
    }

    /// Accumulates one pixel, applying the alpha policy.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    fn add_pixel(&mut self, pixel: Srgba<u8>, policy: AlphaPolicy) {
        let Some(alpha) = policy.effective_alpha(pixel.alpha) else {
            return;
        };
        let argb = [alpha, pixel.color.red, pixel.color.green, pixel.color.blue];

        let Moment { count, components, sum_squared } = &mut self.grid[argb.map(bin)];

        *count += 1;
        let mut square = 0u32;
        for (sum, c) in components.iter_mut().zip(argb) {
            *sum += u64::from(c);
            square += u32::from(c) * u32::from(c);
        }
        *sum_squared += f64::from(square);
    }

    /// Accumulates the given pixels.
    fn add_pixels(&mut self, pixels: &[Srgba<u8>], policy: AlphaPolicy) {
        for &pixel in pixels {
            self.add_pixel(pixel, policy);
        }
    }

    /// Transforms the raw per-bin moments into cumulative moments in place,
    /// so that `grid[[a, r, g, b]]` holds the total over bins
    /// `[1, a] x [1, r] x [1, g] x [1, b]`.
    ///
    /// Three running accumulators (a line over blue, an area per blue over
    /// green, and a persistent (green, blue) table over red) plus the already
    /// integrated `a - 1` layer keep the whole pass O(33⁴).
    fn integrate(&mut self) {
        let grid = &mut self.grid;

        for a in 1..SIDE {
            let mut rgb_area = [[Moment::zero(); SIDE]; SIDE];

            for r in 1..SIDE {
                let mut gb_area = [Moment::zero(); SIDE];

                for g in 1..SIDE {
                    let mut line = Moment::zero();

                    for b in 1..SIDE {
                        line += grid[[a, r, g, b]];
                        gb_area[b] += line;
                        rgb_area[g][b] += gb_area[b];
                        grid[[a, r, g, b]] = grid[[a - 1, r, g, b]] + rgb_area[g][b];
                    }
                }
            }
        }
    }

    /// Element-wise sums another (raw, un-integrated) histogram into this one.
    #[cfg(feature = "threads")]
    fn merge(&mut self, other: &Self) {
        for a in 1..SIDE {
            for r in 1..SIDE {
                for g in 1..SIDE {
                    for b in 1..SIDE {
                        self.grid[[a, r, g, b]] += other.grid[[a, r, g, b]];
                    }
                }
            }
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled state for one quantization run: the input pixels, the alpha
/// policy, and the integrated histogram.
struct Wu4<'a, 'h> {
    /// The input pixels.
    pixels: PixelSlice<'a>,
    /// The alpha exclusion and fading rules in effect.
    policy: AlphaPolicy,
    /// The integrated histogram; read-only from here on.
    hist: &'h Histogram,
}

impl<'a, 'h> Wu4<'a, 'h> {
    /// Builds and integrates the histogram from the given pixels.
    ///
    /// The histogram must be zeroed on entry.
    fn new(pixels: PixelSlice<'a>, policy: AlphaPolicy, hist: &'h mut Histogram) -> Self {
        hist.add_pixels(&pixels, policy);
        hist.integrate();
        Self { pixels, policy, hist }
    }

    /// Like [`Wu4::new`], but accumulates pixel chunks in parallel and merges
    /// the partial histograms before the (inherently sequential) integration.
    #[cfg(feature = "threads")]
    fn new_par(pixels: PixelSlice<'a>, policy: AlphaPolicy, hist: &'h mut Histogram) -> Self {
        let chunk_size = pixels.len().div_ceil(rayon::current_num_threads()).max(1);

        let partial = pixels
            .as_ref()
            .par_chunks(chunk_size)
            .map(|chunk| {
                let mut partial = Histogram::new();
                partial.add_pixels(chunk, policy);
                partial
            })
            .reduce_with(|mut acc, other| {
                acc.merge(&other);
                acc
            });

        if let Some(partial) = partial {
            hist.merge(&partial);
        }
        hist.integrate();

        Self { pixels, policy, hist }
    }

    /// The moment over the entire histogram.
    fn total(&self) -> Moment {
        self.hist.grid.volume(FULL)
    }

    /// Computes the variance score of the given cube; trivially small cubes
    /// score zero.
    fn variance(&self, cube: Cube) -> f64 {
        if cube.size() > 1 {
            let moment = self.hist.grid.volume(cube);
            if moment.count == 0 {
                0.0
            } else {
                moment.variance()
            }
        } else {
            0.0
        }
    }

    /// Finds the best cut position along `dim`, scanning every position
    /// strictly inside the cube's bounds on that axis. The moment below the
    /// cube's lower face is fixed and combined with a per-position prefix;
    /// positions leaving either half empty are skipped.
    ///
    /// Scores are negated so that `min_by_key` picks the greatest score and,
    /// on ties, the first position reaching it.
    fn maximize(&self, cube: Cube, dim: u8, whole: Moment) -> Option<(u8, f64)> {
        let d = usize::from(dim);
        let bottom = self.hist.grid.volume_at(cube, dim, cube.min[d]);

        ((cube.min[d] + 1)..cube.max[d])
            .filter_map(|bin| {
                let lower = self.hist.grid.volume_at(cube, dim, bin) - bottom;
                let upper = whole - lower;
                if lower.count == 0 || upper.count == 0 {
                    None
                } else {
                    Some((
                        bin,
                        -(lower.weighted_distance() + upper.weighted_distance()),
                    ))
                }
            })
            .min_by_key(|&(_, v)| OrderedFloat(v))
    }

    /// Attempts to split the cube, truncating it to the lower half and
    /// returning the upper half. The axis with the greatest maximized score
    /// wins; ties resolve in fixed alpha, red, green, blue priority. Returns
    /// `None` when no axis has a valid cut position.
    fn cut(&self, cube: &mut Cube) -> Option<Cube> {
        let whole = self.hist.grid.volume(*cube);

        #[allow(clippy::cast_possible_truncation)]
        let best = (0..(N as u8))
            .filter_map(|dim| {
                self.maximize(*cube, dim, whole)
                    .map(|(bin, v)| ((usize::from(dim), bin), v))
            })
            .min_by_key(|&(_, v)| OrderedFloat(v));

        if let Some(((dim, bin), _)) = best {
            let mut upper = *cube;
            cube.max[dim] = bin;
            upper.min[dim] = bin;
            Some(upper)
        } else {
            None
        }
    }

    /// Runs the variance-driven splitting loop and returns the resulting
    /// disjoint cubes, at most `k` of them.
    fn cubes(&self, k: PaletteSize) -> Vec<Cube> {
        /// A cube and its recorded variance score.
        struct CubeVar(Cube, f64);

        impl PartialOrd for CubeVar {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for CubeVar {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                OrderedFloat(self.1).cmp(&OrderedFloat(other.1))
            }
        }

        impl Eq for CubeVar {}

        impl PartialEq for CubeVar {
            fn eq(&self, other: &Self) -> bool {
                self.1 == other.1
            }
        }

        let mut k = usize::from(k.into_inner());

        let mut queue = BinaryHeap::with_capacity(k);
        queue.push(CubeVar(FULL, f64::INFINITY));

        while queue.len() < k {
            // there is always at least one cube, since every pop pushes one back
            #[allow(clippy::expect_used)]
            let CubeVar(mut lower, variance) = queue.pop().expect("at least one cube");

            if variance <= 0.0 {
                // no remaining cube can be cut further
                queue.push(CubeVar(lower, 0.0));
                break;
            }

            if let Some(upper) = self.cut(&mut lower) {
                queue.push(CubeVar(lower, self.variance(lower)));
                queue.push(CubeVar(upper, self.variance(upper)));
            } else {
                // an uncuttable cube is frozen at score zero
                // and the target count shrinks by one
                queue.push(CubeVar(lower, 0.0));
                k -= 1;
            }
        }

        queue.into_iter().map(|x| x.0).collect()
    }

    /// Returns the mean color of the cube and the number of pixels in it.
    ///
    /// A cube that ends up with zero weight yields an unused transparent
    /// entry with a count of zero.
    fn cube_color_and_count(&self, cube: Cube) -> (Srgba<u8>, u32) {
        let Moment { count, components, .. } = self.hist.grid.volume(cube);
        if count == 0 {
            return (Srgba::new(0, 0, 0, 0), 0);
        }

        let n = u64::from(count);
        #[allow(clippy::cast_possible_truncation)]
        let [alpha, red, green, blue] = components.map(|c| (c / n) as u8);
        (Srgba::new(red, green, blue, alpha), count)
    }

    /// Computes the color palette.
    fn palette(&self, k: PaletteSize) -> QuantizeOutput {
        if self.total().count == 0 {
            return QuantizeOutput::default();
        }

        let cubes = self.cubes(k);
        let (palette, counts) = cubes
            .iter()
            .map(|&cube| self.cube_color_and_count(cube))
            .unzip();

        QuantizeOutput { palette, counts, cubes, indices: Vec::new() }
    }

    /// Computes the color palette along with a bin-space table mapping every
    /// histogram cell to its palette index.
    fn palette_and_lookup(&self, k: PaletteSize) -> (QuantizeOutput, Box<Grid<u8>>) {
        let mut lookup: Box<Grid<u8>> = ZeroedIsZero::box_zeroed();

        let cubes = self.cubes(k);
        let (palette, counts) = cubes
            .iter()
            .enumerate()
            .map(|(i, &cube)| {
                #[allow(clippy::cast_possible_truncation)]
                let i = i as u8;
                let Cube { min, max } = cube;
                for a in (min[0] + 1)..=max[0] {
                    for r in (min[1] + 1)..=max[1] {
                        for g in (min[2] + 1)..=max[2] {
                            for b in (min[3] + 1)..=max[3] {
                                lookup[[a, r, g, b]] = i;
                            }
                        }
                    }
                }

                self.cube_color_and_count(cube)
            })
            .unzip();

        let output = QuantizeOutput { palette, counts, cubes, indices: Vec::new() };
        (output, lookup)
    }

    /// Returns the number of pixels excluded as fully transparent and the
    /// effective palette size, reduced to leave room for the transparent slot
    /// when one is needed.
    fn transparent_and_target(&self, k: PaletteSize) -> (u32, PaletteSize) {
        let transparent = self.pixels.num_pixels() - self.total().count;
        let k = if transparent > 0 {
            PaletteSize::from_clamped(k.into_inner().min(MAX_COLORS - 1))
        } else {
            k
        };
        (transparent, k)
    }

    /// Builds the palette and lookup table, appending the transparent slot
    /// when any pixel was excluded. Also returns the index excluded pixels
    /// map to.
    fn indexed_parts(&self, k: PaletteSize) -> (QuantizeOutput, Box<Grid<u8>>, u8) {
        let (transparent, k) = self.transparent_and_target(k);

        let (mut output, lookup) = if self.total().count == 0 {
            (QuantizeOutput::default(), ZeroedIsZero::box_zeroed())
        } else {
            self.palette_and_lookup(k)
        };

        #[allow(clippy::cast_possible_truncation)]
        let transparent_index = output.palette.len() as u8;

        if transparent > 0 {
            output.palette.push(Srgba::new(0, 0, 0, 0));
            output.counts.push(transparent);
            output.cubes.push(Cube::default());
        }

        (output, lookup, transparent_index)
    }

    /// Computes the color palette and an index into it for every pixel.
    fn indexed_palette(&self, k: PaletteSize) -> QuantizeOutput {
        let (mut output, lookup, transparent_index) = self.indexed_parts(k);

        let policy = self.policy;
        output.indices = self
            .pixels
            .iter()
            .map(|&pixel| match pixel_bins(pixel, policy) {
                Some(bins) => lookup[bins],
                None => transparent_index,
            })
            .collect();

        output
    }

    /// Computes the color palette and indices into it in parallel.
    #[cfg(feature = "threads")]
    fn indexed_palette_par(&self, k: PaletteSize) -> QuantizeOutput {
        let (mut output, lookup, transparent_index) = self.indexed_parts(k);

        let policy = self.policy;
        output.indices = self
            .pixels
            .as_ref()
            .par_iter()
            .map(|&pixel| match pixel_bins(pixel, policy) {
                Some(bins) => lookup[bins],
                None => transparent_index,
            })
            .collect();

        output
    }
}

/// Computes a color palette of at most `k` entries for the given pixels.
///
/// Pixels excluded by the [`AlphaPolicy`] threshold do not influence the
/// palette; the output's `counts` therefore sum to the number of retained
/// pixels. The output may hold fewer than `k` entries when the image does not
/// have `k` distinguishable colors. The meaningful domain of `k` is 2..=256;
/// a `k` of 0 yields an empty output.
#[must_use]
pub fn palette(pixels: PixelSlice<'_>, k: PaletteSize, policy: AlphaPolicy) -> QuantizeOutput {
    let mut hist = Histogram::new();
    palette_with(pixels, k, policy, &mut hist)
}

/// Like [`palette`], but reuses a caller-owned [`Histogram`] to avoid
/// reallocating the grid across calls.
///
/// The histogram must be freshly created or [`Histogram::clear`]ed.
#[must_use]
pub fn palette_with(
    pixels: PixelSlice<'_>,
    k: PaletteSize,
    policy: AlphaPolicy,
    hist: &mut Histogram,
) -> QuantizeOutput {
    if k.into_inner() == 0 || pixels.is_empty() {
        QuantizeOutput::default()
    } else {
        Wu4::new(pixels, policy, hist).palette(k)
    }
}

/// Computes a color palette for the given pixels and maps every pixel to its
/// palette index.
///
/// When any pixel is excluded by the [`AlphaPolicy`] threshold, a fully
/// transparent entry is appended to the palette (capping the quantized
/// entries at 255 so that every index fits in a `u8`) and the excluded pixels
/// are mapped to it.
#[must_use]
pub fn indexed_palette(
    pixels: PixelSlice<'_>,
    k: PaletteSize,
    policy: AlphaPolicy,
) -> QuantizeOutput {
    let mut hist = Histogram::new();
    indexed_palette_with(pixels, k, policy, &mut hist)
}

/// Like [`indexed_palette`], but reuses a caller-owned [`Histogram`].
///
/// The histogram must be freshly created or [`Histogram::clear`]ed.
#[must_use]
pub fn indexed_palette_with(
    pixels: PixelSlice<'_>,
    k: PaletteSize,
    policy: AlphaPolicy,
    hist: &mut Histogram,
) -> QuantizeOutput {
    if k.into_inner() == 0 || pixels.is_empty() {
        QuantizeOutput::default()
    } else {
        Wu4::new(pixels, policy, hist).indexed_palette(k)
    }
}

/// Computes a color palette in parallel. See [`palette`].
#[cfg(feature = "threads")]
#[must_use]
pub fn palette_par(pixels: PixelSlice<'_>, k: PaletteSize, policy: AlphaPolicy) -> QuantizeOutput {
    if k.into_inner() == 0 || pixels.is_empty() {
        QuantizeOutput::default()
    } else {
        let mut hist = Histogram::new();
        Wu4::new_par(pixels, policy, &mut hist).palette(k)
    }
}

/// Computes a color palette and per-pixel indices in parallel.
/// See [`indexed_palette`].
#[cfg(feature = "threads")]
#[must_use]
pub fn indexed_palette_par(
    pixels: PixelSlice<'_>,
    k: PaletteSize,
    policy: AlphaPolicy,
) -> QuantizeOutput {
    if k.into_inner() == 0 || pixels.is_empty() {
        QuantizeOutput::default()
    } else {
        let mut hist = Histogram::new();
        Wu4::new_par(pixels, policy, &mut hist).indexed_palette_par(k)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{pack_argb, tests::*};
    use rand::{seq::SliceRandom, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;

    fn opaque(red: u8, green: u8, blue: u8) -> Srgba<u8> {
        Srgba::new(red, green, blue, 255)
    }

    fn sorted_by_packed(mut palette: Vec<Srgba<u8>>) -> Vec<Srgba<u8>> {
        palette.sort_by_key(|&color| pack_argb(color));
        palette
    }

    fn assert_indices_count(output: &QuantizeOutput) {
        let mut counts = vec![0; output.palette.len()];
        for &i in &output.indices {
            counts[usize::from(i)] += 1;
        }
        assert_eq!(counts, output.counts);
    }

    #[test]
    fn empty_input() {
        let expected = QuantizeOutput::default();

        let pixels = PixelSlice::new_unchecked(&[]);
        let k = PaletteSize::MAX;
        let policy = AlphaPolicy::default();

        assert_eq!(palette(pixels, k, policy), expected);
        assert_eq!(indexed_palette(pixels, k, policy), expected);

        #[cfg(feature = "threads")]
        {
            assert_eq!(palette_par(pixels, k, policy), expected);
            assert_eq!(indexed_palette_par(pixels, k, policy), expected);
        }
    }

    #[test]
    fn zero_palette_size() {
        let pixels = test_pixels_1024();
        let pixels = PixelSlice::try_from(pixels.as_slice()).unwrap();

        let output = palette(pixels, PaletteSize::from_clamped(0), AlphaPolicy::default());
        assert_eq!(output, QuantizeOutput::default());
    }

    #[test]
    fn single_color_image() {
        let color = opaque(12, 200, 78);
        let pixels = vec![color; 100 * 100];
        let pixels = PixelSlice::try_from(pixels.as_slice()).unwrap();

        let output = palette(pixels, PaletteSize::MAX, AlphaPolicy::default());
        assert_eq!(output.palette, vec![color]);
        assert_eq!(output.counts, vec![100 * 100]);
        assert_eq!(output.cubes.len(), 1);

        let output = indexed_palette(pixels, PaletteSize::MAX, AlphaPolicy::default());
        assert_eq!(output.palette, vec![color]);
        assert!(output.indices.iter().all(|&i| i == 0));
        assert_indices_count(&output);
    }

    #[test]
    fn four_distinct_colors_recovered_exactly() {
        let colors = [
            opaque(255, 0, 0),
            opaque(0, 255, 0),
            opaque(0, 0, 255),
            opaque(255, 255, 0),
        ];
        let pixels = PixelSlice::new_unchecked(&colors);

        let output = palette(pixels, PaletteSize::from(4u8), AlphaPolicy::default());
        assert_eq!(
            sorted_by_packed(output.palette),
            sorted_by_packed(colors.to_vec())
        );
        assert_eq!(output.counts, vec![1; 4]);
    }

    #[test]
    fn splitting_stalls_at_color_diversity() {
        let colors = distinct_bucket_colors(64);
        let pixels = PixelSlice::try_from(colors.as_slice()).unwrap();

        let output = palette(pixels, PaletteSize::MAX, AlphaPolicy::default());
        assert_eq!(output.palette.len(), 64);
        assert_eq!(
            sorted_by_packed(output.palette),
            sorted_by_packed(colors.clone())
        );
        assert_eq!(output.counts.iter().sum::<u32>(), 64);
    }

    #[test]
    fn fully_transparent_input() {
        let pixels = vec![Srgba::new(90, 90, 90, 5); 50];
        let pixels = PixelSlice::try_from(pixels.as_slice()).unwrap();
        let policy = AlphaPolicy::default();

        let output = palette(pixels, PaletteSize::MAX, policy);
        assert_eq!(output, QuantizeOutput::default());

        let output = indexed_palette(pixels, PaletteSize::MAX, policy);
        assert_eq!(output.palette, vec![Srgba::new(0, 0, 0, 0)]);
        assert_eq!(output.counts, vec![50]);
        assert!(output.indices.iter().all(|&i| i == 0));
    }

    #[test]
    fn weight_conservation_excludes_transparent_pixels() {
        let mut pixels = test_pixels_1024();
        pixels.extend(std::iter::repeat(Srgba::new(1, 2, 3, 0)).take(100));
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(42);
        pixels.shuffle(&mut rng);
        let pixels = PixelSlice::try_from(pixels.as_slice()).unwrap();

        let output = palette(pixels, PaletteSize::MAX, AlphaPolicy::default());
        assert_eq!(output.counts.iter().sum::<u32>(), 1024);

        let output = indexed_palette(pixels, PaletteSize::MAX, AlphaPolicy::default());
        // the transparent slot accounts for the remaining 100 pixels
        assert_eq!(output.counts.iter().sum::<u32>(), 1124);
        assert_eq!(*output.counts.last().unwrap(), 100);
        assert_indices_count(&output);
    }

    #[test]
    fn scan_order_does_not_change_the_palette() {
        let pixels = test_pixels_1024();
        let mut shuffled = pixels.clone();
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(7);
        shuffled.shuffle(&mut rng);

        let a = palette(
            PixelSlice::try_from(pixels.as_slice()).unwrap(),
            PaletteSize::from(16u8),
            AlphaPolicy::default(),
        );
        let b = palette(
            PixelSlice::try_from(shuffled.as_slice()).unwrap(),
            PaletteSize::from(16u8),
            AlphaPolicy::default(),
        );

        assert_eq!(a.palette, b.palette);
        assert_eq!(a.counts, b.counts);
        assert_eq!(a.cubes, b.cubes);
    }

    #[test]
    fn histogram_reuse_after_clear() {
        let pixels = test_pixels_1024();
        let pixels = PixelSlice::try_from(pixels.as_slice()).unwrap();
        let k = PaletteSize::from(32u8);
        let policy = AlphaPolicy::default();

        let mut hist = Histogram::new();
        let first = palette_with(pixels, k, policy, &mut hist);

        hist.clear();
        let second = palette_with(pixels, k, policy, &mut hist);

        assert_eq!(first, second);
        assert_eq!(first, palette(pixels, k, policy));
    }

    #[test]
    fn volume_matches_direct_sums() {
        let pixels = test_pixels_1024();
        let policy = AlphaPolicy::default();

        let mut hist = Histogram::new();
        hist.add_pixels(&pixels, policy);
        hist.integrate();

        let cube = Cube { min: [0, 7, 0, 15], max: [32, 21, 32, 32] };

        let mut expected = Moment::zero();
        for &pixel in &pixels {
            let Some(alpha) = policy.effective_alpha(pixel.alpha) else {
                continue;
            };
            let argb = [alpha, pixel.color.red, pixel.color.green, pixel.color.blue];
            if cube.contains(argb.map(bin)) {
                let mut single = Moment::zero();
                single.count = 1;
                single.components = argb.map(u64::from);
                single.sum_squared = argb
                    .map(|c| f64::from(u32::from(c) * u32::from(c)))
                    .iter()
                    .sum();
                expected += single;
            }
        }

        let actual = hist.grid.volume(cube);
        assert_eq!(actual.count, expected.count);
        assert_eq!(actual.components, expected.components);
        #[allow(clippy::float_cmp)]
        {
            assert_eq!(actual.sum_squared, expected.sum_squared);
        }
    }

    #[test]
    fn volumes_are_linear_under_splitting() {
        let pixels = test_pixels_1024();
        let mut hist = Histogram::new();
        hist.add_pixels(&pixels, AlphaPolicy::default());
        hist.integrate();

        let mut lower = FULL;
        let mut upper = FULL;
        lower.max[0] = 16;
        upper.min[0] = 16;

        let whole = hist.grid.volume(FULL);
        let parts = hist.grid.volume(lower) + hist.grid.volume(upper);
        assert_eq!(whole.count, parts.count);
        assert_eq!(whole.components, parts.components);

        let complement = whole - hist.grid.volume(lower);
        assert_eq!(complement.count, hist.grid.volume(upper).count);
    }

    #[test]
    fn transparent_slot_caps_total_entries() {
        let mut pixels = distinct_bucket_colors(300);
        pixels.extend(std::iter::repeat(Srgba::new(0, 0, 0, 0)).take(50));
        let pixels = PixelSlice::try_from(pixels.as_slice()).unwrap();

        let output = indexed_palette(pixels, PaletteSize::MAX, AlphaPolicy::default());
        assert_eq!(output.palette.len(), 256);
        assert_eq!(*output.palette.last().unwrap(), Srgba::new(0, 0, 0, 0));
        assert_eq!(*output.counts.last().unwrap(), 50);
        assert_eq!(output.counts.iter().sum::<u32>(), 350);
        assert_indices_count(&output);
    }

    #[test]
    #[cfg(feature = "threads")]
    fn single_and_multi_threaded_match() {
        let pixels = test_pixels_1024();
        let pixels = PixelSlice::try_from(pixels.as_slice()).unwrap();
        let k = PaletteSize::MAX;
        let policy = AlphaPolicy::default();

        let mut hist_single = Histogram::new();
        let mut hist_par = Histogram::new();
        let _ = Wu4::new(pixels, policy, &mut hist_single);
        let _ = Wu4::new_par(pixels, policy, &mut hist_par);

        for (a, b) in hist_single
            .grid
            .0
            .iter()
            .flatten()
            .flatten()
            .flatten()
            .zip(hist_par.grid.0.iter().flatten().flatten().flatten())
        {
            assert_eq!(a.count, b.count);
            assert_eq!(a.components, b.components);
            #[allow(clippy::float_cmp)]
            {
                assert_eq!(a.sum_squared, b.sum_squared);
            }
        }

        let single = palette(pixels, k, policy);
        let par = palette_par(pixels, k, policy);
        assert_eq!(single, par);

        let single = indexed_palette(pixels, k, policy);
        let par = indexed_palette_par(pixels, k, policy);
        assert_eq!(single, par);
        assert_indices_count(&single);
    }

    #[test]
    fn cubes_partition_every_retained_pixel() {
        let pixels = test_pixels_1024();
        let policy = AlphaPolicy::default();
        let output = palette(
            PixelSlice::try_from(pixels.as_slice()).unwrap(),
            PaletteSize::from(16u8),
            policy,
        );

        for &pixel in &pixels {
            if let Some(bins) = pixel_bins(pixel, policy) {
                let containing = output
                    .cubes
                    .iter()
                    .filter(|cube| cube.contains(bins))
                    .count();
                assert_eq!(containing, 1);
            }
        }
    }
}
