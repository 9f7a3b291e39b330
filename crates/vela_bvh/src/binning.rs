//! Binned SAH split search shared by the SAH and SBVH builders.

use vela_core::BuildSettings;
use vela_math::{Aabb, Vec3};

/// Relative tolerance under which two split costs count as equal.
const COST_TIE_TOLERANCE: f32 = 1e-6;

/// SAH cost of splitting a node of area `parent_area` into the given halves.
///
/// Degenerate (zero-area) parents fall back to counting every primitive,
/// which never beats the leaf alternative.
pub(crate) fn split_cost(
    settings: &BuildSettings,
    parent_area: f32,
    left_count: usize,
    left_area: f32,
    right_count: usize,
    right_area: f32,
) -> f32 {
    let weighted = if parent_area > 0.0 && parent_area.is_finite() {
        (left_count as f32 * left_area + right_count as f32 * right_area) / parent_area
    } else {
        (left_count + right_count) as f32
    };

    settings.traversal_cost + settings.leaf_cost * weighted
}

/// Cost of keeping `count` primitives in a single leaf.
#[inline]
pub(crate) fn leaf_cost(settings: &BuildSettings, count: usize) -> f32 {
    settings.leaf_cost * count as f32
}

/// Axes ordered by decreasing extent, so the first of several equally good
/// candidates is the one on the longest axis.
pub(crate) fn axes_by_extent(extent: Vec3) -> [usize; 3] {
    let mut axes = [0, 1, 2];
    axes.sort_by(|&a, &b| extent[b].total_cmp(&extent[a]));
    axes
}

/// A candidate split plane and what it would produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SplitCandidate {
    pub axis: usize,
    pub cost: f32,
    pub left_count: usize,
    pub right_count: usize,
    pub left_bounds: Aabb,
    pub right_bounds: Aabb,
}

impl SplitCandidate {
    fn imbalance(&self) -> usize {
        self.left_count.abs_diff(self.right_count)
    }

    /// Lower cost wins; equal costs prefer the more balanced partition.
    pub fn is_better_than(&self, other: &SplitCandidate) -> bool {
        let tolerance = COST_TIE_TOLERANCE * other.cost.abs().max(f32::MIN_POSITIVE);

        if self.cost < other.cost - tolerance {
            true
        } else if (self.cost - other.cost).abs() <= tolerance {
            self.imbalance() < other.imbalance()
        } else {
            false
        }
    }
}

/// Keeps `candidate` if it beats the current best.
pub(crate) fn keep_best<T>(best: &mut Option<(T, SplitCandidate)>, extra: T, candidate: SplitCandidate) {
    let replace = match best {
        Some((_, current)) => candidate.is_better_than(current),
        None => true,
    };

    if replace {
        *best = Some((extra, candidate));
    }
}

/// Maps centroids onto `bins` equal-width bins per axis.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CentroidBins {
    origin: Vec3,
    scale: Vec3,
    bins: usize,
}

impl CentroidBins {
    pub fn new(centroid_bounds: &Aabb, bins: usize) -> Self {
        let extent = centroid_bounds.extent();
        let scale = Vec3::select(
            extent.cmpgt(Vec3::ZERO),
            Vec3::splat(bins as f32) / extent,
            Vec3::ZERO,
        );

        Self {
            origin: centroid_bounds.min,
            scale,
            bins,
        }
    }

    #[inline]
    pub fn index(&self, centroid: Vec3, axis: usize) -> usize {
        // `as usize` saturates, so NaN and negatives land in bin 0
        let bin = ((centroid[axis] - self.origin[axis]) * self.scale[axis]) as usize;
        bin.min(self.bins - 1)
    }

    #[inline]
    pub fn is_splittable(&self, axis: usize) -> bool {
        self.scale[axis] > 0.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Bin {
    bounds: Aabb,
    count: usize,
}

impl Default for Bin {
    fn default() -> Self {
        Self {
            bounds: Aabb::EMPTY,
            count: 0,
        }
    }
}

/// Best object split: the bins on the left of plane `bin` go to the left child.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ObjectSplit {
    pub bins: CentroidBins,
    pub bin: usize,
    pub candidate: SplitCandidate,
}

impl ObjectSplit {
    #[inline]
    pub fn goes_left(&self, centroid: Vec3) -> bool {
        self.bins.index(centroid, self.candidate.axis) < self.bin
    }
}

/// Bins items by centroid along every axis and returns the cheapest plane
/// with a non-empty side on both halves.
pub(crate) fn find_object_split(
    items: impl Iterator<Item = (Aabb, Vec3)>,
    bounds: &Aabb,
    centroid_bounds: &Aabb,
    settings: &BuildSettings,
) -> Option<ObjectSplit> {
    let bin_count = settings.sah_bins;
    let bins = CentroidBins::new(centroid_bounds, bin_count);
    let parent_area = bounds.half_area();

    let mut per_axis = [
        vec![Bin::default(); bin_count],
        vec![Bin::default(); bin_count],
        vec![Bin::default(); bin_count],
    ];

    for (item_bounds, centroid) in items {
        for (axis, axis_bins) in per_axis.iter_mut().enumerate() {
            let bin = &mut axis_bins[bins.index(centroid, axis)];
            bin.bounds.grow(&item_bounds);
            bin.count += 1;
        }
    }

    let mut best: Option<(usize, SplitCandidate)> = None;
    let mut right_bounds = vec![Aabb::EMPTY; bin_count];
    let mut right_counts = vec![0usize; bin_count];

    for axis in axes_by_extent(centroid_bounds.extent()) {
        if !bins.is_splittable(axis) {
            continue;
        }

        let axis_bins = &per_axis[axis];

        // Suffix sweep: right_*[i] covers bins i..bin_count
        let mut acc = Aabb::EMPTY;
        let mut count = 0;
        for i in (0..bin_count).rev() {
            acc.grow(&axis_bins[i].bounds);
            count += axis_bins[i].count;
            right_bounds[i] = acc;
            right_counts[i] = count;
        }

        let mut left = Aabb::EMPTY;
        let mut left_count = 0;
        for plane in 1..bin_count {
            left.grow(&axis_bins[plane - 1].bounds);
            left_count += axis_bins[plane - 1].count;
            let right_count = right_counts[plane];

            if left_count == 0 || right_count == 0 {
                continue;
            }

            let candidate = SplitCandidate {
                axis,
                cost: split_cost(
                    settings,
                    parent_area,
                    left_count,
                    left.half_area(),
                    right_count,
                    right_bounds[plane].half_area(),
                ),
                left_count,
                right_count,
                left_bounds: left,
                right_bounds: right_bounds[plane],
            };

            keep_best(&mut best, plane, candidate);
        }
    }

    best.map(|(bin, candidate)| ObjectSplit {
        bins,
        bin,
        candidate,
    })
}

/// In-place partition; returns how many elements satisfy `pred`, which now
/// occupy the front of the slice.
pub(crate) fn partition_in_place<T>(items: &mut [T], mut pred: impl FnMut(&T) -> bool) -> usize {
    let mut split = 0;

    for i in 0..items.len() {
        if pred(&items[i]) {
            items.swap(split, i);
            split += 1;
        }
    }

    split
}
