//! Object Segmentation
//!
//! Groups contiguous in-range samples of a 360° range scan into object
//! candidates and counts those wide enough to be an object.
//!
//! The pass is linear: it walks the samples from index 0 to N-1 and never
//! flushes at the end, so an object that is still being accumulated at index
//! N-1 is not counted. With [`SegmenterConfig::wrap_around`] enabled the scan
//! is treated as a ring and objects straddling the 0/N-1 seam count once.

use serde::{Deserialize, Serialize};

/// Segmentation parameters, fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmenterConfig {
    /// Samples at or beyond this distance (meters) are empty space
    pub max_view_distance: f32,
    /// Distance jump (meters) between neighbours that starts a new surface
    pub gap_threshold: f32,
    /// An object must be strictly wider than this many samples to count
    pub min_object_width: usize,
    /// Treat index N-1 as adjacent to index 0
    pub wrap_around: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        SegmenterConfig {
            max_view_distance: 1.5,
            gap_threshold: 0.05,
            min_object_width: 3,
            wrap_around: false,
        }
    }
}

/// Count objects in `ranges` with a literal linear pass.
///
/// # Arguments
/// * `ranges` - Sanitized range readings in meters, in angular order
/// * `max_view_distance` - Readings below this are in detection range
/// * `gap_threshold` - Jump between consecutive in-range readings that splits objects
/// * `min_object_width` - Minimum width (exclusive) in samples
pub fn segment(
    ranges: &[f32],
    max_view_distance: f32,
    gap_threshold: f32,
    min_object_width: usize,
) -> usize {
    let config = SegmenterConfig {
        max_view_distance,
        gap_threshold,
        min_object_width,
        wrap_around: false,
    };
    RangeSegmenter::new(config).segment(ranges)
}

/// Stateless range scan segmenter.
#[derive(Debug, Clone, Copy)]
pub struct RangeSegmenter {
    config: SegmenterConfig,
}

impl RangeSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        RangeSegmenter { config }
    }

    /// Count the objects in a scan.
    pub fn segment(&self, ranges: &[f32]) -> usize {
        let Some(&first) = ranges.first() else {
            return 0;
        };

        if !self.config.wrap_around {
            return self.count_pass(first, ranges.iter().copied());
        }

        let n = ranges.len();
        let start = ranges
            .iter()
            .position(|&d| !self.in_range(d))
            .or_else(|| {
                (0..n).find(|&i| {
                    (ranges[i] - ranges[(i + n - 1) % n]).abs() > self.config.gap_threshold
                })
            });

        match start {
            Some(s) => {
                // Replaying the seam sample closes whatever object ends at s-1
                let ring = ranges[s..]
                    .iter()
                    .chain(ranges[..s].iter())
                    .chain(std::iter::once(&ranges[s]))
                    .copied();
                self.count_pass(ranges[s], ring)
            }
            // One unbroken surface all the way around
            None => usize::from(n > self.config.min_object_width),
        }
    }

    fn in_range(&self, distance: f32) -> bool {
        distance < self.config.max_view_distance
    }

    fn count_pass(&self, seed: f32, samples: impl Iterator<Item = f32>) -> usize {
        let mut count = 0;
        let mut width = 0usize;
        let mut prev = seed;

        for dist in samples {
            if self.in_range(dist) {
                if (dist - prev).abs() > self.config.gap_threshold {
                    if width > self.config.min_object_width {
                        count += 1;
                    }
                    width = 0;
                }
                width += 1;
                prev = dist;
            } else {
                // Empty space; keep prev at the last real surface
                if width > self.config.min_object_width {
                    count += 1;
                }
                width = 0;
            }
        }

        count
    }
}
