use crate::{
    normalize::Descriptor,
    point::Point,
    region::{Region, REGIONS},
};
use bitvec::slice::BitSlice;
use ndarray::{Array1, ArrayView1};

/// Regions with fewer visible landmarks than this are left out of a frame's score.
const MIN_VISIBLE_PER_REGION: usize = 2;

/// Weighted per-region cosine similarity between a live pose and a reference pose.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RegionScorer {
    visibility_threshold: f32,
}

impl RegionScorer {
    pub(crate) fn new(visibility_threshold: f32) -> Self {
        Self {
            visibility_threshold,
        }
    }

    pub(crate) fn visibility_threshold(&self) -> f32 {
        self.visibility_threshold
    }

    /// Similarity in `[0, 100]` of a live pose, given as its visibility mask
    /// and descriptor, to a reference pose. One mask serves a whole window of
    /// reference frames.
    pub(crate) fn score_visible(
        &self,
        visible: &BitSlice,
        live: &Descriptor,
        reference: &Descriptor,
    ) -> f32 {
        let (weighted, used) = REGIONS
            .iter()
            .filter_map(|region| {
                region_similarity(region, visible, live, reference)
                    .map(|similarity| (similarity * region.weight, region.weight))
            })
            .fold((0.0, 0.0), |(weighted, used), (score, weight)| {
                (weighted + score, used + weight)
            });

        if used > 0.0 {
            weighted / used
        } else {
            0.0
        }
    }
}

/// Similarity of one region in `[0, 100]`, or `None` when too few of its
/// landmarks are visible to say anything.
pub(crate) fn region_similarity(
    region: &Region,
    visible: &BitSlice,
    live: &Descriptor,
    reference: &Descriptor,
) -> Option<f32> {
    let pairs = region
        .landmarks
        .iter()
        .filter(|kind| visible[kind.index()])
        .filter_map(|&kind| Some((live.offset(kind)?, reference.offset(kind)?)))
        .collect::<Vec<_>>();

    if pairs.len() < MIN_VISIBLE_PER_REGION {
        return None;
    }

    let live_vec = flatten(pairs.iter().map(|&(live, _)| live));
    let reference_vec = flatten(pairs.iter().map(|&(_, reference)| reference));
    let similarity = cosine_similarity(live_vec.view(), reference_vec.view()) * 100.0;
    Some(similarity.clamp(0.0, 100.0))
}

fn flatten(points: impl Iterator<Item = Point>) -> Array1<f32> {
    points.flat_map(|point| [point.x(), point.y()]).collect()
}

/// Cosine of the angle between `a` and `b`; zero if either has no length.
pub(crate) fn cosine_similarity(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let norms = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norms == 0.0 {
        0.0
    } else {
        a.dot(&b) / norms
    }
}
