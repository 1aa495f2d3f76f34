use crate::{
    error::Error,
    point::Point,
    pose::{LandmarkKind, PoseFrame, NUM_LANDMARKS},
};

/// Hip-centred offsets of every landmark present in a frame.
///
/// Only translation is removed. Body size and orientation differences between
/// the live framing and the reference recording are left to the windowed
/// search and region weighting.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Descriptor {
    offsets: [Option<Point>; NUM_LANDMARKS],
}

impl Descriptor {
    pub(crate) fn get(&self, index: usize) -> Option<Point> {
        self.offsets.get(index).copied().flatten()
    }

    pub(crate) fn offset(&self, kind: LandmarkKind) -> Option<Point> {
        self.get(kind.index())
    }
}

/// Subtract the midpoint of the two hips from every landmark.
pub(crate) fn normalize(frame: &PoseFrame) -> Result<Descriptor, Error> {
    let left_hip = frame
        .get(LandmarkKind::LeftHip)
        .ok_or(Error::MissingHipLandmark(LandmarkKind::LeftHip))?;
    let right_hip = frame
        .get(LandmarkKind::RightHip)
        .ok_or(Error::MissingHipLandmark(LandmarkKind::RightHip))?;
    let centre = left_hip.point.midpoint(right_hip.point);

    let mut offsets = [None; NUM_LANDMARKS];
    for (index, landmark) in frame.iter() {
        offsets[index] = Some(landmark.point - centre);
    }
    Ok(Descriptor { offsets })
}
