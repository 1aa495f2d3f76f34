use crate::pose::LandmarkKind::{self, *};

/// A named group of landmarks scored together.
#[derive(Debug)]
pub(crate) struct Region {
    pub(crate) name: &'static str,
    pub(crate) landmarks: &'static [LandmarkKind],
    pub(crate) weight: f32,
}

/// Large limbs dominate the weighting; the face barely counts.
pub(crate) const REGIONS: [Region; 7] = [
    Region {
        name: "head_neck",
        landmarks: &[Nose, LeftEar, RightEar],
        weight: 0.05,
    },
    Region {
        name: "shoulders",
        landmarks: &[LeftShoulder, RightShoulder],
        weight: 0.10,
    },
    Region {
        name: "elbows",
        landmarks: &[LeftElbow, RightElbow],
        weight: 0.10,
    },
    Region {
        name: "wrists_hands",
        landmarks: &[
            LeftWrist, RightWrist, LeftPinky, RightPinky, LeftIndex, RightIndex, LeftThumb,
            RightThumb,
        ],
        weight: 0.15,
    },
    Region {
        name: "torso_hips",
        landmarks: &[LeftHip, RightHip],
        weight: 0.20,
    },
    Region {
        name: "knees",
        landmarks: &[LeftKnee, RightKnee],
        weight: 0.20,
    },
    Region {
        name: "ankles_feet",
        landmarks: &[
            LeftAnkle,
            RightAnkle,
            LeftHeel,
            RightHeel,
            LeftFootIndex,
            RightFootIndex,
        ],
        weight: 0.20,
    },
];

/// The region a landmark is scored in, if any.
pub(crate) fn region_of(kind: LandmarkKind) -> Option<&'static Region> {
    REGIONS
        .iter()
        .find(|region| region.landmarks.contains(&kind))
}
