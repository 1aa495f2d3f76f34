use crate::{error::Error, point::Point};
use bitvec::{bitvec, vec::BitVec};
use num_traits::FromPrimitive;
use serde::Deserialize;
use std::time::Duration;

/// Body landmarks in MediaPipe Pose numbering.
#[derive(Debug, Copy, Clone, PartialEq, Eq, num_derive::FromPrimitive)]
pub(crate) enum LandmarkKind {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

pub(crate) const NUM_LANDMARKS: usize = LandmarkKind::RightFootIndex.index() + 1;

impl LandmarkKind {
    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn from_index(index: usize) -> Result<Self, Error> {
        Self::from_usize(index).ok_or(Error::ConvertUSizeToLandmarkKind(index))
    }

    /// Human readable joint name, used when reporting mistakes.
    pub(crate) fn name(self) -> &'static str {
        use LandmarkKind::*;
        match self {
            Nose => "nose",
            LeftEyeInner => "left eye inner",
            LeftEye => "left eye",
            LeftEyeOuter => "left eye outer",
            RightEyeInner => "right eye inner",
            RightEye => "right eye",
            RightEyeOuter => "right eye outer",
            LeftEar => "left ear",
            RightEar => "right ear",
            MouthLeft => "mouth left",
            MouthRight => "mouth right",
            LeftShoulder => "left shoulder",
            RightShoulder => "right shoulder",
            LeftElbow => "left elbow",
            RightElbow => "right elbow",
            LeftWrist => "left wrist",
            RightWrist => "right wrist",
            LeftPinky => "left pinky",
            RightPinky => "right pinky",
            LeftIndex => "left index finger",
            RightIndex => "right index finger",
            LeftThumb => "left thumb",
            RightThumb => "right thumb",
            LeftHip => "left hip",
            RightHip => "right hip",
            LeftKnee => "left knee",
            RightKnee => "right knee",
            LeftAnkle => "left ankle",
            RightAnkle => "right ankle",
            LeftHeel => "left heel",
            RightHeel => "right heel",
            LeftFootIndex => "left toe",
            RightFootIndex => "right toe",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Landmark {
    pub(crate) point: Point,
    pub(crate) visibility: f32,
}

/// A landmark as it appears in reference files and live frames.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawLandmark {
    #[serde(default)]
    pub(crate) id: Option<usize>,
    pub(crate) x: f32,
    pub(crate) y: f32,
    #[serde(default, alias = "v")]
    pub(crate) visibility: Option<f32>,
}

/// One detected pose. Slots the detector did not report stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PoseFrame {
    landmarks: [Option<Landmark>; NUM_LANDMARKS],
}

impl Default for PoseFrame {
    fn default() -> Self {
        Self {
            landmarks: [None; NUM_LANDMARKS],
        }
    }
}

impl PoseFrame {
    /// Build a frame from raw landmarks. A landmark without an `id` takes its
    /// position in the list as its index.
    pub(crate) fn from_raw(raw: &[RawLandmark], default_visibility: f32) -> Result<Self, Error> {
        let mut frame = Self::default();
        for (position, landmark) in raw.iter().enumerate() {
            let kind = LandmarkKind::from_index(landmark.id.unwrap_or(position))?;
            frame.set(
                kind,
                Landmark {
                    point: Point::new(landmark.x, landmark.y)?,
                    visibility: landmark
                        .visibility
                        .unwrap_or(default_visibility)
                        .clamp(0.0, 1.0),
                },
            );
        }
        Ok(frame)
    }

    pub(crate) fn set(&mut self, kind: LandmarkKind, landmark: Landmark) {
        self.landmarks[kind.index()] = Some(landmark);
    }

    pub(crate) fn get(&self, kind: LandmarkKind) -> Option<&Landmark> {
        self.landmarks[kind.index()].as_ref()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.landmarks.iter().all(Option::is_none)
    }

    /// Present landmarks in index order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &Landmark)> + '_ {
        self.landmarks
            .iter()
            .enumerate()
            .filter_map(|(index, landmark)| landmark.as_ref().map(|landmark| (index, landmark)))
    }

    /// Bit `i` is set when landmark `i` is present with `visibility >= threshold`.
    pub(crate) fn visible_mask(&self, threshold: f32) -> BitVec {
        let mut mask = bitvec![0; NUM_LANDMARKS];
        for (index, landmark) in self.iter() {
            if landmark.visibility >= threshold {
                mask.set(index, true);
            }
        }
        mask
    }
}

/// What the landmark source saw in one input frame.
#[derive(Debug, Clone)]
pub(crate) struct Detection {
    /// Time since the start of the stream.
    pub(crate) timestamp: Duration,
    pub(crate) pose: Option<PoseFrame>,
}

impl Detection {
    pub(crate) fn new(timestamp: Duration, pose: Option<PoseFrame>) -> Self {
        Self {
            timestamp,
            pose: pose.filter(|pose| !pose.is_empty()),
        }
    }

    pub(crate) fn miss(timestamp: Duration) -> Self {
        Self {
            timestamp,
            pose: None,
        }
    }
}
