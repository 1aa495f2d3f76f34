use crate::{
    error::Error,
    normalize::{normalize, Descriptor},
    pose::{PoseFrame, RawLandmark},
};
use serde::Deserialize;
use std::{fs::File, io::BufReader, ops::RangeInclusive, path::Path};
use tracing::{info, instrument, warn};

/// Reference recordings are ground truth, so a missing visibility means fully visible.
const REFERENCE_VISIBILITY: f32 = 1.0;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReferenceFile {
    Wrapped { coordinates: Vec<RawFrame> },
    Bare(Vec<RawFrame>),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    landmarks: Option<Vec<RawLandmark>>,
}

#[derive(Debug, Clone)]
pub(crate) struct ReferenceFrame {
    pub(crate) pose: PoseFrame,
    /// `None` when the recorded frame has no hips and can't be matched against.
    pub(crate) descriptor: Option<Descriptor>,
}

/// The ghost: every recorded frame with its descriptor computed up front.
#[derive(Debug, Clone)]
pub(crate) struct ReferenceSequence {
    frames: Vec<ReferenceFrame>,
}

impl ReferenceSequence {
    #[instrument(name = "ReferenceSequence::load")]
    pub(crate) fn load(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| Error::OpenReference(e, path.to_path_buf()))?;
        let raw: ReferenceFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::ParseReference(e, path.to_path_buf()))?;
        let raw_frames = match raw {
            ReferenceFile::Wrapped { coordinates } => coordinates,
            ReferenceFile::Bare(frames) => frames,
        };
        if raw_frames.is_empty() {
            return Err(Error::EmptyReference(path.to_path_buf()));
        }

        let poses = raw_frames
            .iter()
            .map(|frame| {
                PoseFrame::from_raw(
                    frame.landmarks.as_deref().unwrap_or_default(),
                    REFERENCE_VISIBILITY,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let sequence = Self::from_poses(poses);

        info!(
            message = "loaded reference sequence",
            frames = sequence.len(),
            matchable = sequence.matchable_len()
        );
        Ok(sequence)
    }

    pub(crate) fn from_poses(poses: Vec<PoseFrame>) -> Self {
        let frames = poses
            .into_iter()
            .enumerate()
            .map(|(index, pose)| {
                let descriptor = match normalize(&pose) {
                    Ok(descriptor) => Some(descriptor),
                    Err(error) => {
                        warn!(message = "reference frame cannot be matched", index, %error);
                        None
                    }
                };
                ReferenceFrame { pose, descriptor }
            })
            .collect();
        Self { frames }
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn matchable_len(&self) -> usize {
        self.frames
            .iter()
            .filter(|frame| frame.descriptor.is_some())
            .count()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&ReferenceFrame> {
        self.frames.get(index)
    }

    pub(crate) fn descriptor(&self, index: usize) -> Option<&Descriptor> {
        self.get(index).and_then(|frame| frame.descriptor.as_ref())
    }

    pub(crate) fn last_index(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// `[center - radius, center + radius]` clamped to the sequence.
    pub(crate) fn window(&self, center: usize, radius: usize) -> RangeInclusive<usize> {
        let last = self.last_index();
        center.saturating_sub(radius).min(last)..=center.saturating_add(radius).min(last)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ReferenceFrame> + '_ {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::ReferenceSequence;
    use crate::{
        error::Error,
        normalize::test_util::{frame_from, STANDING},
        pose::LandmarkKind,
    };
    use std::{fs, path::Path};

    fn landmarks_json(points: &[(f32, f32)]) -> String {
        let landmarks = points
            .iter()
            .enumerate()
            .map(|(id, (x, y))| format!(r#"{{"id":{},"x":{},"y":{},"z":0.0}}"#, id, x, y))
            .collect::<Vec<_>>()
            .join(",");
        format!(r#"{{"landmarks":[{}]}}"#, landmarks)
    }

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_bare_array() {
        let dir = tempfile::tempdir().unwrap();
        let frame = landmarks_json(&STANDING);
        let path = write(dir.path(), "bare.json", &format!("[{},{}]", frame, frame));
        let sequence = ReferenceSequence::load(&path).unwrap();
        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.matchable_len(), 2);
        let nose = sequence.get(1).unwrap().pose.get(LandmarkKind::Nose).unwrap();
        assert_eq!(nose.visibility, 1.0);
    }

    #[test]
    fn loads_wrapped_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!(
            r#"{{"video_path":"punch.mp4","total_frames":3,"coordinates":[{},{{"frame":1,"landmarks":[]}},{}]}}"#,
            landmarks_json(&STANDING),
            landmarks_json(&STANDING)
        );
        let path = write(dir.path(), "wrapped.json", &content);
        let sequence = ReferenceSequence::load(&path).unwrap();
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.matchable_len(), 2);
        assert!(sequence.descriptor(1).is_none());
        assert!(sequence.descriptor(2).is_some());
    }

    #[test]
    fn short_visibility_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "v.json",
            r#"[{"landmarks":[{"id":0,"x":0.5,"y":0.1,"z":0.0,"v":0.25}]}]"#,
        );
        let sequence = ReferenceSequence::load(&path).unwrap();
        let nose = sequence.get(0).unwrap().pose.get(LandmarkKind::Nose).unwrap();
        assert_eq!(nose.visibility, 0.25);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ReferenceSequence::load(&dir.path().join("nope.json")),
            Err(Error::OpenReference(..))
        ));
    }

    #[test]
    fn malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.json", r#"{"frames": 12}"#);
        assert!(matches!(
            ReferenceSequence::load(&path),
            Err(Error::ParseReference(..))
        ));
    }

    #[test]
    fn out_of_range_landmark_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "ids.json",
            r#"[{"landmarks":[{"id":33,"x":0.5,"y":0.5}]}]"#,
        );
        assert!(matches!(
            ReferenceSequence::load(&path),
            Err(Error::ConvertUSizeToLandmarkKind(33))
        ));
    }

    #[test]
    fn empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "empty.json", "[]");
        assert!(matches!(
            ReferenceSequence::load(&path),
            Err(Error::EmptyReference(_))
        ));
    }

    #[test]
    fn window_is_clamped() {
        let sequence = ReferenceSequence::from_poses(vec![frame_from(&STANDING); 30]);
        assert_eq!(sequence.window(0, 10), 0..=10);
        assert_eq!(sequence.window(15, 10), 5..=25);
        assert_eq!(sequence.window(25, 10), 15..=29);
        assert_eq!(sequence.window(29, 10), 19..=29);
    }
}
