use crate::{
    error::Error,
    pose::{Detection, PoseFrame, RawLandmark},
    reference::ReferenceSequence,
};
use serde::Deserialize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument};

/// Live landmarks without a visibility are treated as unseen.
const LIVE_DEFAULT_VISIBILITY: f32 = 0.0;

/// Path that selects standard input.
pub(crate) const STDIN_PATH: &str = "-";

/// Where live poses come from.
pub(crate) trait LandmarkSource {
    /// The next detection, or `Ok(None)` once the input is exhausted.
    fn next_detection(&mut self) -> Result<Option<Detection>, Error>;
}

impl<S: LandmarkSource + ?Sized> LandmarkSource for Box<S> {
    fn next_detection(&mut self) -> Result<Option<Detection>, Error> {
        (**self).next_detection()
    }
}

#[derive(Debug, Deserialize)]
struct LiveFrame {
    #[serde(default)]
    timestamp_ms: Option<u64>,
    #[serde(default)]
    landmarks: Option<Vec<RawLandmark>>,
}

/// Newline delimited JSON frames from a pose detector, one object per line.
pub(crate) struct JsonLinesSource {
    reader: Box<dyn BufRead>,
    label: String,
    opened: Instant,
    line_number: usize,
    detections: usize,
    buffer: String,
}

impl JsonLinesSource {
    /// Open `path`, or standard input when `path` is `-`.
    #[instrument(name = "JsonLinesSource::open")]
    pub(crate) fn open(path: &Path) -> Result<Self, Error> {
        if path == Path::new(STDIN_PATH) {
            return Ok(Self::from_reader(
                Box::new(BufReader::new(io::stdin())),
                "stdin",
            ));
        }
        let file = File::open(path).map_err(|e| Error::OpenLiveSource(e, path.to_path_buf()))?;
        Ok(Self::from_reader(
            Box::new(BufReader::new(file)),
            path.display().to_string(),
        ))
    }

    pub(crate) fn from_reader(reader: Box<dyn BufRead>, label: impl Into<String>) -> Self {
        let label = label.into();
        info!(message = "acquired landmark source", source = %label);
        Self {
            reader,
            label,
            opened: Instant::now(),
            line_number: 0,
            detections: 0,
            buffer: String::new(),
        }
    }

    fn parse_line(&self, line: &str) -> Result<Detection, Error> {
        let frame: LiveFrame =
            serde_json::from_str(line).map_err(|e| Error::ParseLiveFrame(e, self.line_number))?;
        let timestamp = frame
            .timestamp_ms
            .map_or_else(|| self.opened.elapsed(), Duration::from_millis);
        let pose = match frame.landmarks {
            Some(landmarks) if !landmarks.is_empty() => {
                Some(PoseFrame::from_raw(&landmarks, LIVE_DEFAULT_VISIBILITY)?)
            }
            _ => None,
        };
        Ok(Detection::new(timestamp, pose))
    }
}

impl LandmarkSource for JsonLinesSource {
    fn next_detection(&mut self) -> Result<Option<Detection>, Error> {
        loop {
            self.buffer.clear();
            let read = self
                .reader
                .read_line(&mut self.buffer)
                .map_err(Error::ReadLiveFrame)?;
            if read == 0 {
                debug!(message = "landmark source exhausted", source = %self.label);
                return Ok(None);
            }
            self.line_number += 1;

            let line = self.buffer.trim();
            if line.is_empty() {
                continue;
            }
            let detection = self.parse_line(line)?;
            self.detections += 1;
            return Ok(Some(detection));
        }
    }
}

impl Drop for JsonLinesSource {
    fn drop(&mut self) {
        info!(
            message = "released landmark source",
            source = %self.label,
            detections = self.detections
        );
    }
}

/// Plays a reference sequence back as if someone were performing it perfectly.
pub(crate) struct ReplaySource {
    poses: std::vec::IntoIter<PoseFrame>,
    frame_interval: Duration,
    emitted: u32,
}

impl ReplaySource {
    pub(crate) fn new(reference: &ReferenceSequence, fps: f64) -> Result<Self, Error> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "replay frame rate must be positive, got {}",
                fps
            )));
        }
        let poses = reference
            .iter()
            .map(|frame| frame.pose.clone())
            .collect::<Vec<_>>();
        info!(message = "acquired replay source", frames = poses.len(), fps);
        Ok(Self {
            poses: poses.into_iter(),
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            emitted: 0,
        })
    }
}

impl LandmarkSource for ReplaySource {
    fn next_detection(&mut self) -> Result<Option<Detection>, Error> {
        Ok(self.poses.next().map(|pose| {
            let timestamp = self.frame_interval * self.emitted;
            self.emitted += 1;
            Detection::new(timestamp, Some(pose))
        }))
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        info!(message = "released replay source", emitted = self.emitted);
    }
}
