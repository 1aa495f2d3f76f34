use crate::{
    error::{ensure_parent_dir, Error},
    mistake::MistakeRecord,
    pose::LandmarkKind,
};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Body area a coaching cue is about.
///
/// Every landmark has an area. Shoulders and feet get areas of their own
/// with their own tips rather than a generic cue named after the joint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub(crate) enum Category {
    #[serde(rename = "Head/Neck")]
    HeadNeck,
    Hands,
    Elbows,
    Shoulders,
    Core,
    Knees,
    Feet,
}

impl Category {
    pub(crate) fn of(kind: LandmarkKind) -> Self {
        use LandmarkKind::*;
        match kind {
            Nose | LeftEyeInner | LeftEye | LeftEyeOuter | RightEyeInner | RightEye
            | RightEyeOuter | LeftEar | RightEar | MouthLeft | MouthRight => Self::HeadNeck,
            LeftWrist | RightWrist | LeftPinky | RightPinky | LeftIndex | RightIndex
            | LeftThumb | RightThumb => Self::Hands,
            LeftElbow | RightElbow => Self::Elbows,
            LeftShoulder | RightShoulder => Self::Shoulders,
            LeftHip | RightHip => Self::Core,
            LeftKnee | RightKnee => Self::Knees,
            LeftAnkle | RightAnkle | LeftHeel | RightHeel | LeftFootIndex | RightFootIndex => {
                Self::Feet
            }
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::HeadNeck => "Head/Neck",
            Self::Hands => "Hands",
            Self::Elbows => "Elbows",
            Self::Shoulders => "Shoulders",
            Self::Core => "Core",
            Self::Knees => "Knees",
            Self::Feet => "Feet",
        }
    }

    fn tip(self) -> &'static str {
        match self {
            Self::HeadNeck => "Keep your spine neutral and your chin tucked.",
            Self::Hands => "Check your grip and hand placement.",
            Self::Elbows => "Watch your elbow flare.",
            Self::Shoulders => "Keep your shoulders down and level.",
            Self::Core => "Keep your core tight and hit depth.",
            Self::Knees => "Don't let your knees cave in.",
            Self::Feet => "Stay planted and keep your stance steady.",
        }
    }
}

/// One entry of the coaching analysis, derived from a mistake record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct CoachingCue {
    pub(crate) frame: usize,
    pub(crate) time: String,
    pub(crate) score: f32,
    pub(crate) category: Category,
    pub(crate) advice: String,
}

/// Describe how far off a joint was. Image y grows downwards, so a positive
/// `dy` means the joint sat lower than it should have.
pub(crate) fn direction(dx: f32, dy: f32, tolerance: f32) -> String {
    let mut phrases = Vec::with_capacity(2);
    if dy > tolerance {
        phrases.push("too low");
    } else if dy < -tolerance {
        phrases.push("too high");
    }
    if dx > tolerance {
        phrases.push("drifting right");
    } else if dx < -tolerance {
        phrases.push("drifting left");
    }

    if phrases.is_empty() {
        "out of alignment".to_owned()
    } else {
        phrases.join(" and ")
    }
}

pub(crate) fn cue(record: &MistakeRecord, tolerance: f32) -> Result<CoachingCue, Error> {
    let kind = LandmarkKind::from_index(record.failed_joint_id)?;
    let category = Category::of(kind);
    let direction = direction(
        record.wrong_x - record.right_x,
        record.wrong_y - record.right_y,
        tolerance,
    );
    let advice = match category {
        Category::HeadNeck => format!("Your head was {}. {}", direction, category.tip()),
        _ => format!("Your {} was {}. {}", kind.name(), direction, category.tip()),
    };
    Ok(CoachingCue {
        frame: record.frame_index,
        time: record.timestamp.clone(),
        score: record.score_at_fail,
        category,
        advice,
    })
}

/// Turn a mistake log into coaching cues, in log order. Records naming a
/// joint that doesn't exist are skipped.
pub(crate) fn analyze(records: &[MistakeRecord], tolerance: f32) -> Vec<CoachingCue> {
    records
        .iter()
        .filter_map(|record| match cue(record, tolerance) {
            Ok(cue) => Some(cue),
            Err(error) => {
                warn!(message = "skipping mistake record", frame = record.frame_index, %error);
                None
            }
        })
        .collect()
}

/// How often each category came up, most frequent first.
pub(crate) fn category_counts(cues: &[CoachingCue]) -> Vec<(Category, usize)> {
    let mut counts = std::collections::BTreeMap::new();
    for cue in cues {
        *counts.entry(cue.category).or_insert(0_usize) += 1;
    }
    let mut counts = counts.into_iter().collect::<Vec<_>>();
    counts.sort_by(|(_, a), (_, b)| b.cmp(a));
    counts
}

/// `<dir>/<stem>_analysis.json` next to the mistake log.
pub(crate) fn analysis_path(log_path: &Path) -> PathBuf {
    let stem = log_path
        .file_stem()
        .map_or_else(|| "mistakes".into(), |stem| stem.to_string_lossy());
    log_path.with_file_name(format!("{}_analysis.json", stem))
}

#[instrument(name = "coach::persist", skip(cues), fields(cues = cues.len()))]
pub(crate) fn persist(cues: &[CoachingCue], path: &Path) -> Result<(), Error> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(cues).map_err(Error::SerializeAnalysis)?;
    fs::write(path, json).map_err(|e| Error::WriteAnalysis(e, path.to_path_buf()))?;
    info!(message = "wrote coaching analysis", path = ?path);
    Ok(())
}
