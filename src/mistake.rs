use crate::{
    error::{ensure_parent_dir, Error},
    normalize::Descriptor,
    point::Point,
    pose::{LandmarkKind, PoseFrame},
    region::{region_of, Region, REGIONS},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{info, instrument, warn};

/// Joint blamed when nothing better can be attributed.
const FALLBACK_JOINT: LandmarkKind = LandmarkKind::RightHip;

/// One stall, as written to the mistake log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MistakeRecord {
    pub(crate) frame_index: usize,
    pub(crate) timestamp: String,
    pub(crate) failed_joint_id: usize,
    pub(crate) failed_group: String,
    pub(crate) wrong_x: f32,
    pub(crate) right_x: f32,
    pub(crate) wrong_y: f32,
    pub(crate) right_y: f32,
    pub(crate) score_at_fail: f32,
}

/// Source of the human readable time stamped on each record.
pub(crate) trait WallClock {
    fn now_label(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LocalClock;

impl WallClock for LocalClock {
    fn now_label(&self) -> String {
        chrono::Local::now().format("%H:%M:%S").to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct JointDeviation {
    pub(crate) kind: LandmarkKind,
    pub(crate) region: &'static Region,
    pub(crate) live: Point,
    pub(crate) reference: Point,
    pub(crate) distance: f32,
}

/// The visible joint furthest from where the reference has it.
///
/// Joints are visited region by region in table order, which is ascending
/// landmark index, and only a strictly larger distance replaces the current
/// worst, so ties go to the lowest index.
pub(crate) fn find_worst_joint(
    live_frame: &PoseFrame,
    live: &Descriptor,
    reference: &Descriptor,
    visibility_threshold: f32,
) -> Option<JointDeviation> {
    let mut worst: Option<JointDeviation> = None;
    for region in &REGIONS {
        for &kind in region.landmarks {
            let visible = live_frame
                .get(kind)
                .map_or(false, |landmark| landmark.visibility >= visibility_threshold);
            if !visible {
                continue;
            }
            let (live_offset, reference_offset) = match (live.offset(kind), reference.offset(kind)) {
                (Some(live_offset), Some(reference_offset)) => (live_offset, reference_offset),
                _ => continue,
            };
            let distance = live_offset.distance(reference_offset);
            if worst.map_or(true, |worst| distance > worst.distance) {
                worst = Some(JointDeviation {
                    kind,
                    region,
                    live: live_offset,
                    reference: reference_offset,
                    distance,
                });
            }
        }
    }
    worst
}

/// In-memory log of the session's mistakes. Written once, at the end.
#[derive(Debug)]
pub(crate) struct MistakeLog {
    records: Vec<MistakeRecord>,
    visibility_threshold: f32,
}

impl MistakeLog {
    pub(crate) fn new(visibility_threshold: f32) -> Self {
        Self {
            records: Vec::new(),
            visibility_threshold,
        }
    }

    pub(crate) fn records(&self) -> &[MistakeRecord] {
        &self.records
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Attribute a stall at `reference_index` to a joint and append the record.
    ///
    /// `live` is the most recent scorable live pose, if there has been one.
    pub(crate) fn log_mistake(
        &mut self,
        live: Option<(&PoseFrame, &Descriptor)>,
        reference: Option<&Descriptor>,
        reference_index: usize,
        score: f32,
        timestamp: String,
    ) -> &MistakeRecord {
        let worst = match (live, reference) {
            (Some((frame, live)), Some(reference)) => {
                find_worst_joint(frame, live, reference, self.visibility_threshold)
            }
            _ => None,
        };

        let record = match worst {
            Some(worst) => MistakeRecord {
                frame_index: reference_index,
                timestamp,
                failed_joint_id: worst.kind.index(),
                failed_group: worst.region.name.to_owned(),
                wrong_x: worst.live.x(),
                right_x: worst.reference.x(),
                wrong_y: worst.live.y(),
                right_y: worst.reference.y(),
                score_at_fail: score,
            },
            None => {
                warn!(
                    message = "no visible joint to attribute stall to, using fallback",
                    reference_index,
                    joint = FALLBACK_JOINT.name()
                );
                let offset_of = |descriptor: Option<&Descriptor>| {
                    descriptor
                        .and_then(|descriptor| descriptor.offset(FALLBACK_JOINT))
                        .unwrap_or_default()
                };
                let live_offset = offset_of(live.map(|(_, descriptor)| descriptor));
                let reference_offset = offset_of(reference);
                MistakeRecord {
                    frame_index: reference_index,
                    timestamp,
                    failed_joint_id: FALLBACK_JOINT.index(),
                    failed_group: region_of(FALLBACK_JOINT)
                        .map_or("torso_hips", |region| region.name)
                        .to_owned(),
                    wrong_x: live_offset.x(),
                    right_x: reference_offset.x(),
                    wrong_y: live_offset.y(),
                    right_y: reference_offset.y(),
                    score_at_fail: score,
                }
            }
        };

        info!(
            message = "stall",
            frame_index = record.frame_index,
            joint = record.failed_joint_id,
            group = %record.failed_group,
            score = record.score_at_fail
        );
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Write every record as a JSON array. An empty log is still written.
    #[instrument(name = "MistakeLog::persist", skip(self), fields(records = self.records.len()))]
    pub(crate) fn persist(&self, path: &Path) -> Result<(), Error> {
        persist_records(&self.records, path)
    }

    #[instrument(name = "MistakeLog::load")]
    pub(crate) fn load(path: &Path) -> Result<Vec<MistakeRecord>, Error> {
        let content =
            fs::read_to_string(path).map_err(|e| Error::ReadMistakeLog(e, path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|e| Error::ParseMistakeLog(e, path.to_path_buf()))
    }
}

pub(crate) fn persist_records(records: &[MistakeRecord], path: &Path) -> Result<(), Error> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(records).map_err(Error::SerializeMistakeLog)?;
    fs::write(path, json).map_err(|e| Error::WriteMistakeLog(e, path.to_path_buf()))?;
    info!(message = "wrote mistake log", path = ?path, records = records.len());
    Ok(())
}
