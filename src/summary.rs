use crate::error::{ensure_parent_dir, Error};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{info, instrument};

/// XP per point of average accuracy.
const XP_PER_ACCURACY_POINT: f64 = 0.5;
/// Reference frames per bonus XP point.
const FRAMES_PER_LENGTH_XP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct SessionSummary {
    pub(crate) xp_gained: u32,
    pub(crate) avg_accuracy: f32,
}

impl SessionSummary {
    /// Summarize a session from the scores accumulated on every advance.
    pub(crate) fn from_scores(
        total_score: f64,
        frames_tracked: usize,
        reference_len: usize,
    ) -> Result<Self, Error> {
        let average = if frames_tracked > 0 {
            total_score / frames_tracked.to_f64().ok_or(Error::ConvertToF64)?
        } else {
            0.0
        };
        let accuracy_xp = (average * XP_PER_ACCURACY_POINT)
            .floor()
            .to_u32()
            .unwrap_or(0);
        let length_xp = (reference_len / FRAMES_PER_LENGTH_XP)
            .to_u32()
            .unwrap_or(u32::MAX);
        Ok(Self {
            xp_gained: accuracy_xp.saturating_add(length_xp),
            avg_accuracy: ((average * 10.0).round() / 10.0)
                .to_f32()
                .ok_or(Error::ConvertToF32)?,
        })
    }

    /// What an aborted session reports.
    pub(crate) fn zeroed() -> Self {
        Self {
            xp_gained: 0,
            avg_accuracy: 0.0,
        }
    }

    #[instrument(name = "SessionSummary::persist", skip(self))]
    pub(crate) fn persist(&self, path: &Path) -> Result<(), Error> {
        ensure_parent_dir(path)?;
        let json = serde_json::to_string(self).map_err(Error::SerializeSummary)?;
        fs::write(path, json).map_err(|e| Error::WriteSummary(e, path.to_path_buf()))?;
        info!(
            message = "wrote session summary",
            xp_gained = self.xp_gained,
            avg_accuracy = self.avg_accuracy
        );
        Ok(())
    }
}
