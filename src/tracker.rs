use crate::{
    config::TrackingConfig,
    mistake::{MistakeLog, WallClock},
    normalize::{normalize, Descriptor},
    pose::{Detection, PoseFrame},
    reference::ReferenceSequence,
    score::RegionScorer,
};
use std::time::Duration;
use tracing::{debug, trace};

/// What a single live frame did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Step {
    Advanced { from: usize, to: usize, score: f32 },
    Holding { best_index: usize, score: f32 },
    Stalled { from: usize, to: usize, score: f32 },
    /// Nothing scorable in the frame and not yet stuck.
    Skipped,
}

/// Follows a live performer through the reference sequence.
///
/// The current index only ever moves forward: either because a later
/// reference frame matched the live pose best, or because the performer was
/// stuck for too long and got pushed ahead.
pub(crate) struct ProgressionTracker<'a> {
    reference: &'a ReferenceSequence,
    scorer: RegionScorer,
    config: TrackingConfig,
    current: usize,
    /// Stream time of the last advance or stall. Starts at the first frame
    /// the tracker sees, whatever clock the source uses.
    last_advance: Option<Duration>,
    total_score: f64,
    frames_tracked: usize,
    last_score: f32,
    last_live: Option<(PoseFrame, Descriptor)>,
}

impl<'a> ProgressionTracker<'a> {
    pub(crate) fn new(reference: &'a ReferenceSequence, config: TrackingConfig) -> Self {
        Self {
            reference,
            scorer: RegionScorer::new(config.visibility_threshold),
            config,
            current: 0,
            last_advance: None,
            total_score: 0.0,
            frames_tracked: 0,
            last_score: 0.0,
            last_live: None,
        }
    }

    pub(crate) fn current_index(&self) -> usize {
        self.current
    }

    /// Sum of the scores of every advance.
    pub(crate) fn total_score(&self) -> f64 {
        self.total_score
    }

    /// Number of advances.
    pub(crate) fn frames_tracked(&self) -> usize {
        self.frames_tracked
    }

    pub(crate) fn is_finished(&self) -> bool {
        let len = self.reference.len();
        let goal = if len > self.config.end_margin {
            len - self.config.end_margin
        } else {
            self.reference.last_index()
        };
        self.current >= goal
    }

    pub(crate) fn observe(
        &mut self,
        detection: &Detection,
        log: &mut MistakeLog,
        clock: &dyn WallClock,
    ) -> Step {
        let now = detection.timestamp;
        self.last_advance.get_or_insert(now);
        let pose = match detection.pose.as_ref() {
            Some(pose) => pose,
            None => {
                trace!(message = "no pose in frame", ?now);
                return self.check_stall(now, log, clock).unwrap_or(Step::Skipped);
            }
        };
        let live = match normalize(pose) {
            Ok(live) => live,
            Err(error) => {
                debug!(message = "live pose cannot be normalized", %error);
                return self.check_stall(now, log, clock).unwrap_or(Step::Skipped);
            }
        };

        let (best_index, best_score) = self.best_match(pose, &live);
        self.last_score = best_score;
        self.last_live = Some((pose.clone(), live));

        if best_index > self.current {
            let from = self.current;
            self.current = best_index;
            self.last_advance = Some(now);
            self.total_score += f64::from(best_score);
            self.frames_tracked += 1;
            trace!(message = "advanced", from, to = best_index, score = best_score);
            return Step::Advanced {
                from,
                to: best_index,
                score: best_score,
            };
        }

        self.check_stall(now, log, clock).unwrap_or(Step::Holding {
            best_index,
            score: best_score,
        })
    }

    /// Highest scoring reference frame around the current one. Starts from
    /// the current index at zero and only a strictly better score moves it.
    fn best_match(&self, pose: &PoseFrame, live: &Descriptor) -> (usize, f32) {
        let visible = pose.visible_mask(self.scorer.visibility_threshold());
        let window = self.reference.window(self.current, self.config.search_window);
        let mut best = (self.current, 0.0);
        for index in window {
            let reference = match self.reference.descriptor(index) {
                Some(reference) => reference,
                None => continue,
            };
            let score = self.scorer.score_visible(&visible, live, reference);
            if score > best.1 {
                best = (index, score);
            }
        }
        best
    }

    fn check_stall(
        &mut self,
        now: Duration,
        log: &mut MistakeLog,
        clock: &dyn WallClock,
    ) -> Option<Step> {
        let stuck_for = self
            .last_advance
            .map_or(Duration::ZERO, |last_advance| now.saturating_sub(last_advance));
        if stuck_for <= self.config.stuck_timeout() {
            return None;
        }

        let from = self.current;
        let score = self.last_score;
        log.log_mistake(
            self.last_live
                .as_ref()
                .map(|(frame, descriptor)| (frame, descriptor)),
            self.reference.descriptor(from),
            from,
            score,
            clock.now_label(),
        );
        self.current = from
            .saturating_add(self.config.stall_skip)
            .min(self.reference.last_index());
        self.last_advance = Some(now);
        debug!(message = "stalled", from, to = self.current, score);
        Some(Step::Stalled {
            from,
            to: self.current,
            score,
        })
    }
}
