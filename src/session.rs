use crate::{
    config::TrackingConfig,
    error::Error,
    mistake::{MistakeLog, MistakeRecord, WallClock},
    reference::ReferenceSequence,
    source::LandmarkSource,
    summary::SessionSummary,
    tracker::{ProgressionTracker, Step},
};
use indicatif::ProgressBar;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{error, info, instrument};

/// Where a session writes its results.
#[derive(Debug, Clone)]
pub(crate) struct SessionOutputs {
    pub(crate) mistakes: PathBuf,
    pub(crate) summary: PathBuf,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The performer reached the end of the reference sequence.
    Completed,
    /// The live input ran out first.
    InputExhausted,
    /// Interrupted from outside.
    Cancelled,
}

#[derive(Debug, Clone)]
pub(crate) struct SessionReport {
    pub(crate) end: SessionEnd,
    pub(crate) summary: SessionSummary,
    pub(crate) mistakes: Vec<MistakeRecord>,
    pub(crate) final_index: usize,
}

/// One run of a performer against a reference sequence.
pub(crate) struct Session<'a, C> {
    config: TrackingConfig,
    reference: &'a ReferenceSequence,
    running: Arc<AtomicBool>,
    clock: C,
}

impl<'a, C> Session<'a, C>
where
    C: WallClock,
{
    pub(crate) fn new(
        config: TrackingConfig,
        reference: &'a ReferenceSequence,
        running: Arc<AtomicBool>,
        clock: C,
    ) -> Result<Self, Error> {
        Ok(Self {
            config: config.validate()?,
            reference,
            running,
            clock,
        })
    }

    /// Acquire a landmark source, track it until it runs out, the sequence
    /// is completed or the session is cancelled, then write the mistake log
    /// and the summary.
    ///
    /// Output is written on every path, including a failed acquisition (an
    /// empty log and a zeroed summary) and a read error part way through.
    /// Both files are attempted even when one of them can't be written. A
    /// failed acquisition or read is returned ahead of any write failure.
    #[instrument(name = "Session::run", skip(self, acquire, outputs, progress))]
    pub(crate) fn run<S, F>(
        &self,
        acquire: F,
        outputs: &SessionOutputs,
        progress: Option<&ProgressBar>,
    ) -> Result<SessionReport, Error>
    where
        S: LandmarkSource,
        F: FnOnce() -> Result<S, Error>,
    {
        let mut source = match acquire() {
            Ok(source) => source,
            Err(acquire_error) => {
                error!(message = "failed to acquire landmark source", error = %acquire_error);
                // Any write failure has already been logged.
                let _ = persist_outputs(
                    &MistakeLog::new(self.config.visibility_threshold),
                    &SessionSummary::zeroed(),
                    outputs,
                );
                return Err(acquire_error);
            }
        };

        let mut tracker = ProgressionTracker::new(self.reference, self.config);
        let mut log = MistakeLog::new(self.config.visibility_threshold);
        let outcome = self.track(&mut source, &mut tracker, &mut log, progress);
        drop(source);

        if let Err(read_error) = &outcome {
            error!(message = "landmark stream failed, finalizing", error = %read_error);
        }

        let summary = match SessionSummary::from_scores(
            tracker.total_score(),
            tracker.frames_tracked(),
            self.reference.len(),
        ) {
            Ok(summary) => summary,
            Err(summary_error) => {
                error!(message = "failed to summarize session", error = %summary_error);
                SessionSummary::zeroed()
            }
        };
        let persisted = persist_outputs(&log, &summary, outputs);

        let end = outcome?;
        persisted?;
        if let Some(progress) = progress {
            progress.finish_with_message(format!(
                "{:?}: {} mistakes, {:.1}% accuracy, {} xp",
                end,
                log.len(),
                summary.avg_accuracy,
                summary.xp_gained
            ));
        }
        info!(
            message = "session finished",
            end = ?end,
            final_index = tracker.current_index(),
            mistakes = log.len(),
            xp_gained = summary.xp_gained,
            avg_accuracy = summary.avg_accuracy
        );

        Ok(SessionReport {
            end,
            summary,
            mistakes: log.records().to_vec(),
            final_index: tracker.current_index(),
        })
    }

    fn track<S>(
        &self,
        source: &mut S,
        tracker: &mut ProgressionTracker<'_>,
        log: &mut MistakeLog,
        progress: Option<&ProgressBar>,
    ) -> Result<SessionEnd, Error>
    where
        S: LandmarkSource,
    {
        let last_index = self.reference.last_index();
        loop {
            if !self.running.load(Ordering::SeqCst) {
                info!(message = "session cancelled", index = tracker.current_index());
                return Ok(SessionEnd::Cancelled);
            }

            let detection = match source.next_detection()? {
                Some(detection) => detection,
                None => return Ok(SessionEnd::InputExhausted),
            };
            let step = tracker.observe(&detection, log, &self.clock);

            if let Some(progress) = progress {
                let status = match step {
                    Step::Advanced { score, .. } | Step::Holding { score, .. } => {
                        format!("score {:.1}", score)
                    }
                    Step::Stalled { from, .. } => format!("stuck at frame {}", from),
                    Step::Skipped => "no pose".to_owned(),
                };
                progress.set_message(format!(
                    "frame {}/{} {} mistakes: {}",
                    tracker.current_index(),
                    last_index,
                    status,
                    log.len()
                ));
                progress.inc(1);
            }

            if tracker.is_finished() {
                return Ok(SessionEnd::Completed);
            }
        }
    }
}

/// Write the mistake log and the summary, attempting both regardless of
/// failures. Returns the first write error.
fn persist_outputs(
    log: &MistakeLog,
    summary: &SessionSummary,
    outputs: &SessionOutputs,
) -> Result<(), Error> {
    let mistakes = log.persist(&outputs.mistakes);
    if let Err(write_error) = &mistakes {
        error!(message = "failed to write mistake log", error = %write_error);
    }
    let stats = summary.persist(&outputs.summary);
    if let Err(write_error) = &stats {
        error!(message = "failed to write session summary", error = %write_error);
    }
    mistakes.and(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pose::Detection,
        source::ReplaySource,
        tracker::test_util::{turning_reference, FixedClock},
    };
    use assert_approx_eq::assert_approx_eq;
    use std::{cell::Cell, fs, path::Path, rc::Rc, time::Duration};

    /// Plays back a fixed list of reads and counts how often it is dropped.
    struct ScriptedSource {
        script: Box<dyn Iterator<Item = Result<Detection, Error>>>,
        released: Rc<Cell<usize>>,
    }

    impl ScriptedSource {
        fn new(
            script: impl Iterator<Item = Result<Detection, Error>> + 'static,
            released: Rc<Cell<usize>>,
        ) -> Self {
            Self {
                script: Box::new(script),
                released,
            }
        }
    }

    impl LandmarkSource for ScriptedSource {
        fn next_detection(&mut self) -> Result<Option<Detection>, Error> {
            self.script.next().transpose()
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.released.set(self.released.get() + 1);
        }
    }

    fn outputs(dir: &Path) -> SessionOutputs {
        SessionOutputs {
            mistakes: dir.join("mistakes").join("session.json"),
            summary: dir.join("session_stats.json"),
        }
    }

    fn session(reference: &ReferenceSequence) -> Session<'_, FixedClock> {
        Session::new(
            TrackingConfig::default(),
            reference,
            Arc::new(AtomicBool::new(true)),
            FixedClock,
        )
        .unwrap()
    }

    fn every_40ms(
        frames: u32,
        detection: impl Fn(Duration) -> Detection + 'static,
    ) -> impl Iterator<Item = Result<Detection, Error>> {
        (0..frames).map(move |i| Ok(detection(Duration::from_millis(40) * i)))
    }

    fn read_summary(path: &Path) -> SessionSummary {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn perfect_replay() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = outputs(dir.path());
        let reference = turning_reference(100);

        let report = session(&reference)
            .run(|| ReplaySource::new(&reference, 25.0), &outputs, None)
            .unwrap();

        assert_eq!(report.end, SessionEnd::Completed);
        assert!(report.mistakes.is_empty());
        assert!(report.final_index >= 95);
        assert_approx_eq!(report.summary.avg_accuracy, 100.0, 0.1);
        assert_eq!(fs::read_to_string(&outputs.mistakes).unwrap(), "[]");
        assert_eq!(read_summary(&outputs.summary), report.summary);
    }

    #[test]
    fn frozen_performer_is_pushed_to_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = outputs(dir.path());
        let reference = turning_reference(100);
        let frozen = reference.get(10).unwrap().pose.clone();
        let released = Rc::new(Cell::new(0));

        let report = session(&reference)
            .run(
                || {
                    Ok(ScriptedSource::new(
                        every_40ms(2000, move |t| Detection::new(t, Some(frozen.clone()))),
                        released.clone(),
                    ))
                },
                &outputs,
                None,
            )
            .unwrap();

        assert_eq!(report.end, SessionEnd::Completed);
        assert_eq!(report.final_index, 99);
        let stuck_at = report
            .mistakes
            .iter()
            .map(|record| record.frame_index)
            .collect::<Vec<_>>();
        assert_eq!(stuck_at, vec![10, 30, 50, 70, 90]);
        assert_eq!(released.get(), 1);
        assert_eq!(MistakeLog::load(&outputs.mistakes).unwrap(), report.mistakes);
    }

    #[test]
    fn input_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = outputs(dir.path());
        let reference = turning_reference(100);
        let pose = reference.get(4).unwrap().pose.clone();
        let released = Rc::new(Cell::new(0));

        let report = session(&reference)
            .run(
                || {
                    Ok(ScriptedSource::new(
                        every_40ms(3, move |t| Detection::new(t, Some(pose.clone()))),
                        released.clone(),
                    ))
                },
                &outputs,
                None,
            )
            .unwrap();

        assert_eq!(report.end, SessionEnd::InputExhausted);
        assert_eq!(report.final_index, 4);
        assert_eq!(released.get(), 1);
        assert_approx_eq!(report.summary.avg_accuracy, 100.0, 0.1);
        assert!((59..=60).contains(&report.summary.xp_gained));
    }

    #[test]
    fn cancelled_session_still_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = outputs(dir.path());
        let reference = turning_reference(100);
        let running = Arc::new(AtomicBool::new(true));
        let released = Rc::new(Cell::new(0));

        // Cancel once three frames have been handed out.
        let stop = running.clone();
        let script = (0..1000_u32).map(move |i| {
            if i == 2 {
                stop.store(false, Ordering::SeqCst);
            }
            Ok::<_, Error>(Detection::miss(Duration::from_millis(40) * i))
        });

        let report = Session::new(TrackingConfig::default(), &reference, running, FixedClock)
            .unwrap()
            .run(
                || Ok(ScriptedSource::new(script, released.clone())),
                &outputs,
                None,
            )
            .unwrap();

        assert_eq!(report.end, SessionEnd::Cancelled);
        assert_eq!(released.get(), 1);
        assert!(outputs.mistakes.exists());
        assert_eq!(read_summary(&outputs.summary), report.summary);
    }

    #[test]
    fn failed_acquisition_writes_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = outputs(dir.path());
        let reference = turning_reference(100);

        let err = session(&reference)
            .run(
                || -> Result<ReplaySource, Error> {
                    Err(Error::OpenLiveSource(
                        std::io::Error::new(std::io::ErrorKind::NotFound, "no camera"),
                        PathBuf::from("/dev/video0"),
                    ))
                },
                &outputs,
                None,
            )
            .unwrap_err();

        assert!(matches!(err, Error::OpenLiveSource(..)));
        assert_eq!(fs::read_to_string(&outputs.mistakes).unwrap(), "[]");
        assert_eq!(read_summary(&outputs.summary), SessionSummary::zeroed());
    }

    #[test]
    fn read_error_still_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = outputs(dir.path());
        let reference = turning_reference(100);
        let pose = reference.get(6).unwrap().pose.clone();
        let released = Rc::new(Cell::new(0));

        let script = vec![
            Ok(Detection::new(Duration::ZERO, Some(pose))),
            Err(Error::ReadLiveFrame(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "camera unplugged",
            ))),
        ];

        let err = session(&reference)
            .run(
                || Ok(ScriptedSource::new(script.into_iter(), released.clone())),
                &outputs,
                None,
            )
            .unwrap_err();

        assert!(matches!(err, Error::ReadLiveFrame(_)));
        assert_eq!(released.get(), 1);
        let summary = read_summary(&outputs.summary);
        assert!((59..=60).contains(&summary.xp_gained));
        assert!(MistakeLog::load(&outputs.mistakes).unwrap().is_empty());
    }

    fn unavailable_camera() -> Result<ReplaySource, Error> {
        Err(Error::OpenLiveSource(
            std::io::Error::new(std::io::ErrorKind::NotFound, "no camera"),
            PathBuf::from("/dev/video0"),
        ))
    }

    /// Occupies the mistake log path with a directory so writing it fails.
    fn block_mistake_log(outputs: &SessionOutputs) {
        fs::create_dir_all(&outputs.mistakes).unwrap();
    }

    #[test]
    fn failed_acquisition_is_reported_over_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = outputs(dir.path());
        block_mistake_log(&outputs);
        let reference = turning_reference(100);

        let err = session(&reference)
            .run(unavailable_camera, &outputs, None)
            .unwrap_err();

        assert!(matches!(err, Error::OpenLiveSource(..)));
        assert_eq!(read_summary(&outputs.summary), SessionSummary::zeroed());
    }

    #[test]
    fn summary_written_when_mistake_log_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = outputs(dir.path());
        block_mistake_log(&outputs);
        let reference = turning_reference(100);
        let pose = reference.get(4).unwrap().pose.clone();
        let released = Rc::new(Cell::new(0));

        let err = session(&reference)
            .run(
                || {
                    Ok(ScriptedSource::new(
                        every_40ms(3, move |t| Detection::new(t, Some(pose.clone()))),
                        released.clone(),
                    ))
                },
                &outputs,
                None,
            )
            .unwrap_err();

        assert!(matches!(err, Error::WriteMistakeLog(..)));
        assert!(err.is_persistence());
        assert_eq!(released.get(), 1);
        assert!((59..=60).contains(&read_summary(&outputs.summary).xp_gained));
    }

    #[test]
    fn read_error_is_reported_over_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = outputs(dir.path());
        block_mistake_log(&outputs);
        let reference = turning_reference(100);
        let released = Rc::new(Cell::new(0));

        let script = vec![Err(Error::ReadLiveFrame(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "camera unplugged",
        )))];

        let err = session(&reference)
            .run(
                || Ok(ScriptedSource::new(script.into_iter(), released.clone())),
                &outputs,
                None,
            )
            .unwrap_err();

        assert!(matches!(err, Error::ReadLiveFrame(_)));
        assert_eq!(read_summary(&outputs.summary), SessionSummary::zeroed());
    }

    #[test]
    fn late_starting_clock_tracks_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = outputs(dir.path());
        let reference = turning_reference(100);
        let released = Rc::new(Cell::new(0));
        let poses = reference
            .iter()
            .map(|frame| frame.pose.clone())
            .collect::<Vec<_>>();

        // Timestamps from a detector that has been up for a minute.
        let script = poses.into_iter().enumerate().map(|(i, pose)| {
            let at = Duration::from_secs(60) + Duration::from_millis(40) * i as u32;
            Ok::<_, Error>(Detection::new(at, Some(pose)))
        });

        let report = session(&reference)
            .run(
                || Ok(ScriptedSource::new(script, released.clone())),
                &outputs,
                None,
            )
            .unwrap();

        assert_eq!(report.end, SessionEnd::Completed);
        assert!(report.mistakes.is_empty());
    }

    #[test]
    fn rejects_invalid_config() {
        let reference = turning_reference(10);
        let mut config = TrackingConfig::default();
        config.stuck_timeout_secs = -1.0;
        let session = Session::new(
            config,
            &reference,
            Arc::new(AtomicBool::new(true)),
            FixedClock,
        );
        assert!(matches!(session, Err(Error::InvalidConfig(_))));
    }
}
