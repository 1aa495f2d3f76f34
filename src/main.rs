use anyhow::{Context, Result};
use config::{CoachConfig, TrackingConfig};
use indicatif::{ProgressBar, ProgressStyle};
use mistake::{LocalClock, MistakeLog};
use reference::ReferenceSequence;
use session::{Session, SessionOutputs};
use source::{JsonLinesSource, ReplaySource};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;

mod coach;
mod config;
mod error;
mod mistake;
mod normalize;
mod point;
mod pose;
mod reference;
mod region;
mod score;
mod session;
mod source;
mod summary;
mod tracker;

#[derive(structopt::StructOpt)]
struct TrackOpt {
    /// Reference recording to follow, as JSON frames of landmarks.
    #[structopt(required = true)]
    reference: PathBuf,

    /// Newline delimited JSON landmark frames, or `-` for stdin. Without it
    /// the reference is replayed against itself.
    #[structopt(long)]
    live: Option<PathBuf>,

    /// Frame rate used when replaying the reference.
    #[structopt(long, default_value = "30")]
    replay_fps: f64,

    /// Where the mistake log is written.
    #[structopt(short, long, default_value = "stuck_coordinates_log.json")]
    mistakes: PathBuf,

    /// Where the session summary is written.
    #[structopt(long, default_value = "session_stats.json")]
    summary: PathBuf,

    /// Also write coaching cues next to the mistake log.
    #[structopt(short, long)]
    analyze: bool,

    #[structopt(short, long)]
    show_progress: bool,

    #[structopt(flatten)]
    tracking: TrackingConfig,

    #[structopt(flatten)]
    coach: CoachConfig,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Follow a live performance through a reference recording and log where it got stuck.
    Track(TrackOpt),

    /// Turn a mistake log into coaching cues.
    Coach {
        /// A mistake log written by `track`.
        #[structopt(required = true)]
        mistakes: PathBuf,

        #[structopt(flatten)]
        coach: CoachConfig,
    },
}

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(subcommand)]
    command: Command,
}

fn track(opt: TrackOpt) -> Result<()> {
    let reference =
        ReferenceSequence::load(&opt.reference).context("failed loading reference sequence")?;

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrl_c = running.clone();

    ctrlc::set_handler(move || {
        running_ctrl_c.store(false, Ordering::SeqCst);
    })
    .context("failed setting Ctrl-C handler")?;

    let pb_tracking = if opt.show_progress {
        Some(
            ProgressBar::new_spinner().with_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                    .template("{prefix:.bold.dim} {spinner} {wide_msg}"),
            ),
        )
    } else {
        None
    };

    let outputs = SessionOutputs {
        mistakes: opt.mistakes,
        summary: opt.summary,
    };
    let session = Session::new(opt.tracking, &reference, running, LocalClock)
        .context("invalid tracking options")?;
    let report = match opt.live.as_deref() {
        Some(path) => session.run(|| JsonLinesSource::open(path), &outputs, pb_tracking.as_ref()),
        None => session.run(
            || ReplaySource::new(&reference, opt.replay_fps),
            &outputs,
            pb_tracking.as_ref(),
        ),
    }
    .map_err(|error| {
        let context = if error.is_persistence() {
            "failed writing session output"
        } else {
            "tracking session failed"
        };
        anyhow::Error::new(error).context(context)
    })?;

    info!(
        message = "tracking done",
        end = ?report.end,
        final_index = report.final_index,
        mistakes = report.mistakes.len(),
        xp_gained = report.summary.xp_gained,
        avg_accuracy = report.summary.avg_accuracy
    );

    if opt.analyze {
        write_analysis(&report.mistakes, &outputs.mistakes, opt.coach)?;
    }
    Ok(())
}

fn write_analysis(
    records: &[mistake::MistakeRecord],
    log_path: &Path,
    coach_config: CoachConfig,
) -> Result<()> {
    let cues = coach::analyze(records, coach_config.drift_tolerance);
    for (category, count) in coach::category_counts(&cues) {
        info!(message = "problem area", category = category.label(), count);
    }
    for cue in &cues {
        println!(
            "frame {:>5} at {} ({:.1}%) [{}] {}",
            cue.frame,
            cue.time,
            cue.score,
            cue.category.label(),
            cue.advice
        );
    }
    coach::persist(&cues, &coach::analysis_path(log_path))
        .context("failed writing coaching analysis")?;
    Ok(())
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(opt.log_level),
    )?;

    match opt.command {
        Command::Track(track_opt) => track(track_opt),
        Command::Coach { mistakes, coach } => {
            let records = MistakeLog::load(&mistakes).context("failed loading mistake log")?;
            if records.is_empty() {
                info!(message = "mistake log is empty, clean session");
            }
            write_analysis(&records, &mistakes, coach)
        }
    }
}
