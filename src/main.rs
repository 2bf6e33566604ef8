//! drumbot CLI.
//!
//! Inspect motion plans, replay controller decisions and run practice sessions
//! on real or simulated arms.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::Receiver;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use drumbot::{load_rig_config, replay_history, JudgementFeed, PracticeSession, ScoreSource};
use drumbot_core::driver::{DobotFactory, DriverFactory, SimulatedFactory};
use drumbot_core::entrainment::{history_from_json, loop_from_json, LoopJudgements};
use drumbot_core::{
    compile_score, ActuatorManager, ControllerConfig, EventSink, RigConfig, SchedulerEvent, Score, TrackName,
};

#[derive(Parser)]
#[command(name = "drumbot")]
#[command(version, about = "Drive drum-striking robot arms from a practice score")]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the compiled motion plan as JSON
    Plan {
        #[command(flatten)]
        score: ScoreArgs,

        /// Only this track
        #[arg(short, long, value_enum)]
        track: Option<TrackArg>,

        /// Rig configuration (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the lead-in needed before the first stroke
    PrepTime {
        #[command(flatten)]
        score: ScoreArgs,

        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Calibration table (csv, json or yaml)
        #[arg(long)]
        calibration: Option<PathBuf>,
    },

    /// Run a controller over a recorded judgement history
    Replay {
        /// JSON array of loops, each an array of judgements
        #[arg(long)]
        history: PathBuf,

        /// passthrough, linear or staged (default: from config)
        #[arg(long)]
        controller: Option<String>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Play a score until Ctrl-C, a time limit or a loop limit
    Play {
        #[command(flatten)]
        score: ScoreArgs,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        calibration: Option<PathBuf>,

        #[arg(long)]
        controller: Option<String>,

        /// Use in-memory arms instead of serial ports
        #[arg(long)]
        simulate: bool,

        /// Seconds between starting and the first loop (default: estimated)
        #[arg(long)]
        lead_in: Option<f64>,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<f64>,

        /// Stop each arm after this many loops
        #[arg(long)]
        loops: Option<usize>,

        /// Read one JSON loop of judgements per line and feed the controller
        #[arg(long)]
        judgements_stdin: bool,

        /// Print scheduler events as JSON lines
        #[arg(long)]
        events: bool,
    },

    /// List embedded practice scores
    Demos,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TrackArg {
    #[value(alias = "left")]
    Top,
    #[value(alias = "right")]
    Bottom,
}

impl From<TrackArg> for TrackName {
    fn from(arg: TrackArg) -> Self {
        match arg {
            TrackArg::Top => TrackName::Top,
            TrackArg::Bottom => TrackName::Bottom,
        }
    }
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct ScoreArgs {
    /// Score file (JSON)
    #[arg(short, long)]
    score: Option<PathBuf>,

    /// Embedded score name (see `drumbot demos`)
    #[arg(short, long)]
    demo: Option<String>,
}

impl ScoreArgs {
    fn source(&self) -> Result<ScoreSource> {
        match (&self.score, &self.demo) {
            (Some(path), _) => Ok(ScoreSource::File(path.clone())),
            (None, Some(name)) => Ok(ScoreSource::Demo(name.clone())),
            (None, None) => bail!("either --score or --demo is required"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Plan { score, track, config } => {
            let config = rig_config(config.as_deref(), None, None)?;
            let score = score.source()?.load().context("loading score")?;
            let only = track.map(TrackName::from);

            let plans: Vec<_> = compile_score(&score, &config)
                .into_iter()
                .filter(|plan| only.map_or(true, |t| plan.track == t))
                .collect();
            println!("{}", serde_json::to_string_pretty(&plans)?);
        }

        Commands::PrepTime {
            score,
            config,
            calibration,
        } => {
            let config = rig_config(config.as_deref(), calibration, None)?;
            let score = score.source()?.load().context("loading score")?;
            let session = PracticeSession::from_config(config, Arc::new(SimulatedFactory::new()))?;
            println!("{:.3}", session.lead_in_s(&score));
        }

        Commands::Replay {
            history,
            controller,
            config,
        } => {
            let config = rig_config(config.as_deref(), None, controller.as_deref())?;
            let source = std::fs::read_to_string(&history)
                .with_context(|| format!("reading {}", history.display()))?;
            let loops = history_from_json(&source)?;

            for step in replay_history(&config.controller, &loops) {
                println!("{}", serde_json::to_string(&step)?);
            }
        }

        Commands::Play {
            score,
            config,
            calibration,
            controller,
            simulate,
            lead_in,
            seconds,
            loops,
            judgements_stdin,
            events,
        } => {
            let config = rig_config(config.as_deref(), calibration, controller.as_deref())?;
            let score = score.source()?.load().context("loading score")?;
            let factory: Arc<dyn DriverFactory> = if simulate {
                Arc::new(SimulatedFactory::new())
            } else {
                Arc::new(DobotFactory::new())
            };
            play(
                config,
                factory,
                &score,
                PlayOptions {
                    lead_in,
                    seconds,
                    loops,
                    judgements_stdin,
                    events,
                },
            )?;
        }

        Commands::Demos => {
            for name in drumbot_scores::list_scores() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}

fn rig_config(path: Option<&Path>, calibration: Option<PathBuf>, controller: Option<&str>) -> Result<RigConfig> {
    let mut config = load_rig_config(path).context("loading rig configuration")?;
    if let Some(path) = calibration {
        config.calibration.path = Some(path);
    }
    if let Some(kind) = controller {
        config.controller =
            ControllerConfig::from_kind(kind).ok_or_else(|| anyhow!("unknown controller '{}'", kind))?;
    }
    Ok(config)
}

struct PlayOptions {
    lead_in: Option<f64>,
    seconds: Option<f64>,
    loops: Option<usize>,
    judgements_stdin: bool,
    events: bool,
}

fn play(config: RigConfig, factory: Arc<dyn DriverFactory>, score: &Score, options: PlayOptions) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_ctrlc = stop.clone();
    ctrlc::set_handler(move || {
        stop_for_ctrlc.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    let calibration = Arc::new(drumbot_core::load_calibration(&config)?);
    let mut manager = ActuatorManager::new(config, calibration, factory).with_max_loops(options.loops);
    if options.events {
        let (tx, rx) = crossbeam_channel::unbounded();
        manager = manager.with_events(EventSink::new(tx));
        thread::Builder::new()
            .name("events".to_string())
            .spawn(move || print_events(rx))?;
    }

    let mut session = PracticeSession::new(manager);
    let mut judgements = if options.judgements_stdin {
        JudgementFeed::new(spawn_judgement_reader()?)
    } else {
        JudgementFeed::closed()
    };

    let master_start = session.start(score, options.lead_in)?;
    let deadline = options
        .seconds
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| master_start + Duration::from_secs_f64(s));

    while session.is_running() {
        if stop.load(Ordering::SeqCst) {
            info!("interrupted");
            break;
        }
        if deadline.map_or(false, |d| Instant::now() >= d) {
            info!("time limit reached");
            break;
        }
        if let Some(loop_judgements) = judgements.next(Duration::from_millis(50)) {
            if let Some(log) = session.feed_loop(loop_judgements) {
                info!("{}", log);
            }
        }
    }

    session.stop();
    let outcomes = session.join();
    let mut failed = 0;
    for (track, outcome) in &outcomes {
        match outcome {
            Ok(()) => info!(track = %track, "actuator finished"),
            Err(e) => {
                failed += 1;
                error!(track = %track, error = %e, "actuator failed");
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} actuators failed", failed, outcomes.len());
    }
    Ok(())
}

/// Feed stdin lines to the main loop. Malformed lines are skipped.
fn spawn_judgement_reader() -> Result<Receiver<LoopJudgements>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new().name("judgements".to_string()).spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match loop_from_json(&line) {
                Ok(judgements) => {
                    if tx.send(judgements).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "skipping judgement line"),
            }
        }
    })?;
    Ok(rx)
}

fn print_events(rx: Receiver<SchedulerEvent>) {
    for event in rx {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "could not encode event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_track_accepts_names_and_aliases() {
        let cli = Cli::try_parse_from(["drumbot", "plan", "--demo", "tutorial", "--track", "bottom"]).unwrap();
        assert!(matches!(cli.command, Commands::Plan { track: Some(TrackArg::Bottom), .. }));

        let cli = Cli::try_parse_from(["drumbot", "plan", "--demo", "tutorial", "-t", "left"]).unwrap();
        match cli.command {
            Commands::Plan { track, .. } => assert_eq!(track.map(TrackName::from), Some(TrackName::Top)),
            _ => panic!("expected plan"),
        }
    }

    #[test]
    fn test_plan_track_rejects_unknown_value() {
        let err = Cli::try_parse_from(["drumbot", "plan", "--demo", "tutorial", "--track", "middle"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn test_score_and_demo_are_exclusive() {
        assert!(Cli::try_parse_from(["drumbot", "plan", "--demo", "tutorial", "--score", "a.json"]).is_err());
        assert!(Cli::try_parse_from(["drumbot", "plan"]).is_err());
    }
}
