use std::{
    cell::RefCell,
    io::{self, Stdout},
    path::{Path, PathBuf},
    rc::Rc,
};

use clap::{Parser, Subcommand};
use lingua_sync_core::{
    narration, BehaviorTracker, EventContext, EventExtra, IntervalScheduler, JsonLinesSink,
    SyncConfig, SyncError, SystemClock, Timeline, TimelineCoordinator, WordBoundary,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

type StdoutTracker = BehaviorTracker<JsonLinesSink<Stdout>>;

fn main() -> lingua_sync_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            script,
            duration_ms,
            seek,
            config,
        } => run_play(&script, duration_ms, seek, config.as_deref()),
        Commands::Words { words, at } => run_words(&words, at),
    }
}

fn run_play(
    script: &Path,
    duration_ms: Option<u64>,
    seek: Option<f64>,
    config: Option<&Path>,
) -> lingua_sync_core::Result<()> {
    let config = match config {
        Some(path) => SyncConfig::from_json_file(path)?,
        None => SyncConfig::default(),
    };
    let script: Script = serde_json::from_str(&std::fs::read_to_string(script)?)?;
    if script.timelines.is_empty() {
        return Err(SyncError::msg("script contains no timelines"));
    }

    let tracker: Rc<RefCell<StdoutTracker>> = Rc::new(RefCell::new(BehaviorTracker::new(
        JsonLinesSink::new(io::stdout()),
        config.tracker.clone(),
    )));
    let scheduler = IntervalScheduler::from_millis(config.coordinator.frame_interval_ms);

    let observed = tracker.clone();
    let mut coordinator = TimelineCoordinator::<Value>::new(SystemClock::new(), scheduler.clone())
        .with_config(config.coordinator.clone())
        .on_event(move |active| {
            tracing::info!(
                timeline = active.timeline,
                index = active.index,
                start_ms = active.event.start_ms,
                duration_ms = active.event.duration_ms(),
                kind = active.kind.as_str(),
                "transition"
            );
            observed.borrow_mut().track(
                format!("timeline_{}", active.kind.as_str()),
                EventContext::module("story"),
                EventExtra::data(json!({
                    "timeline": active.timeline,
                    "index": active.index,
                    "data": active.event.data,
                })),
            );
        });

    for timeline in script.timelines {
        tracing::debug!(timeline = %timeline.name, end_ms = timeline.end_ms(), "loaded timeline");
        coordinator.register_timeline(timeline.name, timeline.events)?;
    }
    if let Some(position) = seek {
        coordinator.seek(position)?;
    }

    let end_ms = duration_ms.unwrap_or_else(|| coordinator.duration_ms()) as f64;
    tracing::info!(
        timelines = coordinator.timeline_count(),
        from_ms = coordinator.current_ms(),
        end_ms,
        "starting playback"
    );

    coordinator.play();
    while let Some(frame) = scheduler.wait_next() {
        coordinator.on_frame(frame);
        tracker.borrow_mut().poll();
        if coordinator.current_ms() >= end_ms {
            coordinator.pause();
        }
    }

    tracing::info!(at_ms = coordinator.current_ms(), "playback finished");
    let delivered = tracker.borrow_mut().flush()?;
    tracing::debug!(delivered, "final behaviour flush");
    Ok(())
}

fn run_words(path: &Path, at: f64) -> lingua_sync_core::Result<()> {
    let file: WordsFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let words = &file.word_boundaries;

    let index = narration::active_word_index(at, words);
    let durations: Vec<u64> = words.iter().map(|word| word.duration_ms).collect();
    let step = narration::current_step(at, &narration::step_starts(&durations));
    let total = narration::estimated_total_ms(words).unwrap_or(0);

    let summary = json!({
        "at_ms": at,
        "active_word_index": index,
        "active_word": index.and_then(|i| words.get(i)).map(|word| word.text.as_str()),
        "step": step,
        "total_ms": total,
        "progress": narration::progress(at, total as f64),
    });
    println!("{summary}");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Timelines to play, as exported by the lesson editor.
#[derive(Debug, Deserialize)]
struct Script {
    timelines: Vec<Timeline<Value>>,
}

/// Text-to-speech timestamp payload.
#[derive(Debug, Deserialize)]
struct WordsFile {
    word_boundaries: Vec<WordBoundary>,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Synchronised timeline playback for lessons", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a timeline script in real time, printing behaviour batches to stdout.
    Play {
        /// JSON file with a `timelines` array.
        script: PathBuf,
        /// Stop after this many milliseconds of playback position.
        #[arg(short, long)]
        duration_ms: Option<u64>,
        /// Start from this position instead of zero.
        #[arg(short, long)]
        seek: Option<f64>,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Report which word of a narration is highlighted at a position.
    Words {
        /// JSON file with a `word_boundaries` array.
        words: PathBuf,
        /// Playback position in milliseconds.
        #[arg(long)]
        at: f64,
    },
}
