use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use tokio::sync::Notify;

use framestream::cli::Args;
use framestream::core::{FramePendingEvent, FullLoadEvent, PlaybackEndedEvent, ProgressEvent};
use framestream::mock::{MockImage, MockSource};
use framestream::{Frame, FrameRenderer, Player};

/// Renderer that only reports what it would draw.
#[derive(Default)]
struct LogRenderer {
    drawn: usize,
}

impl FrameRenderer<MockImage> for LogRenderer {
    fn prepare(&mut self, first: &Frame<MockImage>) -> Result<()> {
        info!("Surface: {}x{}", first.image().width, first.image().height);
        Ok(())
    }

    fn draw(&mut self, frame: &Frame<MockImage>) -> Result<()> {
        self.drawn += 1;
        debug!(
            "draw #{}: frame {} with {} shapes",
            self.drawn,
            frame.index(),
            frame.annotations().len()
        );
        Ok(())
    }
}

fn init_logging(args: &Args) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt.clone().unwrap_or_else(|| "framestream.log".into());
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    debug!("Command-line args: {:?}", args);

    let config = args.player_config()?;
    let timeline = config.stream.timeline()?;
    info!(
        "Timeline {}..{}ms: {} frames of {}ms",
        timeline.start(),
        timeline.end(),
        timeline.frame_count(),
        timeline.frame_duration()
    );

    let source = MockSource::new()
        .with_latency(Duration::from_millis(args.latency))
        .with_failing(args.fail.iter().copied());
    let player = Player::new(&config, source, LogRenderer::default())?;

    let ended = Arc::new(Notify::new());
    {
        let events = player.events();
        let ended = Arc::clone(&ended);
        events.subscribe::<PlaybackEndedEvent, _>(move |_| ended.notify_one());
        events.subscribe::<ProgressEvent, _>(|e| debug!("progress: frame {} at {}ms", e.index, e.timestamp));
        events.subscribe::<FramePendingEvent, _>(|e| info!("buffering frame {}", e.index));
        events.subscribe::<FullLoadEvent, _>(|e| info!("all {} frames resident", e.frame_count));
    }

    player.init().await?;
    if let Some(ts) = args.seek {
        player.seek(Some(ts)).await?;
    }
    player.start().await?;

    // A failing frame stalls playback forever; give up after twice the timeline
    let budget = Duration::from_millis(timeline.total_duration() * 2) + Duration::from_secs(5);
    if tokio::time::timeout(budget, ended.notified()).await.is_err() {
        warn!("Playback stalled at frame {}", player.stream().progress_index());
    }

    let stats = player.stream().stats();
    println!(
        "played to {}ms, fps {:.1}, loaded {}, failed {}, evicted {}, stale {}",
        player.progress(),
        player.fps().unwrap_or(0.0),
        stats.loaded(),
        stats.failed(),
        stats.evicted(),
        stats.stale()
    );

    player.close().await;
    Ok(())
}
