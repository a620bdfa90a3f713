use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::{self, PlayerConfig, StreamConfig};
use crate::entities::Timestamp;

/// Default timeline when no config file is given: 10 seconds
const DEFAULT_END: Timestamp = 10_000;

/// Frame buffering demo: plays a synthetic timeline through the prefetching stream
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON config file (falls back to FRAMESTREAM_CONFIG)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Timeline start timestamp (ms)
    #[arg(long = "start", value_name = "MS")]
    pub start: Option<Timestamp>,

    /// Timeline end timestamp (ms)
    #[arg(long = "end", value_name = "MS")]
    pub end: Option<Timestamp>,

    /// Frame duration (ms)
    #[arg(short = 'd', long = "frame-duration", value_name = "MS")]
    pub frame_duration: Option<u64>,

    /// Maximum number of resident frames
    #[arg(long = "cache", value_name = "N")]
    pub max_cache_frame_count: Option<usize>,

    /// Concurrent fetch tasks
    #[arg(short = 'j', long = "concurrency", value_name = "N")]
    pub concurrency: Option<usize>,

    /// Timer interval (ms, default: frame duration)
    #[arg(long = "tick", value_name = "MS")]
    pub tick_interval: Option<u64>,

    /// Seek to this timestamp before playing
    #[arg(short = 's', long = "seek", value_name = "MS")]
    pub seek: Option<Timestamp>,

    /// Simulated fetch latency of the mock source (ms)
    #[arg(long = "latency", value_name = "MS", default_value_t = 20)]
    pub latency: u64,

    /// Frame indices whose fetch fails (can be specified multiple times)
    #[arg(long = "fail", value_name = "INDEX")]
    pub fail: Vec<usize>,

    /// Enable logging to file (default: framestream.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Config file (if any) with command-line overrides applied.
    pub fn player_config(&self) -> Result<PlayerConfig> {
        let mut config = match config::config_path(self.config.clone()) {
            Some(path) => PlayerConfig::from_json_file(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PlayerConfig::new(StreamConfig::new(0, DEFAULT_END)),
        };

        let stream = &mut config.stream;
        if let Some(v) = self.start {
            stream.start_timestamp = v;
        }
        if let Some(v) = self.end {
            stream.end_timestamp = v;
        }
        if let Some(v) = self.frame_duration {
            stream.frame_duration = v;
        }
        if let Some(v) = self.max_cache_frame_count {
            stream.max_cache_frame_count = v;
        }
        if let Some(v) = self.concurrency {
            stream.concurrency = v;
        }
        if self.tick_interval.is_some() {
            config.tick_interval = self.tick_interval;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "framestream",
            "--end",
            "2000",
            "-d",
            "40",
            "--cache",
            "8",
            "-j",
            "3",
            "--fail",
            "2",
            "--fail",
            "5",
            "-vv",
        ]);
        let config = args.player_config().unwrap();
        assert_eq!(config.stream.start_timestamp, 0);
        assert_eq!(config.stream.end_timestamp, 2000);
        assert_eq!(config.stream.frame_duration, 40);
        assert_eq!(config.stream.max_cache_frame_count, 8);
        assert_eq!(config.stream.concurrency, 3);
        assert_eq!(config.tick_interval().as_millis(), 40);
        assert_eq!(args.fail, vec![2, 5]);
        assert_eq!(args.verbosity, 2);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = Args::parse_from(["framestream", "--start", "500", "--end", "100"]);
        assert!(args.player_config().is_err());
    }

    #[test]
    fn test_log_flag_optional_value() {
        let args = Args::parse_from(["framestream", "-l"]);
        assert_eq!(args.log_file, Some(None));
        let args = Args::parse_from(["framestream", "--log", "out.log"]);
        assert_eq!(args.log_file, Some(Some(PathBuf::from("out.log"))));
    }
}
