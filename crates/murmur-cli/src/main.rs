//! Murmur replay binary.
//!
//! # Usage
//!
//! ```bash
//! # Print the transcript a participant would see after the script ran
//! murmur channel.json --participant u2 --name Bea
//!
//! # Print every rendered frame
//! murmur channel.json --follow --log-level debug
//! ```

use std::{
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use murmur_cli::{ReplayOptions, Script, replay};
use murmur_core::{SessionConfig, Theme};
use murmur_proto::{ChannelId, ParticipantId};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Murmur channel replay
#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(about = "Replay a scripted chat channel and print its transcript")]
#[command(version)]
struct Args {
    /// Replay script (JSON)
    script: PathBuf,

    /// Channel to join
    #[arg(short, long, default_value = "general")]
    channel: String,

    /// Local participant id
    #[arg(short, long, default_value = "me")]
    participant: String,

    /// Local display name
    #[arg(short, long, default_value = "Me")]
    name: String,

    /// Replay only the most recent N events (0 replays the whole log)
    #[arg(long, default_value = "50")]
    since_limit: usize,

    /// Media fetch timeout in milliseconds
    #[arg(long, default_value = "10000")]
    media_timeout_ms: u64,

    /// Theme used when remote config has none
    #[arg(long, default_value = "classic")]
    theme: Theme,

    /// Longest wait for media and sends after the last step, in milliseconds
    #[arg(long, default_value = "5000")]
    settle_ms: u64,

    /// Print every rendered frame, not just the final transcript
    #[arg(long)]
    follow: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let script = Script::load(&args.script)?;
    tracing::info!(script = %args.script.display(), steps = script.steps.len(), "replaying");

    let mut session = SessionConfig::new(ParticipantId::new(args.participant), args.name);
    session.since_limit = (args.since_limit > 0).then_some(args.since_limit);
    session.media_timeout = Duration::from_millis(args.media_timeout_ms);
    session.default_theme = args.theme;

    let options = ReplayOptions {
        channel: ChannelId::new(args.channel),
        session,
        settle: Duration::from_millis(args.settle_ms),
    };

    let echo = args.follow.then(io::stdout);
    let view = replay(&script, options, echo).await?;

    let mut out = io::stdout().lock();
    if args.follow {
        writeln!(out, "=== final")?;
    }
    out.write_all(view.to_text().as_bytes())?;
    out.flush()?;

    Ok(())
}
