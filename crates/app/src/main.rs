use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use pilites_core::{
    build_frame, create_sink, AppConfig, Channel, Controller, FileStore, Message, PiLitesError,
    Play, PlayStore, Subscription,
};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> pilites_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Render {
            play,
            channels,
            cue,
            at,
        } => run_render(&play, &channels, cue, at),
        Commands::Run {
            play_id,
            live,
            advance_every,
        } => run_session(config, &play_id, live, advance_every).await,
        Commands::List => run_list(&config),
    }
}

fn load_config(cli: &Cli) -> pilites_core::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply_env()?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if cli.mock {
        config.mock_hardware = true;
    }
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> pilites_core::Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn run_render(play: &PathBuf, channels: &PathBuf, cue: usize, at: f64) -> pilites_core::Result<()> {
    tracing::info!(?play, cue, at, "rendering single frame");
    let play: Play = read_json(play)?;
    play.validate()?;
    let channels: Vec<Channel> = read_json(channels)?;
    if cue >= play.cues.len() {
        return Err(PiLitesError::InvalidInput("cue index is past the last cue"));
    }

    let frame = build_frame(&play, &channels, cue, at.max(0.0));
    println!("{}", Message::Frame(frame).to_json()?);
    Ok(())
}

fn run_list(config: &AppConfig) -> pilites_core::Result<()> {
    let store = FileStore::new(&config.data_dir);
    for play in store.list_plays()? {
        println!("{}\t{}", play.id, play.name);
    }
    Ok(())
}

/// Prints every message of a subscription as one JSON line until the
/// observer is disconnected.
fn print_messages(mut subscription: Subscription) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = subscription.recv_text().await {
            println!("{text}");
        }
    })
}

async fn run_session(
    config: AppConfig,
    play_id: &str,
    live: bool,
    advance_every: f64,
) -> pilites_core::Result<()> {
    if !advance_every.is_finite() || advance_every <= 0.0 {
        return Err(PiLitesError::InvalidInput("--advance-every must be a positive number of seconds"));
    }

    let store = Arc::new(FileStore::create_dirs(&config.data_dir)?);
    let cue_count = store.load_play(play_id)?.cues.len();
    let sink = create_sink(config.mock_hardware);
    let controller = Controller::new(config, store, sink);

    let subscription = if live {
        controller.subscribe_live()?
    } else {
        controller.subscribe_preview()?
    };
    let observer = subscription.id;
    let printer = print_messages(subscription);

    if live {
        controller.start_live(play_id).await?;
    } else {
        controller.start_preview(play_id).await?;
    }
    tracing::info!(play_id, live, cue_count, advance_every, "session running");

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(advance_every));
    ticker.tick().await;
    let mut cue = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            _ = ticker.tick() => {
                if cue + 1 >= cue_count {
                    break;
                }
                let advanced = if live {
                    controller.advance_live()
                } else {
                    controller.advance_preview()
                };
                if let Err(err) = advanced {
                    tracing::warn!(%err, "session ended early");
                    break;
                }
                cue += 1;
            }
        }
    }

    controller.shutdown().await?;
    let broadcaster = if live {
        controller.live_broadcaster()
    } else {
        controller.preview_broadcaster()
    };
    broadcaster.disconnect(observer)?;
    let _ = printer.await;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Theatrical LED cue engine", long_about = None)]
struct Cli {
    /// JSON configuration file. `PILITES_*` environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding `channels.json` and the `plays/` folder.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Use the in-memory sink instead of LED hardware.
    #[arg(long, global = true)]
    mock: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render one frame of a play file and print it as JSON.
    Render {
        /// Path to a play document.
        play: PathBuf,
        /// Path to a channel list document.
        channels: PathBuf,
        /// Zero-based cue index.
        #[arg(long, default_value_t = 0)]
        cue: usize,
        /// Seconds since the cue started.
        #[arg(long, default_value_t = 0.0)]
        at: f64,
    },
    /// Play a stored play, printing every broadcast message as a JSON line.
    Run {
        play_id: String,
        /// Drive the hardware instead of previewing.
        #[arg(long)]
        live: bool,
        /// Seconds between automatic cue advances.
        #[arg(long, default_value_t = 5.0)]
        advance_every: f64,
    },
    /// List the plays in the data directory.
    List,
}
