use anyhow::Context;
use clap::{Parser, Subcommand};
use lib::bot::Bot;
use lib::channels::{SlackClient, SocketModeListener};
use lib::dispatch::{Dispatcher, TaskEvent, TaskKind};
use lib::models::Models;
use lib::ocr::{OcrEngine, TesseractEngine};
use lib::pipeline::{ImageFetcher, PlatePipeline};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "kestrel")]
#[command(about = "Kestrel CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the Slack license plate bot (Socket Mode) until Ctrl-C. Needs SLACK_BOT_TOKEN and SLACK_APP_TOKEN (or config).
    Bot {
        /// Config file path (default: KESTREL_CONFIG_PATH or ~/.kestrel/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run OCR and plate matching on a local image file.
    Extract {
        /// Config file path (default: KESTREL_CONFIG_PATH or ~/.kestrel/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Image file (png, jpeg, gif, webp, bmp, tiff).
        image: PathBuf,
    },

    /// Categorize each line of TEXT (or stdin) against the configured categories.
    Categorize {
        /// Config file path (default: KESTREL_CONFIG_PATH or ~/.kestrel/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Text to categorize; read from stdin when omitted.
        text: Option<String>,
    },

    /// Summarize TEXT (or stdin).
    Summarize {
        /// Config file path (default: KESTREL_CONFIG_PATH or ~/.kestrel/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Text to summarize; read from stdin when omitted.
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if matches!(cli.command, Some(Commands::Bot { .. })) {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("kestrel {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Bot { config }) => run_bot(config).await.context("bot failed"),
        Some(Commands::Extract { config, image }) => {
            run_extract(config, image).await.context("extract failed")
        }
        Some(Commands::Categorize { config, text }) => {
            run_text_task(config, text, TaskKind::Categorize)
                .await
                .context("categorize failed")
        }
        Some(Commands::Summarize { config, text }) => {
            run_text_task(config, text, TaskKind::Summarize)
                .await
                .context("summarize failed")
        }
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run_bot(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    log::debug!("config loaded from {}", path.display());
    let bot_token = lib::config::resolve_slack_bot_token(&config)
        .context("Slack bot token not configured (set SLACK_BOT_TOKEN)")?;
    let app_token = lib::config::resolve_slack_app_token(&config)
        .context("Slack app token not configured (set SLACK_APP_TOKEN)")?;

    let ocr = Arc::new(TesseractEngine::new(&config.ocr));
    ocr.warm_up()?;
    let pipeline = Arc::new(PlatePipeline::new(ImageFetcher::new(), ocr));
    let slack = SlackClient::new(&config.slack.api_base, bot_token);
    let bot = Arc::new(Bot::new(Arc::new(slack.clone()), pipeline));
    let listener = Arc::new(SocketModeListener::new(slack, app_token));

    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let socket_handle = Arc::clone(&listener).start(inbound_tx);
    let bot_handle = tokio::spawn(bot.run(inbound_rx));
    log::info!("license plate bot is running");

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    listener.stop();
    let _ = socket_handle.await;
    let _ = bot_handle.await;
    Ok(())
}

async fn run_extract(config_path: Option<PathBuf>, image: PathBuf) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let bytes = tokio::fs::read(&image)
        .await
        .with_context(|| format!("reading {}", image.display()))?;
    let ocr = Arc::new(TesseractEngine::new(&config.ocr));
    let pipeline = PlatePipeline::new(ImageFetcher::new(), ocr);
    let result = tokio::task::spawn_blocking(move || pipeline.extract_from_bytes(&bytes)).await??;
    match result.plate {
        Some(plate) => println!("{}", plate),
        None => println!("no license plate detected"),
    }
    Ok(())
}

fn read_input(text: Option<String>) -> anyhow::Result<String> {
    match text {
        Some(t) => Ok(t),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            Ok(buf)
        }
    }
}

async fn run_text_task(
    config_path: Option<PathBuf>,
    text: Option<String>,
    kind: TaskKind,
) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let input = read_input(text)?;
    let models = Models::init(&config).await?;
    let (dispatcher, events) = Dispatcher::with_handle(
        tokio::runtime::Handle::current(),
        Arc::new(models),
        config.dispatch.max_concurrent,
    );
    let expected = match kind {
        TaskKind::Categorize => dispatcher.categorize(&input)?,
        TaskKind::Summarize => dispatcher.summarize(&input).map(|_| 1)?,
    };
    let results: Vec<TaskEvent> = tokio::task::spawn_blocking(move || {
        events.iter().take(expected).collect()
    })
    .await?;
    for event in results {
        match event.outcome {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("{} error: {}", event.kind.as_str(), e),
        }
    }
    Ok(())
}
