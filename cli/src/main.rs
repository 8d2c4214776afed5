//! CLI entrypoint for tandem
//!
//! Wires the layers together with dependency injection: the native runtime
//! binding and remote endpoint behind the transport factory, the hybrid
//! selector on top, and either a one-shot question or the chat REPL in
//! front.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_application::ports::generative::{DownloadProgress, GenerativeRuntime, RuntimeProbe};
use tandem_application::{ConversationLogger, HybridChat, NoConversationLogger, SessionOptions};
use tandem_domain::{CapabilityProfile, Chunk, TransportMode};
use tandem_infrastructure::{
    ConfigLoader, ConfiguredTransportFactory, JsonlTranscript, NativeRuntime,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod repl;
use repl::ChatRepl;

#[derive(Parser)]
#[command(name = "tandem", about = "Hybrid on-device / remote streaming chat", version)]
struct Cli {
    /// One-shot question; omit for interactive chat
    question: Option<String>,

    /// Transport mode to start in (local|remote); overrides config
    #[arg(long)]
    mode: Option<String>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Remote endpoint override
    #[arg(long)]
    endpoint: Option<String>,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress the banner
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config =
        ConfigLoader::load(cli.config.as_ref()).map_err(|e| anyhow::anyhow!("config error: {e}"))?;
    if let Some(endpoint) = cli.endpoint {
        config.remote.endpoint = endpoint;
    }
    if let Some(mode) = cli.mode {
        config.chat.mode = mode;
    }
    let requested: TransportMode = config
        .chat
        .mode
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    // === Dependency injection ===
    let runtime = Arc::new(NativeRuntime::new(
        config.runtime.command.clone(),
        config.runtime.args.clone(),
    ));

    let options = SessionOptions {
        system_prompt: config.chat.system_prompt.clone(),
        temperature: config.runtime.temperature,
        top_k: config.runtime.top_k,
        profile: CapabilityProfile::text_only(),
    };

    let factory = Arc::new(ConfiguredTransportFactory::new(
        Arc::clone(&runtime) as Arc<dyn GenerativeRuntime>,
        options,
        Some(download_progress_bar()),
        config.remote.endpoint.clone(),
    ));

    let logger: Arc<dyn ConversationLogger> = match &config.log.transcript {
        Some(path) => match JsonlTranscript::open(path) {
            Ok(transcript) => Arc::new(transcript),
            Err(e) => {
                warn!("transcript disabled: {}", e);
                Arc::new(NoConversationLogger)
            }
        },
        None => Arc::new(NoConversationLogger),
    };

    let mut chat = HybridChat::new(
        config.chat.id_prefix.clone(),
        requested,
        CapabilityProfile::text_only(),
        Arc::clone(&runtime) as Arc<dyn RuntimeProbe>,
        factory,
        logger,
    )
    .await
    .map_err(|e| anyhow::anyhow!("could not start chat: {e}"))?;

    info!(mode = %chat.mode(), "tandem ready");

    match cli.question {
        Some(question) => {
            let ok = run_one_shot(&mut chat, &question).await?;
            chat.shutdown().await;
            runtime.shutdown().await;
            if !ok {
                std::process::exit(1);
            }
        }
        None => {
            ChatRepl::new(chat).with_banner(!cli.quiet).run().await?;
            runtime.shutdown().await;
        }
    }

    Ok(())
}

/// Ask one question, stream the answer to stdout, report success.
async fn run_one_shot(chat: &mut HybridChat, question: &str) -> Result<bool> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = chat
        .ask_streaming(question, cancel, |chunk| {
            if let Chunk::TextDelta { delta, .. } = chunk {
                print!("{delta}");
                let _ = std::io::stdout().flush();
            }
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    watcher.abort();
    println!();

    if let Some(error) = &outcome.error {
        eprintln!("{} {}", "generation failed:".red(), error);
        return Ok(false);
    }
    if outcome.cancelled {
        eprintln!("{}", "(stopped)".yellow());
    }
    Ok(true)
}

/// A progress bar fed by the session manager's download callback. Hidden
/// until the first progress notification arrives.
fn download_progress_bar() -> DownloadProgress {
    let bar = ProgressBar::hidden();
    bar.set_length(100);
    Arc::new(move |percent| {
        if bar.is_hidden() {
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar.set_message("downloading model");
        }
        bar.set_position(percent as u64);
        if percent >= 100 {
            bar.finish_and_clear();
        }
    })
}
