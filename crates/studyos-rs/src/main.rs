//! `studyos` command line: run the HTTP server, inspect routing, or ask a one-off question.

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use log::{debug, info};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use studyos_rs::core::chat::STOPPED_MARKER;
use studyos_rs::core::{ChatMessage, CompletionOutcome, CompletionRequest, RouterStatus};
use studyos_rs::protocol::{AgentRole, FeatureFlags, RoutingPreference, merge_grounding};
use studyos_rs::server::{AppState, serve};
use tokio_util::sync::CancellationToken;

/// Command-line options for Study OS.
#[derive(Parser)]
#[command(name = "studyos", version)]
struct Cli {
    /// Optional path to a studyos.json5 config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Listen address; overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Show provider routing status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Stream a single tutor reply to stdout
    Ask(AskArgs),
}

#[derive(Args)]
struct AskArgs {
    prompt: String,
    /// Tutor persona (TEACHER, EXAMINER, ...)
    #[arg(long, default_value = "TEACHER")]
    persona: AgentRole,
    #[arg(long)]
    deep: bool,
    #[arg(long)]
    concise: bool,
    #[arg(long)]
    web_search: bool,
    /// Route this request to a provider without saving the preference
    #[arg(long)]
    provider: Option<RoutingPreference>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    studyos_rs::init_logging();
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let config = studyos_rs::load_config(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let router = studyos_rs::open_router(&config, true)?;
            let transcripts = studyos_rs::open_transcripts(&config)?;
            let state = AppState::new(config, router, transcripts)
                .context("failed to initialize server state")?;
            serve(Arc::new(state), &bind, async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown requested");
            })
            .await
            .context("server failed")?;
        }
        Command::Status { json } => {
            let router = studyos_rs::open_router(&config, true)?;
            let status = router.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        Command::Ask(args) => ask(&config, args).await?,
    }
    Ok(())
}

fn print_status(status: &RouterStatus) {
    println!("preference: {}", status.preference);
    println!(
        "resolved:   {} ({:?}{})",
        status.resolved.kind,
        status.resolved.resolution,
        if status.resolved.usable { "" } else { ", unusable" }
    );
    println!("web search: {}", if status.web_search_actionable { "available" } else { "unavailable" });
    println!();
    println!("{:<8} {:<7} {:<12} {:<28} model", "provider", "usable", "credential", "base url");
    for provider in &status.providers {
        let marker = if provider.resolved { "*" } else { " " };
        println!(
            "{}{:<7} {:<7} {:<12} {:<28} {}",
            marker,
            provider.kind,
            provider.usable,
            format!("{:?}", provider.origin).to_ascii_lowercase(),
            provider.base_url.as_deref().unwrap_or("-"),
            provider.model.as_deref().unwrap_or("-"),
        );
    }
}

async fn ask(config: &studyos_rs::config::StudyOsConfig, args: AskArgs) -> anyhow::Result<()> {
    let router = studyos_rs::open_router(config, args.provider.is_none())?;
    if let Some(preference) = args.provider {
        router.set_preference(preference);
    }
    let flags = FeatureFlags::new()
        .with_web_search(args.web_search)
        .with_deep_reasoning(args.deep)
        .with_concise(args.concise);
    let request = CompletionRequest {
        history: vec![ChatMessage::user(args.prompt, None)],
        persona: args.persona,
        flags,
        ..CompletionRequest::default()
    };
    let cancel = CancellationToken::new();
    let mut stream = router.stream_completion(request, cancel.clone());
    debug!("asking (provider={}, persona={})", stream.provider.kind, args.persona);

    let mut stdout = std::io::stdout();
    let mut links = Vec::new();
    loop {
        tokio::select! {
            fragment = stream.next() => {
                let Some(fragment) = fragment else { break };
                merge_grounding(&mut links, &fragment.grounding);
                write!(stdout, "{}", fragment.text)?;
                stdout.flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                write!(stdout, "{STOPPED_MARKER}")?;
                break;
            }
        }
    }
    writeln!(stdout)?;

    if !links.is_empty() {
        writeln!(stdout, "\nSources:")?;
        for link in &links {
            writeln!(stdout, "  {} <{}>", link.title, link.uri)?;
        }
    }

    match stream.finish().await {
        CompletionOutcome::Failed(message) => bail!("completion failed: {message}"),
        CompletionOutcome::Completed | CompletionOutcome::Cancelled => Ok(()),
    }
}
