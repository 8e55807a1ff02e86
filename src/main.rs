//! webpilot command line interface.

mod app_config;

use agent_core::{AgentState, AnthropicProvider, Orchestrator, VisionBridge};
use anyhow::{bail, Context, Result};
use app_config::AppConfig;
use browser_session::SessionManager;
use clap::{Args, Parser, Subcommand};
use element_locator::{FallbackResolver, HealingResolver, SelectorCache};
use qa_cache::QaCache;
use std::path::PathBuf;
use std::sync::Arc;
use stealth::Humanizer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "webpilot", version, about = "Goal-driven browser automation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a goal against the browser.
    Run(RunArgs),
    /// Inspect or edit the question/answer cache.
    Qa {
        /// Config file to read the cache path from.
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(subcommand)]
        action: QaAction,
    },
    /// Delete persisted identity state and the qa cache.
    ClearState {
        /// Config file to read paths from.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum QaAction {
    /// List stored entries and lookup counters.
    Show,
    /// Store an answer ahead of time.
    Add {
        question: String,
        answer: String,
        /// Optional JSON metadata attached to the entry.
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Look a question up the way the agent would.
    Query { question: String },
}

#[derive(Args)]
struct RunArgs {
    /// What the agent should accomplish.
    goal: String,
    /// Config file (defaults to the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Where to write the JSON run report.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Profile/context data (name, address, preferences) included in
    /// every prompt so the agent can fill forms about the user.
    #[arg(long)]
    profile: Option<String>,
    /// Run with a visible browser window.
    #[arg(long)]
    headed: bool,
    /// Override the step budget.
    #[arg(long)]
    max_steps: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Qa { config, action } => qa(config, action).await,
        Command::ClearState { config } => clear_state(config).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if args.headed {
        config.session.headless = false;
    }
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
    }

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .context("ANTHROPIC_API_KEY must be set to run the agent")?;
    let provider = Arc::new(AnthropicProvider::new(config.anthropic(api_key))?);

    let session = Arc::new(SessionManager::with_chromium(config.session.clone()));
    let _signal_guard = session.spawn_signal_handler();

    let fallback = FallbackResolver::new(config.locator.clone())
        .with_vision(Arc::new(VisionBridge::new(provider.clone())));
    let resolver = Arc::new(HealingResolver::new(
        Arc::new(fallback),
        Arc::new(SelectorCache::new()),
    ));

    let mut orchestrator = Orchestrator::new(session.clone(), provider, config.agent.clone())
        .with_resolver(resolver)
        .with_humanizer(Arc::new(Humanizer::new(config.humanizer.clone())));

    if let Some(path) = &config.qa_cache_path {
        let cache = QaCache::open(path)
            .with_context(|| format!("opening qa cache {}", path.display()))?;
        orchestrator = orchestrator.with_qa_cache(Arc::new(cache));
    }

    let report = orchestrator
        .run_with_context(&args.goal, args.profile.as_deref())
        .await;
    session.cleanup().await?;

    if let Some(path) = &args.report {
        agent_core::write_report(&report, path).await?;
        info!(path = %path.display(), "run report written");
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    match report.state {
        AgentState::Completed => Ok(()),
        _ => bail!(
            "run {} failed after {} steps: {}",
            report.run_id,
            report.steps_taken,
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

async fn qa(config: Option<PathBuf>, action: QaAction) -> Result<()> {
    let config = AppConfig::load(config.as_deref())?;
    let path = config
        .qa_cache_path
        .context("no qa cache path configured")?;
    let cache = QaCache::open(&path)
        .with_context(|| format!("opening qa cache {}", path.display()))?;

    match action {
        QaAction::Show => {
            let entries = cache.entries();
            if entries.is_empty() {
                println!("qa cache at {} is empty", path.display());
                return Ok(());
            }
            for entry in &entries {
                println!(
                    "[uses: {:>3}] {} => {}",
                    entry.uses, entry.question, entry.answer
                );
            }
            println!("{} entr(ies) at {}", entries.len(), path.display());
        }
        QaAction::Add {
            question,
            answer,
            metadata,
        } => {
            let metadata = match metadata {
                Some(raw) => serde_json::from_str(&raw)
                    .with_context(|| format!("metadata is not valid JSON: {raw}"))?,
                None => serde_json::Value::Null,
            };
            cache.insert(&question, &answer, metadata).await?;
            println!("stored answer for {question:?}");
        }
        QaAction::Query { question } => match cache.query(&question) {
            Some(found) => println!("{}", found.answer()),
            None => bail!("no stored answer matches {question:?}"),
        },
    }
    Ok(())
}

async fn clear_state(config: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config.as_deref())?;
    let mut removed = 0;
    let mut paths = vec![config.session.state_path.clone()];
    if let Some(path) = &config.qa_cache_path {
        paths.push(path.clone());
    }
    for path in paths {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "removed");
                removed += 1;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err).context(format!("removing {}", path.display())),
        }
    }
    println!("removed {removed} state file(s)");
    Ok(())
}
