//! CLI commands for AgentForge using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agent::worker::WorkerEnv;
use crate::agent::{AgentDefinition, Creator, DefinitionLoader};
use crate::config::{load_settings_or_default, Settings};
use crate::core::routing::parse_agent_routing;
use crate::core::{AgentId, Message, Runtime};
use crate::providers::create_provider;
use crate::tracker::{default_export_name, replay, MessageTracker};
use crate::world::{register_builtin_workers, run_world};

/// Agent addressed by `send` when the message has no `@agent` prefix.
const DEFAULT_AGENT: &str = "agent1";

/// AgentForge - agents that build agents.
#[derive(Parser)]
#[command(name = "agentforge")]
#[command(version = "0.1.0")]
#[command(about = "AgentForge - an in-process runtime where agents create agents", long_about = None)]
pub struct Commands {
    /// Settings file (defaults to ~/.agentforge/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Have the Creator build agents concurrently and save their ideas
    World {
        /// Number of agents to create (defaults to runtime.agent_count)
        #[arg(short = 'n', long)]
        agents: Option<usize>,

        /// Directory for ideas, generated agents, logs and the snapshot
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Send a message; prefix with @agent to pick the recipient
    Send {
        /// Message to send
        message: String,
    },

    /// Replay the exchange log and print statistics
    Replay {
        /// Log file (defaults to tracker.log_file)
        #[arg(long)]
        log: Option<PathBuf>,

        /// Also print per-agent activity
        #[arg(long)]
        activity: bool,
    },

    /// Rebuild tracker state from the exchange log and export a snapshot
    Export {
        /// Log file (defaults to tracker.log_file)
        #[arg(long)]
        log: Option<PathBuf>,

        /// Snapshot path (defaults to a timestamped file in tracker.export_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the agent definition template the Creator works from
    Template,
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        let settings = load_settings_or_default(self.config.as_deref());

        match &self.command {
            Command::World { agents, output_dir } => {
                cmd_world(&settings, agents.unwrap_or(settings.runtime.agent_count), output_dir).await
            }
            Command::Send { message } => cmd_send(&settings, message).await,
            Command::Replay { log, activity } => cmd_replay(&settings, log.as_deref(), *activity),
            Command::Export { log, output } => cmd_export(&settings, log.as_deref(), output.as_deref()),
            Command::Template => cmd_template(&settings),
        }
    }
}

// Command implementations

async fn cmd_world(settings: &Settings, count: usize, output_dir: &Path) -> Result<()> {
    if count == 0 {
        anyhow::bail!("--agents must be at least 1");
    }
    println!("Creating {} agents in {}...", count, output_dir.display());

    let provider = create_provider(&settings.models);
    let report = run_world(settings, provider, count, output_dir).await?;

    println!("Ideas written: {}", report.ideas.len());
    if !report.failed.is_empty() {
        println!("Failed agents: {:?}", report.failed);
    }
    println!(
        "Exchanges: {} total, {} succeeded, {} failed",
        report.statistics.total_exchanges,
        report.statistics.successful_exchanges,
        report.statistics.failed_exchanges
    );
    println!("Snapshot: {}", report.snapshot.display());
    Ok(())
}

async fn cmd_send(settings: &Settings, message: &str) -> Result<()> {
    let (agent, content) = match parse_agent_routing(message) {
        Some((agent, content)) => (agent, content),
        None => (DEFAULT_AGENT.to_string(), message.to_string()),
    };

    let provider = create_provider(&settings.models);
    if !provider.is_available().await {
        tracing::warn!("Provider {} reports it is not available", provider.name());
    }

    let tracker = Arc::new(
        MessageTracker::open(&settings.tracker.log_file)
            .with_context(|| format!("Cannot open {}", settings.tracker.log_file.display()))?,
    );
    let runtime = Runtime::new(settings.runtime.host_address.clone(), tracker);

    let env = WorkerEnv::from_settings(settings, Arc::clone(&provider));
    register_builtin_workers(&runtime, &env)?;
    let loader = Arc::new(DefinitionLoader::new(settings.creator.agents_dir.clone(), env));
    let creator = Creator::from_settings(settings, provider, loader)?;
    runtime.register_agent(settings.creator.name.clone(), Arc::new(creator))?;

    runtime.start();
    let reply = runtime
        .send(Message::new(content), &AgentId::default_key(agent))
        .await;
    runtime.stop();

    println!("{}", reply.content);
    Ok(())
}

fn cmd_replay(settings: &Settings, log: Option<&Path>, activity: bool) -> Result<()> {
    let tracker = replay_tracker(settings, log)?;

    println!("{}", serde_json::to_string_pretty(&tracker.statistics())?);
    if activity {
        println!(
            "{}",
            serde_json::to_string_pretty(&tracker.agent_activity_summary())?
        );
    }
    Ok(())
}

fn cmd_export(settings: &Settings, log: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let tracker = replay_tracker(settings, log)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| settings.tracker.export_dir.join(default_export_name()));

    tracker.export_snapshot(&output)?;
    println!("Exported {} exchanges to {}", tracker.exchanges().len(), output.display());
    Ok(())
}

fn cmd_template(settings: &Settings) -> Result<()> {
    let template = match &settings.creator.template_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read template {}", path.display()))?,
        None => AgentDefinition::canonical().to_json()?,
    };
    println!("{}", template);
    Ok(())
}

fn replay_tracker(settings: &Settings, log: Option<&Path>) -> Result<MessageTracker> {
    let path = log.unwrap_or(&settings.tracker.log_file);
    let exchanges =
        replay(path).with_context(|| format!("Cannot replay {}", path.display()))?;
    Ok(MessageTracker::from_exchanges(exchanges))
}
