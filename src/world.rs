//! Batch world run: ask the Creator for many agents at once and collect
//! each new agent's first idea.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::agent::worker::WorkerEnv;
use crate::agent::{AgentDefinition, Creator, DefinitionLoader, WorkerAgent};
use crate::config::Settings;
use crate::core::{AgentId, Message, Runtime, RuntimeHost};
use crate::error::{Error, Result};
use crate::providers::Provider;
use crate::tracker::{default_export_name, MessageStats, MessageTracker};

/// Outcome of a world run.
#[derive(Debug)]
pub struct WorldReport {
    /// Idea files written, in agent order.
    pub ideas: Vec<PathBuf>,
    /// Agents whose request could not be completed.
    pub failed: Vec<usize>,
    /// Addresses the host saw registered.
    pub registered: Vec<String>,
    pub snapshot: PathBuf,
    pub statistics: MessageStats,
}

/// Register the two canonical workers, `agent1` and `agent2`.
pub fn register_builtin_workers(runtime: &Runtime, env: &WorkerEnv) -> Result<()> {
    for (name, definition) in [
        ("agent1", AgentDefinition::fintech_strategist()),
        ("agent2", AgentDefinition::marketing_strategist()),
    ] {
        let agent = WorkerAgent::from_definition(name, &definition, env);
        runtime.register_agent(name, Arc::new(agent))?;
    }
    Ok(())
}

/// Ask the Creator for `agent{i}` and save the reply as `idea{i}.md`.
pub async fn create_and_message(
    runtime: &Runtime,
    creator: &AgentId,
    i: usize,
    output_dir: &Path,
) -> Result<PathBuf> {
    tracing::info!("Creating agent {}...", i);
    let result = runtime
        .send(Message::new(format!("agent{}.json", i)), creator)
        .await;

    let path = output_dir.join(format!("idea{}.md", i));
    tokio::fs::write(&path, &result.content).await?;
    tracing::info!("Saved idea {} to {}", i, path.display());
    Ok(path)
}

/// Start a host and worker runtime, register the Creator, create `count`
/// agents concurrently, then stop and export a snapshot.
pub async fn run_world(
    settings: &Settings,
    provider: Arc<dyn Provider>,
    count: usize,
    output_dir: &Path,
) -> Result<WorldReport> {
    tracing::info!("Starting world with a target of {} agents", count);
    tokio::fs::create_dir_all(output_dir).await?;

    let tracker = Arc::new(MessageTracker::open(
        output_dir.join(&settings.tracker.log_file),
    )?);

    let host = Arc::new(RuntimeHost::new(settings.runtime.host_address.clone()));
    host.start();

    let runtime = Runtime::new(settings.runtime.host_address.clone(), Arc::clone(&tracker));
    runtime.connect_host(Arc::clone(&host));
    runtime.start();

    let env = WorkerEnv::from_settings(settings, Arc::clone(&provider));
    let loader = Arc::new(DefinitionLoader::new(
        output_dir.join(&settings.creator.agents_dir),
        env,
    ));
    let creator = Creator::from_settings(settings, provider, loader)?;
    tracing::info!("Registering Creator agent...");
    runtime.register_agent(settings.creator.name.clone(), Arc::new(creator))?;
    let creator_id = AgentId::default_key(settings.creator.name.clone());

    let mut tasks = JoinSet::new();
    for i in 1..=count {
        let runtime = runtime.clone();
        let creator_id = creator_id.clone();
        let output_dir = output_dir.to_path_buf();
        tasks.spawn(async move {
            let result = create_and_message(&runtime, &creator_id, i, &output_dir).await;
            (i, result)
        });
    }

    let mut ideas = Vec::new();
    let mut failed = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(path))) => ideas.push(path),
            Ok((i, Err(e))) => {
                tracing::error!("Failed to create agent {} due to exception: {}", i, e);
                failed.push(i);
            }
            Err(e) => {
                tracing::error!("World task panicked or was cancelled: {}", e);
            }
        }
    }
    ideas.sort_by_key(|path| idea_number(path));
    failed.sort_unstable();

    let done = count - failed.len();
    tracing::info!("{} of {} agents created", done, count);

    runtime.stop();
    host.stop();

    let export_dir = output_dir.join(&settings.tracker.export_dir);
    let snapshot = export_dir.join(default_export_name());
    tracker.export_snapshot(&snapshot)?;

    let report = WorldReport {
        ideas,
        failed,
        registered: host.addresses(),
        snapshot,
        statistics: tracker.statistics(),
    };
    if report.ideas.len() + report.failed.len() != count {
        return Err(Error::Other(format!(
            "{} of {} world tasks did not finish",
            count - report.ideas.len() - report.failed.len(),
            count
        )));
    }
    Ok(report)
}

fn idea_number(path: &Path) -> usize {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("idea"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX)
}
