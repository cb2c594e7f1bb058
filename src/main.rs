mod cli;
mod collaborators;
mod config;
mod content;
mod error;
mod generator;
mod housekeeping;
mod metrics;
mod orchestrator;
mod pipeline;
mod quality;
mod retry;
mod state_machine;
mod store;
mod topic;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::prelude::*;

use cli::{Cli, Command};
use collaborators::{DirectoryPublisher, NoMediaSource, OutboxNotifier};
use config::{PressroomConfig, StorageBackend};
use generator::AnthropicGenerator;
use metrics::TracingMetrics;
use orchestrator::{ApprovalAction, Services, WorkflowOrchestrator};
use quality::QualityGate;
use store::{FileWorkflowStore, MemoryWorkflowStore, ScanFilter, WorkflowStore};
use topic::{TopicCatalog, TopicSelector};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pressroom={log_level},warn").into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = PressroomConfig::load(cli.config.as_deref())?;
    if let Some(max_retries) = cli.max_retries {
        config.workflow.max_retries = max_retries;
    }

    let store = open_store(&config).await?;

    match cli.command {
        Command::Run { trigger } => {
            if config.generator.api_key.is_empty() {
                bail!("No API key configured: set ANTHROPIC_API_KEY or [generator].api_key");
            }
            let orchestrator = build_orchestrator(&config, store)?;
            let trigger = trigger.into();
            let progress = ui::WorkflowProgress::start(trigger);
            let result = orchestrator.start(trigger).await;
            progress.complete(&result);
            result?;
        }
        Command::Status { id } => {
            let record = store
                .get(&id)
                .await?
                .with_context(|| format!("Workflow not found: {id}"))?;
            ui::print_record(&record);
        }
        Command::List { status, limit } => {
            let filter = match status {
                Some(status) => ScanFilter::with_statuses(status.statuses()),
                None => ScanFilter::all(),
            };
            let mut records = store.scan(&filter).await?;
            records.truncate(limit);
            ui::print_list(&records);
        }
        Command::Sweep => {
            let horizon = config.workflow_settings().stale_horizon;
            let report = housekeeping::sweep_stale(store.as_ref(), horizon, Utc::now()).await?;
            ui::print_sweep(&report);
        }
        Command::Migrate => {
            let migrated = housekeeping::migrate_schema(store.as_ref()).await?;
            println!("Migrated {} workflow record(s)", migrated.len());
        }
        Command::Approve { id, token } => {
            resolve(&config, store, ApprovalAction::Approve, id, token).await?;
        }
        Command::Decline { id, token } => {
            resolve(&config, store, ApprovalAction::Decline, id, token).await?;
        }
    }

    Ok(())
}

async fn open_store(config: &PressroomConfig) -> Result<Arc<dyn WorkflowStore>> {
    let store: Arc<dyn WorkflowStore> = match config.storage.backend {
        StorageBackend::File => Arc::new(
            FileWorkflowStore::open(&config.storage.path)
                .await
                .with_context(|| format!("opening store at {}", config.storage.path.display()))?,
        ),
        StorageBackend::Memory => Arc::new(MemoryWorkflowStore::new()),
    };
    Ok(store)
}

fn build_orchestrator(
    config: &PressroomConfig,
    store: Arc<dyn WorkflowStore>,
) -> Result<WorkflowOrchestrator> {
    let generator = match &config.generator.base_url {
        Some(url) => AnthropicGenerator::with_base_url(
            config.generator.api_key.clone(),
            config.generator.model.clone(),
            url.clone(),
        )?,
        None => AnthropicGenerator::new(
            config.generator.api_key.clone(),
            config.generator.model.clone(),
        )?,
    };
    info!(model = generator.model(), "Generator ready");

    let catalog = TopicCatalog::from_config(&config.topics)?;
    Ok(WorkflowOrchestrator::new(
        Services {
            store,
            generator: Arc::new(generator),
            media: Arc::new(NoMediaSource),
            notifier: Arc::new(OutboxNotifier::new(&config.notification.outbox)),
            metrics: Arc::new(TracingMetrics),
        },
        TopicSelector::new(catalog),
        QualityGate::new(config.quality.clone()),
        config.retry.policy(),
        config.workflow_settings(),
    ))
}

async fn resolve(
    config: &PressroomConfig,
    store: Arc<dyn WorkflowStore>,
    action: ApprovalAction,
    id: Option<String>,
    token: Option<String>,
) -> Result<()> {
    let orchestrator = build_orchestrator(config, store)?;
    let id = match (id, token.as_deref()) {
        (Some(id), _) => id,
        (None, Some(token)) => {
            orchestrator
                .find_by_token(token)
                .await?
                .context("No workflow is waiting on that token")?
                .id
        }
        (None, None) => bail!("Give a workflow id or --token"),
    };

    let publisher = DirectoryPublisher::new(&config.publish.dir);
    let record = orchestrator
        .resolve_approval(&id, action, token.as_deref(), &publisher)
        .await?;
    ui::print_resolution(&record);
    Ok(())
}
