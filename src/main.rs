use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Duration;
use stepwise::cli::commands::{ListCommand, RunCommand, StatusCommand, ValidateCommand};
use stepwise::cli::output::*;
use stepwise::cli::{Cli, Command};
use stepwise::core::config::{AppConfig, StoreBackend, DEFAULT_CONFIG_FILE};
use stepwise::execution::{
    Orchestrator, OrchestratorEvent, Response, StepFactory, SubmittedValues,
};
use stepwise::persistence::{InMemoryStateStore, StateStore};
use stepwise::steps::builtin_registry;
use tracing::{error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let result = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await,
        Command::Reset(cmd) => reset_pipeline(&cmd.pipeline, &cli).await,
        Command::Status(cmd) => show_status(cmd, &cli).await,
        Command::List(cmd) => list_pipelines(cmd, &cli),
        Command::Validate(cmd) => validate_config(cmd, &cli),
    };

    if let Err(err) = result {
        println!("{} {}", CROSS, style(format!("{:#}", err)).red());
        error!("{:?}", err);
        std::process::exit(1);
    }

    Ok(())
}

fn config_path(cli: &Cli) -> &str {
    cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_FILE)
}

/// Load the configuration and check it against the built-in steps
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let path = config_path(cli);
    let config = AppConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path))?;
    let steps = builtin_registry();
    config.validate_plugins(|plugin| steps.knows(plugin))?;

    // Surface bad step parameters now rather than mid-run
    for definition in config.to_workspace().registry.iter() {
        for entry in definition.catalog.entries() {
            steps.create(entry).with_context(|| {
                format!("Pipeline '{}' step {}", definition.id, entry.ordinal + 1)
            })?;
        }
    }
    Ok(config)
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn StateStore>> {
    let lock_timeout = Duration::from_secs(config.store.lock_timeout_secs);

    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(
            InMemoryStateStore::new().with_lock_timeout(lock_timeout),
        )),
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => {
            let path = config.store.database_path();
            let store = stepwise::persistence::SqliteStateStore::new(&path)
                .await
                .with_context(|| format!("Failed to open state store at {}", path.display()))?;
            Ok(Arc::new(store.with_lock_timeout(lock_timeout)))
        }
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => {
            anyhow::bail!("This build has no sqlite support; use the memory backend")
        }
    }
}

fn resolve_owner(config: &AppConfig) -> String {
    config
        .owner
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| format!("stepwise-{}", uuid::Uuid::new_v4()))
}

async fn build_orchestrator(config: &AppConfig, inputs: SubmittedValues) -> Result<Orchestrator> {
    let workspace = config.to_workspace();
    let store = open_store(config).await?;

    Ok(Orchestrator::new(workspace.registry, Arc::new(builtin_registry()), store)
        .with_form_builder(Arc::new(inputs))
        .with_owner(resolve_owner(config)))
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let inputs = SubmittedValues::from_pairs(cmd.input.clone());
    let orchestrator = build_orchestrator(&config, inputs).await?;

    // Batch iterations are shown on the progress bar when following
    let follow = cmd.follow;
    orchestrator
        .add_event_handler(move |event| {
            if follow && matches!(event, OrchestratorEvent::BatchIteration { .. }) {
                return;
            }
            println!("{}", format_event(&event));
        })
        .await;

    let mut bar: Option<ProgressBar> = None;
    loop {
        let response = orchestrator.run(&cmd.pipeline).await;
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                if let Some(bar) = bar.take() {
                    bar.abandon();
                }
                return Err(err.into());
            }
        };

        match &response {
            Response::InProgress(status) if follow => {
                let progress = bar.get_or_insert_with(|| create_progress_bar(status.total_iterations));
                progress.set_length(status.total_iterations as u64);
                progress.set_position(status.iteration as u64);
                progress.set_message(status.message.clone());
                continue;
            }
            _ => {}
        }

        if let Some(bar) = bar.take() {
            bar.finish_and_clear();
        }
        // Success was already announced by the event handler
        if !response.is_success() {
            println!("{}", format_response(&response));
        }
        return Ok(());
    }
}

async fn reset_pipeline(pipeline_id: &str, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let orchestrator = build_orchestrator(&config, SubmittedValues::new()).await?;
    orchestrator.reset(pipeline_id).await?;
    println!("{} Reset {}", CHECK, style(pipeline_id).bold());
    Ok(())
}

async fn show_status(cmd: &StatusCommand, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let orchestrator = build_orchestrator(&config, SubmittedValues::new()).await?;
    orchestrator.registry().get(&cmd.pipeline)?;

    let status = orchestrator.status(&cmd.pipeline).await?;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", format_status(&status));
    }
    Ok(())
}

fn list_pipelines(cmd: &ListCommand, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    if cmd.json {
        let pipelines: Vec<_> = config
            .pipelines
            .iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.id,
                    "label": p.label.as_deref().unwrap_or(&p.id),
                    "steps": p.steps.len(),
                })
            })
            .collect();
        let data = serde_json::json!({ "pipelines": pipelines });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Configured pipelines:", INFO);
    for pipeline in &config.pipelines {
        println!(
            "  {} {} ({} steps)",
            style(&pipeline.id).bold(),
            style(pipeline.label.as_deref().unwrap_or("")).dim(),
            style(pipeline.steps.len()).cyan()
        );
    }
    Ok(())
}

fn validate_config(cmd: &ValidateCommand, cli: &Cli) -> Result<()> {
    println!("{} Validating {}...", INFO, config_path(cli));

    let config = load_config(cli)?;

    println!("{} Configuration is valid!", CHECK);
    println!("  Pipelines: {}", style(config.pipelines.len()).cyan());
    println!("  Store: {}", style(format!("{:?}", config.store.backend)).dim());

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(())
}
