use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use montage_config::EngineSettings;
use montage_store::SqliteStore;
use montage_task_runtime_http::build_registry;
use montage_workflow_orchestrator::{
  ExecuteRequest, ExecuteResponse, Orchestrator, StepRunner, execute_graph,
};

/// Montage - a workflow engine for generation pipelines
#[derive(Parser)]
#[command(name = "montage")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.montage)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Engine settings file (JSON). Defaults apply when omitted.
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow or a stored step
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },

  /// Create or upgrade the database schema
  Migrate,
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run an ad-hoc graph
  Workflow {
    /// Path to the request file (JSON: nodes, edges, inputs)
    request_file: PathBuf,
  },

  /// Run a stored step
  Step {
    step_id: String,

    /// Only re-run this node, using the step's stored outputs upstream
    #[arg(long)]
    node: Option<String>,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".montage"),
  };
  let settings = load_settings(cli.config.as_deref(), &data_dir)?;

  let Some(command) = cli.command else {
    println!("montage - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Run { target } => match target {
        RunTarget::Workflow { request_file } => run_workflow(&request_file, &settings, &data_dir).await,
        RunTarget::Step { step_id, node } => run_step(&step_id, node.as_deref(), &settings, &data_dir).await,
      },
      Commands::Migrate => {
        open_store(&settings, &data_dir).await?;
        eprintln!("Database is up to date");
        Ok(())
      }
    }
  })
}

fn load_settings(path: Option<&Path>, data_dir: &Path) -> Result<EngineSettings> {
  let mut settings = match path {
    Some(path) => {
      let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
      serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?
    }
    None => EngineSettings::default(),
  };

  if settings.database_url.is_none() {
    settings.database_url = Some(format!("sqlite://{}", data_dir.join("montage.db").display()));
  }
  Ok(settings)
}

async fn open_store(settings: &EngineSettings, data_dir: &Path) -> Result<Arc<SqliteStore>> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let url = settings.database_url.as_deref().unwrap_or_default();
  let store = SqliteStore::connect(url)
    .await
    .with_context(|| format!("failed to open database: {}", url))?;
  store.migrate().await.context("failed to migrate database")?;
  Ok(Arc::new(store))
}

async fn orchestrator(
  settings: &EngineSettings,
  store: &Arc<SqliteStore>,
) -> Result<Orchestrator> {
  let registry = build_registry(settings).context("failed to build executor registry")?;
  Ok(Orchestrator::new(Arc::new(registry)).with_persister(store.clone()))
}

/// A token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Cancelling...");
      trigger.cancel();
    }
  });
  cancel
}

async fn run_workflow(request_file: &Path, settings: &EngineSettings, data_dir: &Path) -> Result<()> {
  let content = tokio::fs::read_to_string(request_file)
    .await
    .with_context(|| format!("failed to read request file: {}", request_file.display()))?;
  let request: ExecuteRequest = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse request file: {}", request_file.display()))?;

  let store = open_store(settings, data_dir).await?;
  let orchestrator = orchestrator(settings, &store).await?;

  info!(nodes = request.nodes.len(), "running workflow");
  let response = execute_graph(&orchestrator, request, &cancel_on_ctrl_c()).await;
  report(&response)
}

async fn run_step(
  step_id: &str,
  node_id: Option<&str>,
  settings: &EngineSettings,
  data_dir: &Path,
) -> Result<()> {
  let store = open_store(settings, data_dir).await?;
  let runner = StepRunner::new(orchestrator(settings, &store).await?, store.clone());
  let cancel = cancel_on_ctrl_c();

  match node_id {
    Some(node_id) => {
      let result = runner
        .run_step_node(step_id, node_id, &cancel)
        .await
        .with_context(|| format!("failed to run node '{}' of step '{}'", node_id, step_id))?;
      println!("{}", serde_json::to_string_pretty(&result)?);
      if !result.success {
        bail!("node '{}' failed", node_id);
      }
      Ok(())
    }
    None => {
      let run = runner
        .run_step(step_id, &cancel)
        .await
        .with_context(|| format!("failed to run step '{}'", step_id))?;
      report(&ExecuteResponse::from_run(&run))
    }
  }
}

fn report(response: &ExecuteResponse) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(response)?);
  if !response.success {
    bail!(
      "workflow failed: {}",
      response.error.as_deref().unwrap_or("unknown error")
    );
  }
  Ok(())
}
