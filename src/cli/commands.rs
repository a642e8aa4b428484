//! CLI command definitions for content-forge.
//!
//! Every command that talks to the model goes through the pipeline
//! orchestrator; the CLI only assembles task specs and prints results.

use crate::llm::{LlmProvider, OpenRouterProvider, ScriptedProvider};
use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{
    draft_title, ChainParams, ContentChain, ModelParams, PipelineConfig, PipelineOrchestrator,
    PipelineResult, TaskSpec,
};
use crate::schema::{SchemaRegistry, TaskKind};
use crate::storage::{Artifact, ArtifactId, ArtifactStore, FileArtifactStore};
use clap::Parser;
use futures::TryStreamExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Schema-validated content generation with stored provenance.
#[derive(Parser)]
#[command(name = "content-forge")]
#[command(about = "Generate schema-validated content artifacts with an LLM")]
#[command(version)]
#[command(
    long_about = "content-forge turns task specs into schema-validated JSON artifacts.\n\nEach run builds a prompt from the task's schema, calls the model, validates the\nreply and retries with feedback until it conforms. Accepted artifacts are stored\nwith their provenance.\n\nExample usage:\n  content-forge run --kind background_discovery -i topic=\"Urban beekeeping\"\n  content-forge chain --topic \"Urban beekeeping\" --audience \"City dwellers\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Artifact store directory (overrides CONTENT_FORGE_STORE_PATH).
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// YAML file of schema definitions to use instead of the built-in set.
    #[arg(long, global = true)]
    pub schema_file: Option<PathBuf>,

    /// Print Prometheus metrics after the command completes.
    #[arg(long, global = true)]
    pub metrics: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a single task and store the validated artifact.
    Run(RunArgs),

    /// Run background discovery, structural planning and draft generation in sequence.
    Chain(ChainArgs),

    /// List stored artifacts in creation order.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Print a stored artifact with its provenance.
    Show(ShowArgs),

    /// Delete a stored artifact.
    #[command(alias = "rm")]
    Delete(DeleteArgs),

    /// Describe the registered schemas.
    Schemas(SchemasArgs),
}

/// Arguments for `content-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Task kind (background_discovery, structural_planning, draft_generation, interest_discovery).
    #[arg(short, long)]
    pub kind: TaskKind,

    /// Task input as name=value. Values that parse as JSON are passed as JSON.
    #[arg(short, long = "input", value_name = "NAME=VALUE", value_parser = parse_input)]
    pub inputs: Vec<(String, Value)>,

    /// JSON object file of additional inputs. `--input` values take precedence.
    #[arg(long)]
    pub inputs_file: Option<PathBuf>,

    /// Model to use (defaults to CONTENT_FORGE_MODEL or the built-in default).
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sampling temperature for the first attempt.
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Maximum completion tokens.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Artifact this task derives from.
    #[arg(long)]
    pub parent: Option<ArtifactId>,

    /// Answer with schema sample instances instead of calling the API.
    #[arg(long)]
    pub dry_run: bool,

    /// API key (overrides CONTENT_FORGE_API_KEY / OPENROUTER_API_KEY).
    #[arg(long, env = "CONTENT_FORGE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output JSON to stdout instead of a summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `content-forge chain`.
#[derive(Parser, Debug)]
pub struct ChainArgs {
    /// Topic to research and write about.
    #[arg(long)]
    pub topic: String,

    /// What the content should achieve.
    #[arg(long)]
    pub objectives: Option<String>,

    /// Intended readers.
    #[arg(long)]
    pub audience: Option<String>,

    /// Content format, e.g. "blog post" or "newsletter".
    #[arg(long)]
    pub content_type: Option<String>,

    /// Extra instructions for the draft stage.
    #[arg(long)]
    pub instructions: Option<String>,

    /// Model to use for every stage.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Answer with schema sample instances instead of calling the API.
    #[arg(long)]
    pub dry_run: bool,

    /// API key (overrides CONTENT_FORGE_API_KEY / OPENROUTER_API_KEY).
    #[arg(long, env = "CONTENT_FORGE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output JSON to stdout instead of a summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `content-forge list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list artifacts of this kind.
    #[arg(short, long)]
    pub kind: Option<TaskKind>,

    /// Output JSON to stdout instead of a table.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `content-forge show`.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Artifact id.
    pub id: ArtifactId,
}

/// Arguments for `content-forge delete`.
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Artifact id.
    pub id: ArtifactId,
}

/// Arguments for `content-forge schemas`.
#[derive(Parser, Debug)]
pub struct SchemasArgs {
    /// Only describe the schema for this kind.
    #[arg(short, long)]
    pub kind: Option<TaskKind>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if cli.metrics {
        init_metrics()?;
    }

    let mut config = PipelineConfig::from_env()?;
    if let Some(store) = &cli.store {
        config = config.with_artifact_path(store.clone());
    }
    let registry = Arc::new(load_registry(cli.schema_file.as_ref())?);

    match cli.command {
        Commands::Run(args) => run_task_command(args, config, registry).await?,
        Commands::Chain(args) => run_chain_command(args, config, registry).await?,
        Commands::List(args) => run_list_command(args, &config).await?,
        Commands::Show(args) => run_show_command(args, &config).await?,
        Commands::Delete(args) => run_delete_command(args, &config).await?,
        Commands::Schemas(args) => run_schemas_command(args, &registry)?,
    }

    if cli.metrics {
        println!("{}", export_metrics());
    }
    Ok(())
}

fn load_registry(path: Option<&PathBuf>) -> anyhow::Result<SchemaRegistry> {
    let registry = match path {
        Some(path) => SchemaRegistry::from_yaml_file(path)?,
        None => SchemaRegistry::builtin()?,
    };
    Ok(registry)
}

/// Parses a `name=value` input. The value is JSON when it parses as such,
/// otherwise a plain string.
fn parse_input(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("input name is empty in '{}'", raw));
    }
    let value = match serde_json::from_str::<Value>(value) {
        Ok(json @ (Value::Object(_) | Value::Array(_) | Value::Number(_) | Value::Bool(_))) => json,
        _ => Value::String(value.to_string()),
    };
    Ok((name.to_string(), value))
}

fn build_provider(
    config: &PipelineConfig,
    registry: &Arc<SchemaRegistry>,
    api_key: Option<String>,
    dry_run: bool,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    if dry_run {
        info!("Dry run: answering with schema sample instances");
        return Ok(Arc::new(ScriptedProvider::dry_run(Arc::clone(registry))));
    }

    let key = match api_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => key,
        None => config
            .require_api_key()
            .map_err(|e| {
                anyhow::anyhow!(
                    "{}. Please provide --api-key, set CONTENT_FORGE_API_KEY/OPENROUTER_API_KEY, or use --dry-run.",
                    e
                )
            })?
            .to_string(),
    };
    let provider = OpenRouterProvider::with_custom_url(
        key,
        config.api_base.clone(),
        config.default_model.clone(),
    )?;
    info!(
        api_base = %provider.base_url(),
        model = %config.default_model,
        api_key = %provider.api_key_masked(),
        "Using OpenAI-compatible provider"
    );
    Ok(Arc::new(provider))
}

fn build_orchestrator(
    config: PipelineConfig,
    registry: Arc<SchemaRegistry>,
    api_key: Option<String>,
    dry_run: bool,
) -> anyhow::Result<PipelineOrchestrator> {
    let provider = build_provider(&config, &registry, api_key, dry_run)?;
    let store: Arc<dyn ArtifactStore> =
        Arc::new(FileArtifactStore::new(config.artifact_path.clone()));
    Ok(PipelineOrchestrator::new(config, registry, provider, store)?)
}

// ============================================================================
// Run / Chain
// ============================================================================

async fn run_task_command(
    args: RunArgs,
    config: PipelineConfig,
    registry: Arc<SchemaRegistry>,
) -> anyhow::Result<()> {
    let mut inputs: BTreeMap<String, Value> = BTreeMap::new();
    if let Some(path) = &args.inputs_file {
        let raw = tokio::fs::read_to_string(path).await?;
        let parsed: Map<String, Value> = serde_json::from_str(&raw).map_err(|e| {
            anyhow::anyhow!("{} must contain a JSON object of inputs: {}", path.display(), e)
        })?;
        inputs.extend(parsed);
    }
    inputs.extend(args.inputs);

    let mut params = ModelParams::for_kind(args.kind)
        .with_model(args.model.unwrap_or_else(|| config.default_model.clone()));
    if let Some(temperature) = args.temperature {
        params = params.with_temperature(temperature);
    }
    if let Some(max_tokens) = args.max_tokens {
        params = params.with_max_tokens(max_tokens);
    }

    let mut task = TaskSpec::new(args.kind)
        .with_inputs(inputs)
        .with_model_params(params);
    if let Some(parent) = args.parent {
        task = task.with_parent(parent);
    }

    let orchestrator = build_orchestrator(config, registry, args.api_key, args.dry_run)?;
    info!(task_id = %task.task_id, kind = %task.kind, "Running task");

    match orchestrator.run(task).await {
        PipelineResult::Success(artifact) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&artifact)?);
            } else {
                print_artifact_summary(&artifact);
            }
            Ok(())
        }
        PipelineResult::Failure(failure) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            }
            for record in &failure.history {
                warn!(
                    attempt = record.attempt,
                    phase = record.phase.as_str(),
                    error = record.error.as_deref().unwrap_or(""),
                    "Attempt rejected"
                );
            }
            anyhow::bail!("{}", failure)
        }
    }
}

async fn run_chain_command(
    args: ChainArgs,
    config: PipelineConfig,
    registry: Arc<SchemaRegistry>,
) -> anyhow::Result<()> {
    let mut params = ChainParams::new(args.topic);
    if let Some(objectives) = args.objectives {
        params = params.with_objectives(objectives);
    }
    if let Some(audience) = args.audience {
        params = params.with_audience(audience);
    }
    if let Some(content_type) = args.content_type {
        params = params.with_content_type(content_type);
    }
    if let Some(instructions) = args.instructions {
        params = params.with_instructions(instructions);
    }
    if let Some(model) = args.model {
        params = params.with_model(model);
    }

    let orchestrator = build_orchestrator(config, registry, args.api_key, args.dry_run)?;
    let result = match ContentChain::new(&orchestrator).run(&params).await {
        Ok(result) => result,
        Err(err) => {
            for artifact in &err.completed {
                warn!(artifact_id = %artifact.id, kind = %artifact.kind, "Stage artifact kept");
            }
            anyhow::bail!("{}", err)
        }
    };

    let usage = result.total_usage();
    if args.json {
        let output = serde_json::json!({
            "background": result.background,
            "plan": result.plan,
            "draft": result.draft,
            "total_usage": usage,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("✓ Content chain completed");
        for artifact in result.artifacts() {
            println!("  {:<22} {}", artifact.kind.as_str(), artifact.id);
        }
        if let Some(title) = draft_title(&result.draft) {
            println!("  Draft title: {}", title);
        }
        println!(
            "  Tokens: {} ({} in / {} out)",
            usage.total(),
            usage.input_tokens,
            usage.output_tokens
        );
    }
    Ok(())
}

fn print_artifact_summary(artifact: &Artifact) {
    let prov = &artifact.provenance;
    println!("✓ Stored {} artifact {}", artifact.kind, artifact.id);
    println!("  Schema:   {}", artifact.schema);
    println!("  Model:    {}", prov.model_params.model);
    println!(
        "  Attempts: {} ({} remote call(s))",
        prov.attempt_count, prov.transport_calls
    );
    println!("  Tokens:   {}", prov.usage.total());
    if let Some(parent) = prov.parent {
        println!("  Parent:   {}", parent);
    }
}

// ============================================================================
// Store commands
// ============================================================================

fn open_store(config: &PipelineConfig) -> FileArtifactStore {
    FileArtifactStore::new(config.artifact_path.clone())
}

async fn run_list_command(args: ListArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let store = open_store(config);
    let artifacts: Vec<Artifact> = store.list(args.kind).try_collect().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
        return Ok(());
    }
    if artifacts.is_empty() {
        println!("No artifacts found in {}", store.base_path().display());
        return Ok(());
    }
    for artifact in &artifacts {
        let label = artifact
            .get_str("title")
            .or_else(|| artifact.get_str("topic"))
            .unwrap_or("");
        println!(
            "{}  {}  {:<22} {}",
            artifact.id,
            artifact.created_at.format("%Y-%m-%d %H:%M:%S"),
            artifact.kind.as_str(),
            label
        );
    }
    println!("{} artifact(s)", artifacts.len());
    Ok(())
}

async fn run_show_command(args: ShowArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    let artifact = open_store(config).get(args.id).await?;
    println!("{}", serde_json::to_string_pretty(&artifact)?);
    Ok(())
}

async fn run_delete_command(args: DeleteArgs, config: &PipelineConfig) -> anyhow::Result<()> {
    open_store(config).delete(args.id).await?;
    println!("Deleted {}", args.id);
    Ok(())
}

fn run_schemas_command(args: SchemasArgs, registry: &SchemaRegistry) -> anyhow::Result<()> {
    let kinds = match args.kind {
        Some(kind) => vec![kind],
        None => registry.kinds(),
    };
    for kind in kinds {
        let schema = registry.get(kind)?;
        println!("{} ({})", schema.schema_ref(), kind);
        if !schema.description.is_empty() {
            println!("  {}", schema.description);
        }
        if !schema.inputs.is_empty() {
            println!("  Inputs:");
            for input in &schema.inputs {
                println!(
                    "    - {}{}",
                    input.name,
                    if input.required { "" } else { " (optional)" }
                );
            }
        }
        println!("  Output:");
        for line in schema.describe().lines() {
            println!("    {}", line);
        }
        println!();
    }
    Ok(())
}
