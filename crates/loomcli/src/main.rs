use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use loomcore::{ExecutionEvent, NodeEvent, NodeSpec, NodeType, RunId, RunStatus, Workflow};
use loomnodes::NodesConfig;
use loomruntime::{build_execution_plan, LoomRuntime, NodeRegistry, RuntimeConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "Loom workflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file and wait for it to finish
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        backends: BackendArgs,
    },

    /// Validate a workflow file and print its execution levels
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node handlers
    Nodes,

    /// Write the sample image-crop-caption workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct BackendArgs {
    /// Directory local media references resolve against
    #[arg(long, env = "MEDIA_ROOT", default_value = "./public")]
    media_root: PathBuf,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "MODEL_BASE_URL", default_value = loomnodes::DEFAULT_MODEL_BASE_URL)]
    model_base_url: String,

    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg: String,

    #[arg(long, env = "FFPROBE_PATH", default_value = "ffprobe")]
    ffprobe: String,
}

impl From<BackendArgs> for NodesConfig {
    fn from(args: BackendArgs) -> Self {
        NodesConfig {
            media_root: args.media_root,
            ffmpeg_path: args.ffmpeg,
            ffprobe_path: args.ffprobe,
            model_base_url: args.model_base_url,
            api_key: args.api_key,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, verbose, backends } => {
            let default_level = if verbose { "debug" } else { "info" };
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(default_level)),
                )
                .init();

            let status = run_workflow(&file, backends.into()).await?;
            if status == RunStatus::Failed {
                anyhow::bail!("workflow run failed");
            }
        }

        Commands::Validate { file } => {
            validate_workflow(&file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn load_workflow(file: &Path) -> Result<Workflow> {
    let workflow_json = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let workflow: Workflow = serde_json::from_str(&workflow_json)
        .with_context(|| format!("parsing {}", file.display()))?;
    Ok(workflow)
}

async fn run_workflow(file: &Path, config: NodesConfig) -> Result<RunStatus> {
    println!("🚀 Loading workflow from: {}", file.display());

    let workflow = load_workflow(file)?;

    println!("📋 Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!();

    let mut registry = NodeRegistry::new();
    loomnodes::register_all(&mut registry, &config);

    let runtime = LoomRuntime::with_registry(Arc::new(registry), RuntimeConfig::default());

    // Subscribe before triggering so the run's first events are not missed
    let mut events = runtime.subscribe_events();

    let handle = runtime.execute(workflow).await?;
    let run_id = handle.run_id;

    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if print_event(run_id, event) {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });

    let status = handle.wait().await?;
    let _ = event_task.await;

    println!();
    println!("📊 Run Summary:");
    println!("   Run ID: {}", run_id);
    println!("   Status: {:?}", status);

    if let Some(snapshot) = runtime.get_run(run_id).await? {
        println!();
        println!("📤 Node executions:");
        for execution in &snapshot.executions {
            println!("   {} [{:?}]", execution.node_id, execution.status);
            if let Some(outputs) = &execution.outputs {
                println!("     output: {}", outputs);
            }
            if let Some(error) = &execution.error {
                println!("     error: {}", error);
            }
        }
    }

    Ok(status)
}

/// Print one event of the given run. Returns true once the run has finished.
fn print_event(run_id: RunId, event: ExecutionEvent) -> bool {
    match event {
        ExecutionEvent::RunStarted { run_id: id, .. } if id == run_id => {
            println!("▶️  Run started");
        }
        ExecutionEvent::LevelStarted { level, node_ids, .. } => {
            println!("  Level {}: {}", level, node_ids.join(", "));
        }
        ExecutionEvent::NodeStarted { node_id, node_type, .. } => {
            println!("  ⚡ Starting node: {} ({})", node_id, node_type);
        }
        ExecutionEvent::NodeCompleted { node_id, duration_ms, .. } => {
            println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
        }
        ExecutionEvent::NodeFailed { node_id, error, .. } => {
            println!("  ❌ Node {} failed: {}", node_id, error);
        }
        ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
            NodeEvent::Info { message } => {
                println!("     ℹ️  [{}] {}", node_id, message);
            }
            NodeEvent::Warning { message } => {
                println!("     ⚠️  [{}] {}", node_id, message);
            }
        },
        ExecutionEvent::RunFinished { run_id: id, status, duration_ms, .. } if id == run_id => {
            match status {
                RunStatus::Completed => println!("✨ Run completed in {}ms", duration_ms),
                _ => println!("💥 Run failed after {}ms", duration_ms),
            }
            return true;
        }
        _ => {}
    }
    false
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let workflow = load_workflow(file)?;
    workflow.validate()?;
    let plan = build_execution_plan(&workflow.nodes, &workflow.edges)?;

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Edges: {}", workflow.edges.len());
    println!();
    println!("   Execution levels:");
    for (level, node_ids) in plan.levels.iter().enumerate() {
        println!("     {}: {}", level, node_ids.join(", "));
    }

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Handlers:");
    println!();

    let mut registry = NodeRegistry::new();
    loomnodes::register_all(&mut registry, &NodesConfig::default());

    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
            for port in &metadata.inputs {
                let marker = if port.required { "*" } else { " " };
                println!("      {}{:<16} {}", marker, port.name, port.description);
            }
        } else {
            println!("  • {}", node_type);
        }
    }

    println!();
    println!("  Input nodes (text, image_upload, video_upload) pass their data through.");
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let mut workflow = Workflow::new("Image crop and caption");

    let upload = workflow.add_node(
        NodeSpec::new("upload", NodeType::ImageUpload)
            .with_data("imageUrl", "/uploads/sample.jpg")
            .with_position(100.0, 100.0),
    );
    let crop = workflow.add_node(
        NodeSpec::new("crop", NodeType::Crop)
            .with_data("x_percent", 25)
            .with_data("y_percent", 25)
            .with_data("width_percent", 50)
            .with_data("height_percent", 50)
            .with_position(350.0, 100.0),
    );
    let prompt = workflow.add_node(
        NodeSpec::new("prompt", NodeType::Text)
            .with_data("text", "Describe this image in one sentence.")
            .with_position(350.0, 300.0),
    );
    let caption = workflow.add_node(
        NodeSpec::new("caption", NodeType::Llm)
            .with_data("model", "gemini-pro")
            .with_position(600.0, 200.0),
    );

    workflow.connect(upload, "output", crop.clone(), "image_url");
    workflow.connect(crop, "output", caption.clone(), "images");
    workflow.connect(prompt, "output", caption, "user_message");

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Put an image at <media root>/uploads/sample.jpg, then run it with:");
    println!("  GEMINI_API_KEY=... loom run --file {}", output.display());

    Ok(())
}
