use actix_cors::Cors;
use actix_web::error::{ErrorInternalServerError, InternalError};
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult};
use actix_ws::Message;
use clap::Parser;
use loomcore::{FlowError, RunId, Workflow, WorkflowId};
use loomnodes::NodesConfig;
use loomruntime::{LoomRuntime, NodeRegistry, RuntimeConfig};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const UNTITLED: &str = "Untitled Workflow";

#[derive(Parser, Debug)]
#[command(name = "loomserver", about = "Workflow trigger and run history API", version)]
struct Args {
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:3000")]
    bind: String,

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

    /// Capacity of the execution event channel
    #[arg(long, env = "EVENT_BUFFER_SIZE", default_value_t = 1000)]
    event_buffer: usize,
}

impl Args {
    fn nodes_config(&self) -> NodesConfig {
        NodesConfig {
            media_root: self.media_root.clone(),
            ffmpeg_path: self.ffmpeg.clone(),
            ffprobe_path: self.ffprobe.clone(),
            model_base_url: self.model_base_url.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

/// Application state shared across handlers
struct AppState {
    runtime: Arc<LoomRuntime>,
    /// Last graph triggered under each workflow id
    workflows: Arc<RwLock<HashMap<WorkflowId, Workflow>>>,
}

/// Response for a triggered run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    success: bool,
    run_id: RunId,
    workflow_id: WorkflowId,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl ErrorResponse {
    fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "loom"
    }))
}

/// Start a run of the posted graph and return without waiting for it
#[post("/api/run-workflow")]
async fn run_workflow(
    data: web::Data<AppState>,
    workflow: web::Json<Workflow>,
) -> ActixResult<impl Responder> {
    let mut workflow = workflow.into_inner();
    if workflow.name.is_empty() {
        workflow.name = UNTITLED.to_string();
    }
    let workflow_id = workflow.id;

    info!(
        "Triggering workflow {} ({}): {} nodes, {} edges",
        workflow.name,
        workflow_id,
        workflow.nodes.len(),
        workflow.edges.len()
    );

    // Only graphs that start a run are kept.
    match data.runtime.execute(workflow.clone()).await {
        Ok(handle) => {
            data.workflows.write().await.insert(workflow_id, workflow);
            Ok(HttpResponse::Ok().json(RunResponse {
                success: true,
                run_id: handle.run_id,
                workflow_id: handle.workflow_id,
            }))
        }
        Err(FlowError::Workflow(e)) => {
            info!("Rejected workflow {}: {}", workflow_id, e);
            Ok(HttpResponse::BadRequest().json(ErrorResponse::new(e)))
        }
        Err(e) => {
            error!("Failed to start workflow {}: {}", workflow_id, e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse::new(e)))
        }
    }
}

/// Get the graph last triggered under a workflow id
#[get("/api/workflow/{id}")]
async fn get_workflow(
    data: web::Data<AppState>,
    path: web::Path<WorkflowId>,
) -> ActixResult<impl Responder> {
    let workflow_id = path.into_inner();
    let workflows = data.workflows.read().await;

    match workflows.get(&workflow_id) {
        Some(workflow) => Ok(HttpResponse::Ok().json(workflow)),
        None => Ok(HttpResponse::NotFound().json(ErrorResponse::new(format!(
            "Workflow {} not found",
            workflow_id
        )))),
    }
}

/// A run with its node executions
#[get("/api/runs/{id}")]
async fn get_run(
    data: web::Data<AppState>,
    path: web::Path<RunId>,
) -> ActixResult<impl Responder> {
    let run_id = path.into_inner();

    match data.runtime.get_run(run_id).await {
        Ok(Some(snapshot)) => Ok(HttpResponse::Ok().json(snapshot)),
        Ok(None) => Ok(HttpResponse::NotFound().json(ErrorResponse::new(format!(
            "Run {} not found",
            run_id
        )))),
        Err(e) => Err(internal(e)),
    }
}

/// Most recent run of a workflow, or `{}` when it has never run
#[get("/api/workflow/{id}/latest-run")]
async fn latest_run(
    data: web::Data<AppState>,
    path: web::Path<WorkflowId>,
) -> ActixResult<impl Responder> {
    match data.runtime.latest_run(path.into_inner()).await {
        Ok(Some(snapshot)) => Ok(HttpResponse::Ok().json(snapshot)),
        Ok(None) => Ok(HttpResponse::Ok().json(serde_json::json!({}))),
        Err(e) => Err(internal(e)),
    }
}

/// Run history of a workflow, newest first
#[get("/api/workflow/{id}/runs")]
async fn list_runs(
    data: web::Data<AppState>,
    path: web::Path<WorkflowId>,
) -> ActixResult<impl Responder> {
    let runs = data.runtime.list_runs(path.into_inner()).await.map_err(internal)?;
    Ok(HttpResponse::Ok().json(runs))
}

fn internal(e: FlowError) -> actix_web::Error {
    error!("Record store query failed: {}", e);
    ErrorInternalServerError(e.to_string())
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            info!("WebSocket client lagging, skipped {} events", skipped);
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// List registered node handlers
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.runtime.registry();

    let nodes: Vec<_> = registry
        .list_node_types()
        .iter()
        .map(|node_type| {
            let metadata = registry.get_metadata(node_type).unwrap_or_default();
            serde_json::json!({
                "type": node_type,
                "description": metadata.description,
                "category": metadata.category,
                "inputs": metadata.inputs,
                "outputs": metadata.outputs,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(nodes))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting loom server");

    let nodes_config = args.nodes_config();
    if nodes_config.api_key.is_none() {
        info!("GEMINI_API_KEY not set; llm nodes will fail until it is");
    }

    let mut registry = NodeRegistry::new();
    loomnodes::register_all(&mut registry, &nodes_config);

    let runtime = LoomRuntime::with_registry(
        Arc::new(registry),
        RuntimeConfig {
            event_buffer_size: args.event_buffer,
        },
    );

    info!("Runtime initialized; media root {}", nodes_config.media_root.display());

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(runtime),
        workflows: Arc::new(RwLock::new(HashMap::new())),
    });

    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(ErrorResponse::new(message)),
        )
        .into()
    });

    info!("Server starting on http://{}", args.bind);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .app_data(json_config.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(run_workflow)
            .service(get_run)
            .service(latest_run)
            .service(list_runs)
            .service(get_workflow)
            .service(websocket_events)
            .service(list_node_types)
    })
    .bind(&args.bind)?
    .run()
    .await?;

    Ok(())
}
