use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zenz_engine::hf_download::resolve_model_path;
use zenz_engine::{
    CandidateEvaluation, Conditions, GreedyOutput, RuntimeConfig, StopReason, ZenzEngine,
    ZenzError,
};

/// zenz conversion server
#[derive(Parser, Debug)]
#[command(name = "zenz-server")]
#[command(about = "HTTP API for zenz generation and candidate evaluation", long_about = None)]
struct Args {
    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug mode (exposes /api/tokenize endpoint)
    #[arg(long)]
    debug: bool,

    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Model variant id from models.toml (defaults to the registry default)
    #[arg(long)]
    model: Option<String>,

    /// Direct GGUF file path (overrides --model)
    #[arg(long)]
    gguf: Option<PathBuf>,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<ZenzEngine>,
    /// File the model was loaded from
    model_name: String,
    /// Debug mode enabled (--debug flag)
    debug_mode: bool,
}

type ApiError = (StatusCode, String);

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    prompt: String,
    #[serde(default = "default_max_tokens")]
    max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ConvertRequest {
    input: String,
    #[serde(default)]
    context: String,
    #[serde(flatten)]
    conditions: Conditions,
    #[serde(default = "default_max_tokens")]
    max_tokens: usize,
}

fn default_max_tokens() -> usize {
    32
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    text: String,
    output_tokens: usize,
    stop: StopReason,
    inference_time_ms: f64,
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    input: String,
    candidate: String,
    #[serde(default)]
    context: String,
    #[serde(flatten)]
    conditions: Conditions,
}

#[derive(Debug, Serialize)]
struct EvaluateResponse {
    /// Tagged form: PASS:<score>, FIX:<prefix>, WHOLE:<text> or ERROR
    result: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    inference_time_ms: f64,
}

impl EvaluateResponse {
    fn new(evaluation: CandidateEvaluation, inference_time_ms: f64) -> Self {
        let (score, text) = match &evaluation {
            CandidateEvaluation::Pass { score } => (Some(*score), None),
            CandidateEvaluation::FixRequired { prefix } => (None, Some(prefix.clone())),
            CandidateEvaluation::WholeResult { text } => (None, Some(text.clone())),
            CandidateEvaluation::Error => (None, None),
        };
        Self {
            result: evaluation.to_string(),
            kind: evaluation.kind(),
            score,
            text,
            inference_time_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigRequest {
    #[serde(default)]
    n_ctx: i32,
    #[serde(default)]
    n_threads: i32,
}

#[derive(Debug, Deserialize)]
struct TokenizeRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct TokenInfo {
    id: i32,
    text: String,
}

#[derive(Debug, Serialize)]
struct TokenizeResponse {
    tokens: Vec<TokenInfo>,
    model: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Default: info level, with --verbose: debug level
    let default_filter = if args.verbose {
        "zenz_server=debug,zenz_engine=debug,tower_http=debug"
    } else {
        "zenz_server=info,zenz_engine=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = resolve_model_path(args.gguf.as_deref(), args.model.as_deref())
        .context("Failed to locate model")?;
    tracing::info!("Loading model from {}...", path.display());
    let engine: ZenzEngine = ZenzEngine::new();
    engine
        .init_model(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    if args.debug {
        tracing::info!("Debug mode enabled - tokenization API available at /api/tokenize");
    }

    let state = AppState {
        engine: Arc::new(engine),
        model_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        debug_mode: args.debug,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/api/generate", post(generate_handler))
        .route("/api/convert", post(convert_handler))
        .route("/api/evaluate", post(evaluate_handler))
        .route("/api/config", get(get_config_handler).post(set_config_handler))
        .route("/health", get(health_handler));

    if args.debug {
        app = app.route("/api/tokenize", post(tokenize_handler));
    }

    let app = app
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors)
        .with_state(state);

    let bind_addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .await
        .context("failed to run server")?;
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "zenz-engine",
        "model": state.model_name,
        "initialized": state.engine.is_initialized(),
    }))
}

/// Run a blocking engine call off the async runtime.
async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ZenzEngine) -> T + Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| {
            tracing::error!("engine task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "engine task failed".to_string())
        })
}

fn generate_response(
    result: zenz_engine::Result<GreedyOutput>,
    started: Instant,
) -> Result<Json<GenerateResponse>, ApiError> {
    match result {
        Ok(output) => Ok(Json(GenerateResponse {
            output_tokens: output.tokens.len(),
            text: output.text,
            stop: output.stop,
            inference_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        })),
        Err(ZenzError::NotInitialized) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Model not initialized".to_string(),
        )),
        Err(e) => {
            tracing::error!("generation failed: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn generate_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let started = Instant::now();
    let result = run_blocking(&state, move |engine| {
        engine.try_generate(&req.prompt, req.max_tokens)
    })
    .await?;
    generate_response(result, started)
}

async fn convert_handler(
    State(state): State<AppState>,
    Json(req): Json<ConvertRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let started = Instant::now();
    let result = run_blocking(&state, move |engine| {
        engine.try_generate_with_context_and_conditions(
            &req.conditions,
            &req.context,
            &req.input,
            req.max_tokens,
        )
    })
    .await?;
    generate_response(result, started)
}

async fn evaluate_handler(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let started = Instant::now();
    let evaluation = run_blocking(&state, move |engine| {
        engine.candidate_evaluate(&req.conditions, &req.context, &req.input, &req.candidate)
    })
    .await?;
    let elapsed = started.elapsed().as_secs_f64() * 1000.0;
    Ok(Json(EvaluateResponse::new(evaluation, elapsed)))
}

async fn get_config_handler(State(state): State<AppState>) -> Json<RuntimeConfig> {
    Json(state.engine.runtime_config())
}

async fn set_config_handler(
    State(state): State<AppState>,
    Json(req): Json<ConfigRequest>,
) -> Json<RuntimeConfig> {
    Json(state.engine.set_runtime_config(req.n_ctx, req.n_threads))
}

/// Handle tokenization request (debug mode only)
async fn tokenize_handler(
    State(state): State<AppState>,
    Json(req): Json<TokenizeRequest>,
) -> Result<Json<TokenizeResponse>, ApiError> {
    if !state.debug_mode {
        return Err((
            StatusCode::FORBIDDEN,
            "Tokenize API is only available in debug mode".to_string(),
        ));
    }

    let pieces = run_blocking(&state, move |engine| engine.tokenize_display(&req.text))
        .await?
        .map_err(|e| {
            tracing::error!("Tokenize error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Tokenize error".to_string(),
            )
        })?;

    Ok(Json(TokenizeResponse {
        tokens: pieces
            .into_iter()
            .map(|p| TokenInfo {
                id: p.id,
                text: p.display,
            })
            .collect(),
        model: state.model_name.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unloaded_state(debug_mode: bool) -> AppState {
        AppState {
            engine: Arc::new(ZenzEngine::new()),
            model_name: String::new(),
            debug_mode,
        }
    }

    #[tokio::test]
    async fn test_tokenize_runs_off_the_async_worker() {
        let req = TokenizeRequest {
            text: "カンジ".to_string(),
        };
        let result = tokenize_handler(State(unloaded_state(true)), Json(req)).await;
        assert!(matches!(result, Err((code, _)) if code == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_tokenize_requires_debug_mode() {
        let req = TokenizeRequest {
            text: "カンジ".to_string(),
        };
        let result = tokenize_handler(State(unloaded_state(false)), Json(req)).await;
        assert!(matches!(result, Err((code, _)) if code == StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_generate_without_model_is_unavailable() {
        let req = GenerateRequest {
            prompt: "\u{ee00}カンジ\u{ee01}".to_string(),
            max_tokens: usize::MAX,
        };
        let result = generate_handler(State(unloaded_state(false)), Json(req)).await;
        assert!(matches!(result, Err((code, _)) if code == StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn test_convert_request_defaults() {
        let req: ConvertRequest = serde_json::from_str(r#"{"input": "カンジ"}"#).unwrap();
        assert_eq!(req.context, "");
        assert_eq!(req.max_tokens, 32);
        assert!(req.conditions.is_empty());
    }

    #[test]
    fn test_conditions_are_flattened() {
        let req: EvaluateRequest = serde_json::from_str(
            r#"{"input": "カンジ", "candidate": "漢字", "profile": "東京在住", "style": "丁寧"}"#,
        )
        .unwrap();
        assert_eq!(req.conditions.profile, "東京在住");
        assert_eq!(req.conditions.style, "丁寧");
        assert_eq!(req.conditions.topic, "");
    }

    #[test]
    fn test_evaluate_response_fields() {
        let pass = EvaluateResponse::new(CandidateEvaluation::Pass { score: -1.5 }, 2.0);
        assert_eq!(pass.result, "PASS:-1.500000");
        assert_eq!(pass.kind, "PASS");
        assert_eq!(pass.score, Some(-1.5));
        assert!(pass.text.is_none());

        let fix = EvaluateResponse::new(
            CandidateEvaluation::FixRequired {
                prefix: "漢".to_string(),
            },
            2.0,
        );
        let json = serde_json::to_value(&fix).unwrap();
        assert_eq!(json["result"], "FIX:漢");
        assert_eq!(json["text"], "漢");
        assert!(json.get("score").is_none());
    }
}
