//! HTTP server implementation for the web UI.
//!
//! This module provides the axum-based HTTP server that serves the single-page
//! UI and the JSON API behind it.

use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Json},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::templates;
use crate::ai::{AiError, SqlAssistant, Verification};
use crate::config::ReportConfig;
use crate::db::Database;
use crate::db::schema::DatabaseSchema;
use crate::docx::{DOCX_MIME, Template, encode_base64};
use crate::error::{ApiError, ApiResult};
use crate::params::ParameterStore;
use crate::report::{ReportGenerator, output_file_name};
use crate::types::{Parameter, ParameterInput, ReportDate};

/// Server state shared across handlers.
#[derive(Clone)]
pub struct ReportServer {
    db: Database,
    params: Arc<Mutex<ParameterStore>>,
    report: Arc<ReportConfig>,
    assistant: Option<SqlAssistant>,
    max_upload_bytes: usize,
}

impl ReportServer {
    pub fn new(
        db: Database,
        params: ParameterStore,
        report: ReportConfig,
        assistant: Option<SqlAssistant>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            db,
            params: Arc::new(Mutex::new(params)),
            report: Arc::new(report),
            assistant,
            max_upload_bytes,
        }
    }

    fn params(&self) -> ApiResult<MutexGuard<'_, ParameterStore>> {
        self.params
            .lock()
            .map_err(|_| ApiError::internal("parameter store lock poisoned"))
    }

    fn assistant(&self) -> ApiResult<&SqlAssistant> {
        self.assistant
            .as_ref()
            .ok_or_else(|| ApiError::from(AiError::Disabled))
    }

    /// Schema listing for AI prompts, read off the async runtime.
    async fn schema_summary(&self) -> ApiResult<String> {
        let db = self.db.clone();
        let schema = tokio::task::spawn_blocking(move || db.get_schema())
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::database)?;
        Ok(schema.summary())
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Root endpoint - serves the single-page UI.
async fn root() -> Html<&'static str> {
    Html(templates::INDEX_TEMPLATE)
}

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// API root - returns available endpoints.
async fn api_root() -> impl IntoResponse {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/api/health",
            "parameters": "/api/parameters",
            "import": "/api/parameters/import",
            "export": "/api/parameters/export",
            "inspect": "/api/template/inspect",
            "generate": "/api/reports/generate",
            "suggest": "/api/ai/suggest",
            "verify": "/api/ai/verify",
            "schema": "/api/schema",
        }
    }))
}

async fn list_parameters(State(state): State<ReportServer>) -> ApiResult<Json<Vec<Parameter>>> {
    Ok(Json(state.params()?.list().to_vec()))
}

async fn create_parameter(
    State(state): State<ReportServer>,
    Json(input): Json<ParameterInput>,
) -> ApiResult<(StatusCode, Json<Parameter>)> {
    let param = state.params()?.add(input)?;
    info!(id = %param.id, name = %param.name, "Parameter created");
    Ok((StatusCode::CREATED, Json(param)))
}

async fn update_parameter(
    State(state): State<ReportServer>,
    Path(id): Path<String>,
    Json(input): Json<ParameterInput>,
) -> ApiResult<Json<Parameter>> {
    let param = state.params()?.update(&id, input)?;
    info!(id = %param.id, name = %param.name, "Parameter updated");
    Ok(Json(param))
}

async fn delete_parameter(
    State(state): State<ReportServer>,
    Path(id): Path<String>,
) -> ApiResult<Json<Parameter>> {
    let param = state.params()?.remove(&id)?;
    info!(id = %param.id, name = %param.name, "Parameter deleted");
    Ok(Json(param))
}

/// Replace the whole parameter set from a YAML body.
async fn import_parameters(
    State(state): State<ReportServer>,
    body: String,
) -> ApiResult<Json<Vec<Parameter>>> {
    let inputs = ParameterStore::parse_yaml(&body)?;
    let mut store = state.params()?;
    store.replace_all(inputs)?;
    info!(count = store.len(), "Parameters imported");
    Ok(Json(store.list().to_vec()))
}

async fn export_parameters(State(state): State<ReportServer>) -> ApiResult<impl IntoResponse> {
    let yaml = state.params()?.to_yaml()?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/yaml"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"parameters.yaml\"",
            ),
        ],
        yaml,
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InspectRequest {
    #[serde(default)]
    file_content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectResponse {
    placeholders: Vec<String>,
    /// Placeholders with a parameter of the same name.
    mapped: Vec<String>,
    /// Placeholders nothing will fill.
    unmapped: Vec<String>,
    /// Parameters the template never references.
    unused: Vec<String>,
}

async fn inspect_template(
    State(state): State<ReportServer>,
    Json(req): Json<InspectRequest>,
) -> ApiResult<Json<InspectResponse>> {
    if req.file_content.trim().is_empty() {
        return Err(ApiError::missing_field("fileContent"));
    }
    let placeholders = tokio::task::spawn_blocking(move || {
        Template::from_base64(&req.file_content).and_then(|t| t.placeholders())
    })
    .await
    .map_err(ApiError::internal)??;

    let names: Vec<String> = state
        .params()?
        .list()
        .iter()
        .map(|p| p.name.clone())
        .collect();
    let (mapped, unmapped): (Vec<String>, Vec<String>) = placeholders
        .iter()
        .cloned()
        .partition(|key| names.contains(key));
    let unused = names
        .into_iter()
        .filter(|name| !placeholders.contains(name))
        .collect();

    Ok(Json(InspectResponse {
        placeholders,
        mapped,
        unmapped,
        unused,
    }))
}

/// A parameter sent inline with a generation request.
#[derive(Deserialize)]
struct RequestParameter {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    sql: String,
}

impl From<RequestParameter> for Parameter {
    fn from(p: RequestParameter) -> Self {
        Parameter {
            id: p.id,
            name: p.name,
            description: p.description,
            sql: p.sql,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(default)]
    file_content: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    report_date: Option<String>,
    #[serde(default)]
    parameters: Option<Vec<RequestParameter>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    file_content: String,
    file_name: String,
    mime_type: &'static str,
}

async fn generate_report(
    State(state): State<ReportServer>,
    Json(req): Json<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    if req.file_content.trim().is_empty() {
        return Err(ApiError::missing_field("fileContent"));
    }
    if let Some(name) = &req.file_name
        && !name.to_ascii_lowercase().ends_with(".docx")
    {
        return Err(ApiError::invalid_value(
            "fileName",
            "only .docx templates are supported",
        ));
    }
    let date = match req.report_date.as_deref().map(str::trim) {
        None | Some("") => ReportDate::current(),
        Some(raw) => raw
            .parse::<ReportDate>()
            .map_err(|e| ApiError::invalid_value("reportDate", &e.to_string()))?,
    };
    let parameters: Vec<Parameter> = match req.parameters {
        Some(list) => list.into_iter().map(Parameter::from).collect(),
        None => state.params()?.list().to_vec(),
    };

    let file_name = output_file_name(req.file_name.as_deref(), &date);
    let db = state.db.clone();
    let report = Arc::clone(&state.report);
    let content = req.file_content;

    let generated = tokio::task::spawn_blocking(move || {
        let template = Template::from_base64(&content)?;
        ReportGenerator::new(&db, &report)
            .generate(&template, &parameters, &date)
            .map_err(ApiError::from)
    })
    .await
    .map_err(ApiError::internal)??;

    Ok(Json(GenerateResponse {
        file_content: encode_base64(&generated.content),
        file_name,
        mime_type: DOCX_MIME,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestRequest {
    #[serde(default)]
    parameter_name: String,
    #[serde(default)]
    description: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuggestResponse {
    sql_query: String,
}

async fn ai_suggest(
    State(state): State<ReportServer>,
    Json(req): Json<SuggestRequest>,
) -> ApiResult<Json<SuggestResponse>> {
    if req.parameter_name.trim().is_empty() {
        return Err(ApiError::missing_field("parameterName"));
    }
    if req.description.trim().is_empty() {
        return Err(ApiError::missing_field("description"));
    }
    let assistant = state.assistant()?;
    let schema = state.schema_summary().await?;
    let sql_query = assistant
        .suggest(req.parameter_name.trim(), req.description.trim(), &schema)
        .await
        .inspect_err(|e| warn!("SQL suggestion failed: {}", e))?;
    Ok(Json(SuggestResponse { sql_query }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    #[serde(default)]
    sql_query: String,
    #[serde(default)]
    expected_data_description: String,
}

async fn ai_verify(
    State(state): State<ReportServer>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Json<Verification>> {
    if req.sql_query.trim().is_empty() {
        return Err(ApiError::missing_field("sqlQuery"));
    }
    if req.expected_data_description.trim().is_empty() {
        return Err(ApiError::missing_field("expectedDataDescription"));
    }
    let assistant = state.assistant()?;
    let schema = state.schema_summary().await?;
    let verdict = assistant
        .verify(
            req.sql_query.trim(),
            req.expected_data_description.trim(),
            &schema,
        )
        .await
        .inspect_err(|e| warn!("SQL verification failed: {}", e))?;
    Ok(Json(verdict))
}

/// Tables and columns, as a reference while writing parameter SQL.
async fn api_schema(State(state): State<ReportServer>) -> ApiResult<Json<DatabaseSchema>> {
    let db = state.db.clone();
    let schema = tokio::task::spawn_blocking(move || db.get_schema())
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::database)?;
    Ok(Json(schema))
}

/// Build the router with all routes.
pub fn build_router(state: ReportServer) -> Router {
    // Configure CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        // Page routes
        .route("/", get(root))
        // Parameter routes
        .route(
            "/api/parameters",
            get(list_parameters).post(create_parameter),
        )
        .route(
            "/api/parameters/{id}",
            put(update_parameter).delete(delete_parameter),
        )
        .route("/api/parameters/import", post(import_parameters))
        .route("/api/parameters/export", get(export_parameters))
        // Report routes
        .route("/api/template/inspect", post(inspect_template))
        .route("/api/reports/generate", post(generate_report))
        // Assistant routes
        .route("/api/ai/suggest", post(ai_suggest))
        .route("/api/ai/verify", post(ai_verify))
        .route("/api/schema", get(api_schema))
        // API routes
        .route("/api", get(api_root))
        .route("/api/health", get(health))
        // Add middleware
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle for managing the server lifecycle.
pub struct ServerHandle {
    /// Channel to signal shutdown.
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Trigger a graceful shutdown and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!("Server task ended abnormally: {}", e);
        }
    }
}

/// Start the HTTP server on `bind:port` (port 0 picks a free port).
pub async fn start_server(state: ReportServer, bind: &str, port: u16) -> anyhow::Result<ServerHandle> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    let addr = listener.local_addr()?;

    info!("Report Forge listening on http://{}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Server shutting down");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(ServerHandle {
        shutdown_tx: Some(shutdown_tx),
        addr,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy",
            version: "0.1.0",
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("0.1.0"));
    }

    #[test]
    fn generate_request_accepts_camel_case() {
        let req: GenerateRequest = serde_json::from_str(
            r#"{"fileContent":"abc","fileName":"t.docx","reportDate":"2025-09",
                "parameters":[{"name":"x","sql":"SELECT 1"}]}"#,
        )
        .unwrap();
        assert_eq!(req.file_name.as_deref(), Some("t.docx"));
        assert_eq!(req.report_date.as_deref(), Some("2025-09"));
        let params = req.parameters.unwrap();
        assert_eq!(params[0].name, "x");
        assert!(params[0].id.is_empty());
    }
}
