//! HTTP API tests against a server bound to an ephemeral port.

mod common;

use async_trait::async_trait;
use common::*;
use report_forge::ai::{AiError, LlmClient, SqlAssistant};
use report_forge::config::ReportConfig;
use report_forge::dashboard::{ReportServer, ServerHandle, start_server};
use report_forge::docx::encode_base64;
use report_forge::params::ParameterStore;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

/// Replies with a canned answer and records the prompts it was sent.
struct FakeClient {
    reply: Result<String, u16>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl FakeClient {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(status),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String, AiError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(AiError::Api {
                status: *status,
                body: "quota exceeded".into(),
            }),
        }
    }

    fn provider(&self) -> &'static str {
        "fake"
    }
}

struct TestServer {
    handle: ServerHandle,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(assistant: Option<SqlAssistant>) -> Self {
        Self::start_with_limit(assistant, 25 * 1024 * 1024).await
    }

    async fn start_with_limit(assistant: Option<SqlAssistant>, limit: usize) -> Self {
        let state = ReportServer::new(
            seeded_db(),
            ParameterStore::with_defaults(),
            ReportConfig::default(),
            assistant,
            limit,
        );
        let handle = start_server(state, "127.0.0.1", 0).await.unwrap();
        Self {
            handle,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.handle.addr(), path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

fn assistant(client: Arc<FakeClient>) -> SqlAssistant {
    SqlAssistant::new(client, "[REPORT_DATE]")
}

#[tokio::test]
async fn health_and_index() {
    let server = TestServer::start(None).await;

    let health: Value = server.get("/api/health").await.json().await.unwrap();
    assert_eq!(health["status"], "healthy");

    let page = server.get("/").await.text().await.unwrap();
    assert!(page.contains("Report Forge"));

    server.handle.shutdown().await;
}

#[tokio::test]
async fn parameter_crud() {
    let server = TestServer::start(None).await;

    let list: Vec<Value> = server.get("/api/parameters").await.json().await.unwrap();
    assert_eq!(list.len(), 3);

    let created = server
        .post(
            "/api/parameters",
            json!({"name": "product_count", "description": "Products", "sql": "SELECT COUNT(*) FROM products"}),
        )
        .await;
    assert_eq!(created.status(), 201);
    let created: Value = created.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let duplicate = server
        .post(
            "/api/parameters",
            json!({"name": "product_count", "description": "Again", "sql": "SELECT 1"}),
        )
        .await;
    assert_eq!(duplicate.status(), 409);
    let err: Value = duplicate.json().await.unwrap();
    assert_eq!(err["code"], "ALREADY_EXISTS");

    let invalid = server
        .post(
            "/api/parameters",
            json!({"name": "bad name", "description": "x", "sql": "SELECT 1"}),
        )
        .await;
    assert_eq!(invalid.status(), 400);

    let updated: Value = server
        .client
        .put(server.url(&format!("/api/parameters/{}", id)))
        .json(&json!({"name": "products", "description": "Products", "sql": "SELECT 3"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["id"], id.as_str());
    assert_eq!(updated["name"], "products");

    let deleted = server
        .client
        .delete(server.url(&format!("/api/parameters/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);

    let missing = server
        .client
        .delete(server.url(&format!("/api/parameters/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    server.handle.shutdown().await;
}

#[tokio::test]
async fn export_then_import_yaml() {
    let server = TestServer::start(None).await;

    let yaml = server
        .get("/api/parameters/export")
        .await
        .text()
        .await
        .unwrap();
    assert!(yaml.contains("total_sales"));

    let replacement = "- name: only_one\n  description: One\n  sql: SELECT 1\n";
    let imported: Vec<Value> = server
        .client
        .post(server.url("/api/parameters/import"))
        .body(replacement)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0]["name"], "only_one");

    let broken = server
        .client
        .post(server.url("/api/parameters/import"))
        .body("- name: x\n  description: d\n  sql: s\n- name: x\n  description: d\n  sql: s\n")
        .send()
        .await
        .unwrap();
    assert_eq!(broken.status(), 409);

    let list: Vec<Value> = server.get("/api/parameters").await.json().await.unwrap();
    assert_eq!(list.len(), 1);

    server.handle.shutdown().await;
}

#[tokio::test]
async fn generate_returns_filled_document() {
    let server = TestServer::start(None).await;
    let template = docx_with_body(&[
        &["Customers: [$new_customers]"],
        &["Top: [$top_product]"],
    ]);

    let response = server
        .post(
            "/api/reports/generate",
            json!({
                "fileContent": encode_base64(&template),
                "fileName": "monthly.docx",
                "reportDate": "2024-07",
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["fileName"], "monthly-2024-07.docx");

    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body["fileContent"].as_str().unwrap())
        .unwrap();
    let texts = paragraph_texts(&read_part(&bytes, "word/document.xml"));
    assert_eq!(texts, vec!["Customers: 1", "Top: Hoverboard"]);

    server.handle.shutdown().await;
}

#[tokio::test]
async fn generate_with_inline_parameters() {
    let server = TestServer::start(None).await;
    let template = docx_with_body(&[&["[$greeting] / [$broken]"]]);

    let body: Value = server
        .post(
            "/api/reports/generate",
            json!({
                "fileContent": encode_base64(&template),
                "reportDate": "2025-09",
                "parameters": [
                    {"name": "greeting", "sql": "SELECT 'hello ' || '[REPORT_DATE]'"},
                    {"name": "broken", "sql": "SELECT FROM"},
                ],
            }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["fileName"], "report-2025-09.docx");

    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body["fileContent"].as_str().unwrap())
        .unwrap();
    let texts = paragraph_texts(&read_part(&bytes, "word/document.xml"));
    assert_eq!(texts, vec!["hello 2025-09 / Query Error"]);

    server.handle.shutdown().await;
}

#[tokio::test]
async fn generate_rejects_bad_input() {
    let server = TestServer::start(None).await;
    let template = encode_base64(&docx_with_body(&[&["x"]]));

    let not_docx = server
        .post(
            "/api/reports/generate",
            json!({"fileContent": encode_base64(b"hello"), "reportDate": "2024-07"}),
        )
        .await;
    assert_eq!(not_docx.status(), 422);
    let err: Value = not_docx.json().await.unwrap();
    assert_eq!(err["code"], "INVALID_TEMPLATE");

    let wrong_name = server
        .post(
            "/api/reports/generate",
            json!({"fileContent": template, "fileName": "report.pdf", "reportDate": "2024-07"}),
        )
        .await;
    assert_eq!(wrong_name.status(), 400);

    let bad_date = server
        .post(
            "/api/reports/generate",
            json!({"fileContent": template, "reportDate": "July 2024"}),
        )
        .await;
    assert_eq!(bad_date.status(), 400);
    let err: Value = bad_date.json().await.unwrap();
    assert_eq!(err["field"], "reportDate");

    let empty = server
        .post("/api/reports/generate", json!({"reportDate": "2024-07"}))
        .await;
    assert_eq!(empty.status(), 400);

    server.handle.shutdown().await;
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let server = TestServer::start_with_limit(None, 1024).await;
    let response = server
        .post(
            "/api/reports/generate",
            json!({"fileContent": "A".repeat(4096), "reportDate": "2024-07"}),
        )
        .await;
    assert_eq!(response.status(), 413);
    server.handle.shutdown().await;
}

#[tokio::test]
async fn inspect_reports_mapped_and_unmapped() {
    let server = TestServer::start(None).await;
    let template = docx_with_body(&[&["[$total_sales] [$mystery]"]]);

    let body: Value = server
        .post(
            "/api/template/inspect",
            json!({"fileContent": encode_base64(&template)}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["placeholders"], json!(["total_sales", "mystery"]));
    assert_eq!(body["mapped"], json!(["total_sales"]));
    assert_eq!(body["unmapped"], json!(["mystery"]));
    assert_eq!(body["unused"], json!(["new_customers", "top_product"]));

    server.handle.shutdown().await;
}

#[tokio::test]
async fn schema_endpoint_lists_sample_tables() {
    let server = TestServer::start(None).await;
    let body: Value = server.get("/api/schema").await.json().await.unwrap();
    let names: Vec<&str> = body["tables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["customers", "products", "sales", "sales_items"]);
    server.handle.shutdown().await;
}

#[tokio::test]
async fn suggest_uses_schema_and_strips_fences() {
    let fake = FakeClient::replying("```sql\nSELECT COUNT(*) FROM products;\n```");
    let server = TestServer::start(Some(assistant(fake.clone()))).await;

    let response = server
        .post(
            "/api/ai/suggest",
            json!({"parameterName": "product_count", "description": "Number of products"}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["sqlQuery"], "SELECT COUNT(*) FROM products;");

    let prompts = fake.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].0.contains("products(id INTEGER PK"));
    assert!(prompts[0].1.contains("product_count"));
    drop(prompts);

    server.handle.shutdown().await;
}

#[tokio::test]
async fn verify_returns_verdict() {
    let fake = FakeClient::replying(r#"{"isSuitable": false, "reason": "counts rows, not revenue"}"#);
    let server = TestServer::start(Some(assistant(fake))).await;

    let body: Value = server
        .post(
            "/api/ai/verify",
            json!({"sqlQuery": "SELECT COUNT(*) FROM sales", "expectedDataDescription": "Revenue"}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"isSuitable": false, "reason": "counts rows, not revenue"}));

    server.handle.shutdown().await;
}

#[tokio::test]
async fn ai_failures_are_bad_gateway() {
    let server = TestServer::start(Some(assistant(FakeClient::failing(429)))).await;
    let response = server
        .post(
            "/api/ai/suggest",
            json!({"parameterName": "x", "description": "y"}),
        )
        .await;
    assert_eq!(response.status(), 502);
    let err: Value = response.json().await.unwrap();
    assert_eq!(err["code"], "AI_SERVICE_ERROR");
    assert_eq!(err["details"], "quota exceeded");
    server.handle.shutdown().await;

    let disabled = TestServer::start(None).await;
    let response = disabled
        .post(
            "/api/ai/verify",
            json!({"sqlQuery": "SELECT 1", "expectedDataDescription": "one"}),
        )
        .await;
    assert_eq!(response.status(), 502);
    disabled.handle.shutdown().await;
}
