use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, get_service, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::services::ServeDir;

use crate::{gateway::Gateway, models::Message, telemetry};

/** \brief 共享网关；互斥锁保证同一时间只有一次对话写入。 */
pub type SharedGateway = Arc<Mutex<Gateway>>;

/**
 * \brief 启动本地 HTTP 服务，提供聊天组件的静态页面与 API。
 * \param addr 监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(addr: &str, gateway: Gateway) -> Result<()> {
    let app = router(gateway);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief 构建路由；未匹配的路径交给静态目录（`CLEANCHAT_UI_DIR`，默认 `web`）。
 */
pub fn router(gateway: Gateway) -> Router {
    let ui_root = std::env::var("CLEANCHAT_UI_DIR").unwrap_or_else(|_| "web".to_string());
    let static_service =
        get_service(ServeDir::new(ui_root).append_index_html_on_directories(true));

    let state: SharedGateway = Arc::new(Mutex::new(gateway));
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/config", get(get_config))
        .route("/api/provider", post(select_provider))
        .route("/api/credentials", post(set_credentials))
        .route("/api/transcript", get(get_transcript))
        .route("/api/health", get(health_check))
        .fallback_service(static_service)
        .with_state(state)
}

#[derive(Deserialize, Debug)]
struct ChatRequest {
    /** \brief 用户输入 */
    message: String,
}

#[derive(Serialize, Debug)]
struct ChatResponse {
    reply: String,
}

#[derive(Serialize, Debug)]
struct ProviderItem {
    id: String,
    label: String,
    model: String,
    requires_credential: bool,
    credential_url: String,
    is_active: bool,
}

#[derive(Serialize, Debug)]
struct ConfigState {
    active_provider: String,
    credential_configured: bool,
    welcome: Option<String>,
    providers: Vec<ProviderItem>,
}

#[derive(Deserialize, Debug)]
struct SelectProviderRequest {
    provider_id: String,
}

#[derive(Deserialize, Debug)]
struct CredentialRequest {
    api_key: String,
}

#[derive(Serialize, Debug)]
struct CredentialResponse {
    configured: bool,
}

#[derive(Serialize, Debug)]
struct TranscriptResponse {
    messages: Vec<Message>,
}

fn build_config_state(gateway: &Gateway) -> ConfigState {
    let active = gateway.active_provider().id.clone();
    let providers = gateway
        .registry()
        .all()
        .iter()
        .map(|p| ProviderItem {
            id: p.id.clone(),
            label: p.display_label.clone(),
            model: p.model.clone(),
            requires_credential: p.requires_credential,
            credential_url: p.credential_url.clone(),
            is_active: p.id == active,
        })
        .collect();
    ConfigState {
        active_provider: active,
        credential_configured: gateway.is_credential_configured(),
        welcome: gateway.welcome_message(),
        providers,
    }
}

/**
 * \brief 发送一条消息，返回助手回复（失败时为本地兜底回复）。
 */
async fn chat(State(state): State<SharedGateway>, Json(req): Json<ChatRequest>) -> Json<ChatResponse> {
    let mut gateway = state.lock().await;
    let reply = gateway.process_message(&req.message).await;
    Json(ChatResponse { reply })
}

async fn get_config(State(state): State<SharedGateway>) -> Json<ConfigState> {
    let gateway = state.lock().await;
    Json(build_config_state(&gateway))
}

/**
 * \brief 切换当前 Provider。
 */
async fn select_provider(
    State(state): State<SharedGateway>,
    Json(req): Json<SelectProviderRequest>,
) -> Result<Json<ConfigState>, (StatusCode, String)> {
    let mut gateway = state.lock().await;
    gateway
        .select_provider(&req.provider_id)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    telemetry::log_event(
        "server.provider",
        &format!("select provider={}", req.provider_id),
    );
    Ok(Json(build_config_state(&gateway)))
}

/**
 * \brief 为当前 Provider 保存 API Key。
 */
async fn set_credentials(
    State(state): State<SharedGateway>,
    Json(req): Json<CredentialRequest>,
) -> Result<Json<CredentialResponse>, (StatusCode, String)> {
    let mut gateway = state.lock().await;
    let configured = gateway
        .configure_credential(&req.api_key)
        .map_err(internal_err)?;
    Ok(Json(CredentialResponse { configured }))
}

async fn get_transcript(State(state): State<SharedGateway>) -> Json<TranscriptResponse> {
    let gateway = state.lock().await;
    Json(TranscriptResponse {
        messages: gateway.transcript().to_vec(),
    })
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

fn internal_err<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    telemetry::log_error("server", &e.to_string());
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::db::MemoryCredentialStore;
    use crate::gateway::{DeclinePrompt, EMPTY_INPUT_REPLY};
    use crate::registry::ProviderRegistry;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_router(store: MemoryCredentialStore) -> Router {
        let gateway = Gateway::load(
            ProviderRegistry::builtin(),
            Box::new(store),
            Box::new(DeclinePrompt),
            GatewayConfig::default(),
        )
        .expect("gateway");
        router(gateway)
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        let resp = app.oneshot(req).await.expect("response");
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(test_router(MemoryCredentialStore::new()), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_blank_chat_message() {
        let app = test_router(MemoryCredentialStore::new());
        let (status, body) = call(
            app,
            "POST",
            "/api/chat",
            Some(serde_json::json!({"message": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], EMPTY_INPUT_REPLY);
    }

    #[tokio::test]
    async fn test_config_lists_providers_with_default_active() {
        let (status, body) = call(test_router(MemoryCredentialStore::new()), "GET", "/api/config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active_provider"], "huggingface");
        assert_eq!(body["credential_configured"], false);
        assert!(body["welcome"].is_null());
        assert_eq!(body["providers"].as_array().map(|a| a.len()), Some(4));
    }

    #[tokio::test]
    async fn test_select_provider_and_credentials() {
        let store = MemoryCredentialStore::new();
        let app = test_router(store.clone());

        let (status, _) = call(
            app.clone(),
            "POST",
            "/api/provider",
            Some(serde_json::json!({"provider_id": "bogus"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            app.clone(),
            "POST",
            "/api/provider",
            Some(serde_json::json!({"provider_id": "openai"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active_provider"], "openai");
        assert!(body["welcome"].is_string());

        let (_, body) = call(
            app.clone(),
            "POST",
            "/api/credentials",
            Some(serde_json::json!({"api_key": " sk-test "})),
        )
        .await;
        assert_eq!(body["configured"], true);
        let creds = crate::db::CredentialStore::load(&store).expect("load");
        assert_eq!(creds.provider_id.as_deref(), Some("openai"));
        assert_eq!(creds.api_key.as_deref(), Some("sk-test"));

        let (_, body) = call(app, "GET", "/api/transcript", None).await;
        assert_eq!(body["messages"].as_array().map(|a| a.len()), Some(0));
    }
}
