use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, get_service, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::services::ServeDir;

use crate::{
    db,
    error::ConvertError,
    llm::ToneClient,
    models::{HistoryEntry, ProviderId, ToneResult, MAX_INPUT_CHARS},
    telemetry,
};

type ApiError = (StatusCode, Json<Value>);

/**
 * \brief 服务共享状态：数据库路径与 Provider 客户端。每个请求各自打开连接。
 */
#[derive(Debug, Clone)]
pub struct AppState {
    pub db_path: String,
    pub client: ToneClient,
}

impl AppState {
    fn conn(&self) -> Result<rusqlite::Connection, ApiError> {
        db::open_db(&self.db_path).map_err(internal_err)
    }
}

/**
 * \brief 启动本地 HTTP 服务，提供静态前端与 API。
 * \param addr 监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(addr: &str) -> Result<()> {
    let ui_root = std::env::var("SOFTSPEAK_UI_DIR").unwrap_or_else(|_| "web".to_string());
    let state = Arc::new(AppState {
        db_path: db::default_db_path(),
        client: ToneClient::from_env(),
    });

    let conn = db::open_db(&state.db_path)?;
    db::migrate(&conn)?;
    telemetry::set_enabled(db::get_telemetry_enabled(&conn)?);
    drop(conn);

    let app = router(state, &ui_root);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, ui_root = %ui_root, "server started");
    println!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief 构建路由：`/api/` 下的路径为 JSON 接口，其余路径由静态目录提供。
 */
pub fn router(state: Arc<AppState>, ui_root: &str) -> Router {
    let static_service =
        get_service(ServeDir::new(ui_root).append_index_html_on_directories(true));

    Router::new()
        .route("/api/providers", get(list_providers))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/convert", post(convert))
        .route("/api/history", get(list_history).delete(clear_history))
        .route("/api/health", get(health_check))
        .fallback_service(static_service)
        .with_state(state)
}

#[derive(Serialize, Debug)]
struct ProviderItem {
    id: ProviderId,
    name: &'static str,
    configured: bool,
    selected: bool,
}

#[derive(Serialize, Debug)]
struct SettingsView {
    selected_provider: ProviderId,
    telemetry_enabled: bool,
    /** \brief 已配置的凭据（打码后）。 */
    api_keys: BTreeMap<&'static str, String>,
}

#[derive(Deserialize, Debug)]
struct SettingsUpdate {
    #[serde(default)]
    selected_provider: Option<String>,
    #[serde(default)]
    telemetry_enabled: Option<bool>,
    /** \brief Provider 标识符到凭据；空字符串表示删除。 */
    #[serde(default)]
    api_keys: Option<HashMap<String, String>>,
}

#[derive(Deserialize, Debug)]
struct ConvertInput {
    /** \brief 用户输入的气话 */
    text: String,
    /** \brief Provider 标识符，缺省为已选择的 Provider */
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Serialize, Debug)]
struct ConvertOutput {
    provider: ProviderId,
    results: ToneResult,
    entry_id: i64,
}

#[derive(Deserialize, Debug)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Serialize, Debug)]
struct HistoryResponse {
    entries: Vec<HistoryEntry>,
}

/**
 * \brief 列出全部 Provider 及其配置状态。
 */
async fn list_providers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProviderItem>>, ApiError> {
    let conn = state.conn()?;
    let keys = db::list_api_keys(&conn).map_err(internal_err)?;
    let selected = db::get_selected_provider(&conn).map_err(internal_err)?;
    let items = ProviderId::ALL
        .into_iter()
        .map(|p| ProviderItem {
            id: p,
            name: p.display_name(),
            configured: keys.iter().any(|(k, _)| *k == p),
            selected: p == selected,
        })
        .collect();
    Ok(Json(items))
}

fn build_settings_view(conn: &rusqlite::Connection) -> Result<SettingsView> {
    let api_keys = db::list_api_keys(conn)?
        .into_iter()
        .map(|(p, key)| (p.as_str(), mask_key(&key)))
        .collect();
    Ok(SettingsView {
        selected_provider: db::get_selected_provider(conn)?,
        telemetry_enabled: db::get_telemetry_enabled(conn)?,
        api_keys,
    })
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Result<Json<SettingsView>, ApiError> {
    let conn = state.conn()?;
    Ok(Json(build_settings_view(&conn).map_err(internal_err)?))
}

/**
 * \brief 更新设置。先校验全部 Provider 标识符，再统一写入。
 */
async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsView>, ApiError> {
    let selected = update
        .selected_provider
        .as_deref()
        .map(str::parse::<ProviderId>)
        .transpose()
        .map_err(bad_request)?;
    let keys = update
        .api_keys
        .unwrap_or_default()
        .into_iter()
        .map(|(id, key)| id.parse::<ProviderId>().map(|p| (p, key)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(bad_request)?;

    let conn = state.conn()?;
    for (provider, key) in &keys {
        db::set_api_key(&conn, *provider, key).map_err(internal_err)?;
    }
    if let Some(provider) = selected {
        db::set_selected_provider(&conn, provider).map_err(internal_err)?;
    }
    if let Some(enabled) = update.telemetry_enabled {
        db::set_telemetry_enabled(&conn, enabled).map_err(internal_err)?;
        telemetry::set_enabled(enabled);
    }
    telemetry::log_event(
        "server.settings",
        &format!(
            "update keys={} selected={:?} telemetry={:?}",
            keys.len(),
            selected.map(|p| p.as_str()),
            update.telemetry_enabled
        ),
    );
    Ok(Json(build_settings_view(&conn).map_err(internal_err)?))
}

/**
 * \brief 转换接口：使用已保存的凭据调用模型，成功后写入历史记录。
 */
async fn convert(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ConvertInput>,
) -> Result<Json<ConvertOutput>, ApiError> {
    let input_chars = input.text.chars().count();
    if input_chars > MAX_INPUT_CHARS {
        return Err(bad_request(format!("输入内容不能超过{}字", MAX_INPUT_CHARS)));
    }

    let (provider, credential) = {
        let conn = state.conn()?;
        let provider = match input.provider {
            Some(p) => p,
            None => db::get_selected_provider(&conn)
                .map_err(internal_err)?
                .as_str()
                .to_string(),
        };
        let credential = match provider.parse::<ProviderId>() {
            Ok(p) => db::get_api_key(&conn, p).map_err(internal_err)?.unwrap_or_default(),
            Err(_) => String::new(),
        };
        (provider, credential)
    };

    let results = match state.client.convert(&provider, &credential, &input.text).await {
        Ok(results) => results,
        Err(err) => {
            telemetry::log_conversion("server.convert", &provider, input_chars, Err(&err.to_string()));
            return Err(convert_err(err));
        }
    };
    telemetry::log_conversion("server.convert", &provider, input_chars, Ok(()));

    let provider = provider.parse::<ProviderId>().map_err(bad_request)?;
    let conn = state.conn()?;
    let entry = db::add_history(&conn, &input.text, &results, provider).map_err(internal_err)?;
    Ok(Json(ConvertOutput {
        provider,
        results,
        entry_id: entry.id,
    }))
}

async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let conn = state.conn()?;
    let entries = db::list_history(&conn, q.limit).map_err(internal_err)?;
    Ok(Json(HistoryResponse { entries }))
}

async fn clear_history(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let conn = state.conn()?;
    let removed = db::clear_history(&conn).map_err(internal_err)?;
    telemetry::log_event("server.history", &format!("clear removed={}", removed));
    Ok(Json(json!({ "removed": removed })))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/** \brief 凭据打码：保留前 3 位与后 4 位。 */
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

fn error_body(status: StatusCode, message: String) -> ApiError {
    (status, Json(json!({ "error": message })))
}

fn internal_err<E: std::fmt::Display>(e: E) -> ApiError {
    tracing::error!(error = %e, "request failed");
    error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn bad_request<E: std::fmt::Display>(e: E) -> ApiError {
    error_body(StatusCode::BAD_REQUEST, e.to_string())
}

fn convert_err(err: ConvertError) -> ApiError {
    let status = if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    };
    error_body(status, err.to_string())
}
