//! 测试用的本地 Provider 模拟服务：记录收到的请求并返回固定响应。

use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use serde_json::{json, Value};

use crate::llm::ToneClient;
use crate::models::ProviderId;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Value,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
}

struct MockState {
    status: StatusCode,
    body: String,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub(crate) struct MockProvider {
    base: String,
    state: Arc<MockState>,
}

impl MockProvider {
    /**
     * \brief 在随机端口启动模拟服务，所有路径都返回同一状态码与响应体。
     */
    pub async fn spawn(status: StatusCode, body: String) -> Self {
        let state = Arc::new(MockState {
            status,
            body,
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new().fallback(record).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock provider");
        let addr = listener.local_addr().expect("mock addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock provider");
        });
        Self {
            base: format!("http://{}", addr),
            state,
        }
    }

    /** \brief 每个 Provider 指向 `/<provider id>` 的客户端。 */
    pub fn client(&self) -> ToneClient {
        ProviderId::ALL
            .into_iter()
            .fold(ToneClient::new(), |client, provider| {
                client.with_endpoint(provider, format!("{}/{}", self.base, provider))
            })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().expect("requests lock").clone()
    }
}

async fn record(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    state
        .requests
        .lock()
        .expect("requests lock")
        .push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(|q| q.to_string()),
            headers,
            body: serde_json::from_str(&body).unwrap_or(Value::Null),
        });
    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body.clone(),
    )
}

/** \brief 一个无人监听的地址，用于模拟网络失败。 */
pub(crate) async fn closed_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind closed endpoint");
    let addr = listener.local_addr().expect("closed endpoint addr");
    drop(listener);
    format!("http://{}/closed", addr)
}

pub(crate) fn chat_reply(content: &str) -> String {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
}

pub(crate) fn dashscope_reply(content: &str) -> String {
    json!({"output": {"text": content, "finish_reason": "stop"}}).to_string()
}

pub(crate) fn ernie_reply(content: &str) -> String {
    json!({"id": "as-1", "result": content}).to_string()
}
