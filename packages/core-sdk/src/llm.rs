use std::collections::HashMap;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::models::{Message, ProviderId, ToneCategory, ToneResult};

/**
 * \brief 所有 Provider 共用的系统指令。
 */
pub const SYSTEM_PROMPT: &str = r#"你是一个职场沟通专家。我会给你一句带有情绪的"气话"，
请将它转换为5种不同语气的职场表达版本。

要求：
1. 每个版本必须在30字以内
2. 保持礼貌和专业，避免冲突
3. 针对不同场景和对象进行优化

请严格按照以下JSON格式返回，不要添加任何其他文字：
{
  "委婉礼貌": "...",
  "专业正式": "...",
  "友好和谐": "...",
  "幽默风趣": "...",
  "严肃认真": "..."
}"#;

/** \brief 固定采样温度。 */
pub const TEMPERATURE: f64 = 0.7;

/** \brief 固定的输出 token 上限，各 Provider 参数名不同。 */
pub const MAX_OUTPUT_TOKENS: u32 = 1000;

/// 文心没有 system 角色，系统指令拼在用户消息前。
const WENXIN_INPUT_PREFIX: &str = "\n\n用户输入的气话：";

const ENDPOINT_ENV_PREFIX: &str = "SOFTSPEAK_ENDPOINT_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /** \brief `Authorization: Bearer <key>` */
    Bearer,
    /** \brief `?access_token=<token>`，不带认证头 */
    AccessTokenQuery,
}

/**
 * \brief 请求/响应报文形态。每种形态自带请求体构造与回复提取。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    /** \brief OpenAI Chat Completions 及其兼容接口。 */
    ChatCompletions,
    /** \brief 阿里云 DashScope（通义千问）。 */
    DashScope,
    /** \brief 百度千帆（文心一言）。 */
    Ernie,
}

impl WireShape {
    /**
     * \brief 构造请求体。
     * \param model     模型名（Ernie 形态由 endpoint 决定模型，不写入请求体）
     * \param user_text 用户原始输入
     */
    pub fn build_body(self, model: &str, user_text: &str) -> Value {
        match self {
            WireShape::ChatCompletions => json!({
                "model": model,
                "messages": chat_messages(user_text),
                "temperature": TEMPERATURE,
                "max_tokens": MAX_OUTPUT_TOKENS,
            }),
            WireShape::DashScope => json!({
                "model": model,
                "input": {
                    "messages": chat_messages(user_text),
                },
                "parameters": {
                    "temperature": TEMPERATURE,
                    "max_tokens": MAX_OUTPUT_TOKENS,
                },
            }),
            WireShape::Ernie => {
                let messages = vec![Message {
                    role: "user".to_string(),
                    content: format!("{}{}{}", SYSTEM_PROMPT, WENXIN_INPUT_PREFIX, user_text),
                }];
                json!({
                    "messages": messages,
                    "temperature": TEMPERATURE,
                    "max_output_tokens": MAX_OUTPUT_TOKENS,
                })
            }
        }
    }

    /** \brief 模型回复所在字段，用于错误信息。 */
    pub fn reply_field(self) -> &'static str {
        match self {
            WireShape::ChatCompletions => "choices[0].message.content",
            WireShape::DashScope => "output.text",
            WireShape::Ernie => "result",
        }
    }

    /**
     * \brief 从响应体中取出模型回复文本。
     * \return 外层对象缺失时为 `MissingReply::Container`；外层存在但回复字段缺失或不是字符串时为 `MissingReply::Text`
     */
    pub fn extract_reply(self, body: &Value) -> Result<&str, MissingReply> {
        let (container, key) = match self {
            WireShape::ChatCompletions => ("/choices/0/message", "content"),
            WireShape::DashScope => ("/output", "text"),
            WireShape::Ernie => ("", "result"),
        };
        let container = body
            .pointer(container)
            .filter(|v| !v.is_null())
            .ok_or(MissingReply::Container)?;
        container
            .get(key)
            .and_then(Value::as_str)
            .ok_or(MissingReply::Text)
    }
}

/**
 * \brief 回复文本缺失的位置。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReply {
    Container,
    Text,
}

/**
 * \brief Provider 的静态配置，进程内只读。
 */
#[derive(Debug)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub endpoint: &'static str,
    pub model: &'static str,
    pub auth: AuthScheme,
    pub shape: WireShape,
    /** \brief 传输错误文案里的名称，如 "OpenAI API error: 401"。 */
    pub error_label: &'static str,
}

static OPENAI: ProviderConfig = ProviderConfig {
    id: ProviderId::OpenAI,
    endpoint: "https://api.openai.com/v1/chat/completions",
    model: "gpt-4",
    auth: AuthScheme::Bearer,
    shape: WireShape::ChatCompletions,
    error_label: "OpenAI",
};

static QIANWEN: ProviderConfig = ProviderConfig {
    id: ProviderId::Qianwen,
    endpoint: "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation",
    model: "qwen-turbo",
    auth: AuthScheme::Bearer,
    shape: WireShape::DashScope,
    error_label: "通义千问",
};

static WENXIN: ProviderConfig = ProviderConfig {
    id: ProviderId::Wenxin,
    endpoint: "https://aip.baidubce.com/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions",
    model: "ernie-bot-turbo",
    auth: AuthScheme::AccessTokenQuery,
    shape: WireShape::Ernie,
    error_label: "文心一言",
};

static DEEPSEEK: ProviderConfig = ProviderConfig {
    id: ProviderId::Deepseek,
    endpoint: "https://api.deepseek.com/v1/chat/completions",
    model: "deepseek-chat",
    auth: AuthScheme::Bearer,
    shape: WireShape::ChatCompletions,
    error_label: "Deepseek",
};

/**
 * \brief 查询 Provider 的静态配置。
 */
pub fn provider_config(provider: ProviderId) -> &'static ProviderConfig {
    match provider {
        ProviderId::OpenAI => &OPENAI,
        ProviderId::Qianwen => &QIANWEN,
        ProviderId::Wenxin => &WENXIN,
        ProviderId::Deepseek => &DEEPSEEK,
    }
}

/**
 * \brief 多 Provider 调用客户端。
 * \details 无可变共享状态，可 `clone` 后并发使用；endpoint 覆盖仅用于代理或测试。
 */
#[derive(Debug, Clone, Default)]
pub struct ToneClient {
    http: reqwest::Client,
    endpoints: HashMap<ProviderId, String>,
}

impl ToneClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self {
            http,
            endpoints: HashMap::new(),
        }
    }

    /**
     * \brief 覆盖某个 Provider 的 endpoint。
     */
    pub fn with_endpoint(mut self, provider: ProviderId, url: impl Into<String>) -> Self {
        self.endpoints.insert(provider, url.into());
        self
    }

    /**
     * \brief 读取 `SOFTSPEAK_ENDPOINT_<PROVIDER>` 环境变量作为 endpoint 覆盖。
     */
    pub fn from_env() -> Self {
        let mut client = Self::new();
        for provider in ProviderId::ALL {
            let key = format!(
                "{}{}",
                ENDPOINT_ENV_PREFIX,
                provider.as_str().to_ascii_uppercase()
            );
            if let Ok(url) = std::env::var(&key) {
                if !url.trim().is_empty() {
                    client = client.with_endpoint(provider, url.trim());
                }
            }
        }
        client
    }

    /** \brief 实际使用的 endpoint（覆盖优先）。 */
    pub fn endpoint(&self, provider: ProviderId) -> &str {
        self.endpoints
            .get(&provider)
            .map(String::as_str)
            .unwrap_or(provider_config(provider).endpoint)
    }

    /**
     * \brief 向指定 Provider 发出一次请求并解析为五种语气。
     * \details 不做输入校验、重试或超时控制；凭据只写入本次请求。
     */
    pub async fn invoke(
        &self,
        provider: ProviderId,
        credential: &str,
        user_text: &str,
    ) -> Result<ToneResult, ProviderError> {
        let config = provider_config(provider);
        let endpoint = self.endpoint(provider);
        let body = config.shape.build_body(config.model, user_text);

        tracing::debug!(
            provider = %provider,
            endpoint,
            input_chars = user_text.chars().count(),
            "tone request"
        );

        let request = self
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json");
        let request = match config.auth {
            AuthScheme::Bearer => request.header(AUTHORIZATION, format!("Bearer {}", credential)),
            AuthScheme::AccessTokenQuery => request.query(&[("access_token", credential)]),
        };

        let resp = request
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Network {
                provider,
                source: source.without_url(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!(
                provider = %provider,
                status = status.as_u16(),
                body = %truncate_chars(&text, 200),
                "tone request failed"
            );
            return Err(ProviderError::Status {
                provider,
                status: status.as_u16(),
            });
        }

        let raw = resp
            .text()
            .await
            .map_err(|source| ProviderError::Network {
                provider,
                source: source.without_url(),
            })?;
        let envelope: Value = serde_json::from_str(&raw)
            .map_err(|source| ProviderError::InvalidBody { provider, source })?;
        let reply = config
            .shape
            .extract_reply(&envelope)
            .map_err(|missing| {
                let field = config.shape.reply_field();
                match missing {
                    MissingReply::Container => ProviderError::MissingField { provider, field },
                    MissingReply::Text => ProviderError::ReplyMissing { provider, field },
                }
            })?;
        parse_tone_reply(provider, reply)
    }
}

/**
 * \brief 将模型回复文本解析为 `ToneResult`，要求五个语气键齐全。
 */
pub fn parse_tone_reply(provider: ProviderId, reply: &str) -> Result<ToneResult, ProviderError> {
    let value: Value = serde_json::from_str(reply)
        .map_err(|source| ProviderError::ReplyNotJson { provider, source })?;
    let map = value
        .as_object()
        .ok_or_else(|| ProviderError::IncompleteToneMap {
            provider,
            missing: ToneCategory::ALL.iter().map(|c| c.label()).collect(),
        })?;
    ToneResult::from_map(map).map_err(|missing| ProviderError::IncompleteToneMap { provider, missing })
}

fn chat_messages(user_text: &str) -> Vec<Message> {
    vec![
        Message {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        },
        Message {
            role: "user".to_string(),
            content: user_text.to_string(),
        },
    ]
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
