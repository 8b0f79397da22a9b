use crate::models::ProviderId;

/**
 * \brief 适配层错误：一次 Provider 调用失败的具体原因。
 */
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Network {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}")]
    Status { provider: ProviderId, status: u16 },

    #[error("{provider} response body is not valid JSON: {source}")]
    InvalidBody {
        provider: ProviderId,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider} response is missing field `{field}`")]
    MissingField {
        provider: ProviderId,
        field: &'static str,
    },

    /** \brief 外层对象存在，但回复文本字段缺失或不是字符串。 */
    #[error("{provider} response has no reply text at `{field}`")]
    ReplyMissing {
        provider: ProviderId,
        field: &'static str,
    },

    #[error("{provider} reply is not valid JSON: {source}")]
    ReplyNotJson {
        provider: ProviderId,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider} reply JSON is missing tone keys: {}", .missing.join(", "))]
    IncompleteToneMap {
        provider: ProviderId,
        missing: Vec<&'static str>,
    },
}

impl ProviderError {
    /**
     * \brief 是否属于 JSON 解析类失败（服务可达，但返回内容不可用）。
     */
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            ProviderError::InvalidBody { .. }
                | ProviderError::ReplyMissing { .. }
                | ProviderError::ReplyNotJson { .. }
                | ProviderError::IncompleteToneMap { .. }
        )
    }
}

/**
 * \brief 面向用户的转换错误，`Display` 即界面直接展示的文案。
 */
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("请先在设置中配置API密钥")]
    MissingCredential,

    #[error("请输入要转换的内容")]
    EmptyInput,

    #[error("不支持的模型: {0}")]
    UnsupportedProvider(String),

    #[error("{} API error: {status}", error_label(.provider))]
    TransportFailure { provider: ProviderId, status: u16 },

    #[error("AI返回格式错误，请重试")]
    MalformedModelResponse,

    #[error("{} 网络请求失败: {source}", error_label(.provider))]
    Network {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    #[error("{} 返回内容缺少字段 {field}", error_label(.provider))]
    UnexpectedPayload {
        provider: ProviderId,
        field: &'static str,
    },
}

impl ConvertError {
    /**
     * \brief 是否为调用前的输入校验失败（未发出任何请求）。
     */
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConvertError::MissingCredential
                | ConvertError::EmptyInput
                | ConvertError::UnsupportedProvider(_)
        )
    }
}

impl From<ProviderError> for ConvertError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status { provider, status } => {
                ConvertError::TransportFailure { provider, status }
            }
            ProviderError::Network { provider, source } => {
                ConvertError::Network { provider, source }
            }
            ProviderError::MissingField { provider, field } => {
                ConvertError::UnexpectedPayload { provider, field }
            }
            ProviderError::InvalidBody { .. }
            | ProviderError::ReplyMissing { .. }
            | ProviderError::ReplyNotJson { .. }
            | ProviderError::IncompleteToneMap { .. } => ConvertError::MalformedModelResponse,
        }
    }
}

/** \brief 传输错误文案中使用的 Provider 名称。 */
fn error_label(provider: &ProviderId) -> &'static str {
    crate::llm::provider_config(*provider).error_label
}
