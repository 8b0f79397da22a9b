use crate::error::ConvertError;
use crate::llm::ToneClient;
use crate::models::{ConversionRequest, ProviderId, ToneResult};

/**
 * \brief 转换入口：校验输入、调用对应 Provider，并把失败映射为面向用户的错误。
 * \param provider   Provider 标识符，如 "openai"
 * \param credential API Key 或 access token
 * \param user_text  用户输入的气话
 */
pub async fn call_ai_model(
    provider: &str,
    credential: &str,
    user_text: &str,
) -> Result<ToneResult, ConvertError> {
    ToneClient::from_env()
        .convert(provider, credential, user_text)
        .await
}

impl ToneClient {
    /**
     * \brief 与 `call_ai_model` 语义一致，使用当前客户端发出请求。
     * \details 校验顺序固定：凭据 → 输入 → Provider，任一失败都不会发出请求。
     */
    pub async fn convert(
        &self,
        provider: &str,
        credential: &str,
        user_text: &str,
    ) -> Result<ToneResult, ConvertError> {
        if credential.trim().is_empty() {
            return Err(ConvertError::MissingCredential);
        }
        if user_text.trim().is_empty() {
            return Err(ConvertError::EmptyInput);
        }
        let provider: ProviderId = provider.parse()?;

        self.invoke(provider, credential, user_text)
            .await
            .map_err(|err| {
                if err.is_parse_failure() {
                    tracing::warn!(provider = %provider, error = %err, "unusable model reply");
                }
                ConvertError::from(err)
            })
    }

    pub async fn convert_request(
        &self,
        request: &ConversionRequest,
    ) -> Result<ToneResult, ConvertError> {
        self.convert(&request.provider, &request.credential, &request.user_text)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockProvider};
    use axum::http::StatusCode;

    const FIVE_TONES: &str =
        r#"{"委婉礼貌":"A","专业正式":"B","友好和谐":"C","幽默风趣":"D","严肃认真":"E"}"#;

    async fn ok_mock() -> MockProvider {
        MockProvider::spawn(StatusCode::OK, testing::chat_reply(FIVE_TONES)).await
    }

    #[tokio::test]
    async fn test_round_trip_openai() {
        let mock = ok_mock().await;
        let result = mock
            .client()
            .convert("openai", "key", "我很生气")
            .await
            .unwrap();
        let expected: ToneResult = serde_json::from_str(FIVE_TONES).unwrap();
        assert_eq!(result, expected);
        assert_eq!(result.tactful, "A");
        assert_eq!(result.serious, "E");
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_before_any_request() {
        let mock = ok_mock().await;
        for provider in ["openai", "qianwen", "wenxin", "deepseek", "unknown-model"] {
            for credential in ["", "   ", "\t\n"] {
                let err = mock
                    .client()
                    .convert(provider, credential, "我很生气")
                    .await
                    .unwrap_err();
                assert!(matches!(err, ConvertError::MissingCredential));
                assert_eq!(err.to_string(), "请先在设置中配置API密钥");
            }
        }
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_call_ai_model_empty_credential_message() {
        let err = call_ai_model("openai", "", "我很生气").await.unwrap_err();
        assert_eq!(err.to_string(), ConvertError::MissingCredential.to_string());
    }

    #[tokio::test]
    async fn test_empty_input_before_any_request() {
        let mock = ok_mock().await;
        for text in ["", "   "] {
            let err = mock
                .client()
                .convert("openai", "valid-key", text)
                .await
                .unwrap_err();
            assert!(matches!(err, ConvertError::EmptyInput));
            assert_eq!(err.to_string(), "请输入要转换的内容");
        }
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_provider_before_any_request() {
        let mock = ok_mock().await;
        let err = mock
            .client()
            .convert("unknown-model", "valid-key", "test input")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedProvider(ref id) if id == "unknown-model"));
        assert_eq!(err.to_string(), "不支持的模型: unknown-model");
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_validation_order_credential_then_input() {
        let mock = ok_mock().await;
        let err = mock.client().convert("nope", "", "").await.unwrap_err();
        assert!(matches!(err, ConvertError::MissingCredential));
        let err = mock.client().convert("nope", "key", "").await.unwrap_err();
        assert!(matches!(err, ConvertError::EmptyInput));
    }

    #[tokio::test]
    async fn test_status_failure_is_transport_failure() {
        let mock = MockProvider::spawn(StatusCode::UNAUTHORIZED, "{}".into()).await;
        let err = mock
            .client()
            .convert("openai", "invalid-key", "test")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::TransportFailure { provider: ProviderId::OpenAI, status: 401 }
        ));
        assert_eq!(err.to_string(), "OpenAI API error: 401");
    }

    #[tokio::test]
    async fn test_qianwen_status_message_uses_chinese_label() {
        let mock = MockProvider::spawn(StatusCode::TOO_MANY_REQUESTS, "{}".into()).await;
        let err = mock
            .client()
            .convert("qianwen", "k", "test")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "通义千问 API error: 429");
    }

    #[tokio::test]
    async fn test_reply_not_json_is_malformed_response() {
        let mock =
            MockProvider::spawn(StatusCode::OK, testing::chat_reply("抱歉，我无法完成")).await;
        let err = mock
            .client()
            .convert("deepseek", "k", "test")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::MalformedModelResponse));
        assert_eq!(err.to_string(), "AI返回格式错误，请重试");
    }

    #[tokio::test]
    async fn test_incomplete_tone_map_is_malformed_response() {
        let reply = r#"{"委婉礼貌":"A","专业正式":"B","友好和谐":"C"}"#;
        let mock = MockProvider::spawn(StatusCode::OK, testing::ernie_reply(reply)).await;
        let err = mock
            .client()
            .convert("wenxin", "token123", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::MalformedModelResponse));
    }

    #[tokio::test]
    async fn test_wenxin_error_body_is_malformed_response() {
        let body = r#"{"error_code":110,"error_msg":"Access token invalid or no longer valid"}"#;
        let mock = MockProvider::spawn(StatusCode::OK, body.into()).await;
        let err = mock
            .client()
            .convert("wenxin", "token123", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::MalformedModelResponse));
        assert_eq!(err.to_string(), "AI返回格式错误，请重试");
    }

    #[tokio::test]
    async fn test_empty_choices_passes_through() {
        let mock = MockProvider::spawn(StatusCode::OK, r#"{"choices":[]}"#.into()).await;
        let err = mock
            .client()
            .convert("openai", "k", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnexpectedPayload { .. }));
    }

    #[tokio::test]
    async fn test_wenxin_network_failure_hides_token() {
        let client = ToneClient::new()
            .with_endpoint(ProviderId::Wenxin, testing::closed_endpoint().await);
        let err = client
            .convert("wenxin", "SECRET-TOKEN-123", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Network { .. }));
        let message = err.to_string();
        assert!(message.starts_with("文心一言"));
        assert!(!message.contains("SECRET-TOKEN-123"));
        assert!(!message.contains("access_token"));
    }

    #[tokio::test]
    async fn test_convert_request() {
        let mock = MockProvider::spawn(StatusCode::OK, testing::ernie_reply(FIVE_TONES)).await;
        let request = ConversionRequest {
            provider: "wenxin".into(),
            credential: "token123".into(),
            user_text: "hi".into(),
        };
        let result = mock.client().convert_request(&request).await.unwrap();
        assert_eq!(result.humorous, "D");

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query.as_deref(), Some("access_token=token123"));
        assert!(requests[0].header("authorization").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_conversions_are_independent() {
        let mock = ok_mock().await;
        let client = mock.client();
        let (a, b) = tokio::join!(
            client.convert("openai", "k1", "第一句"),
            client.convert("deepseek", "k2", "第二句"),
        );
        assert!(a.is_ok());
        assert!(b.is_ok());

        let mut paths: Vec<_> = mock.requests().into_iter().map(|r| r.path).collect();
        paths.sort();
        assert_eq!(paths, vec!["/deepseek", "/openai"]);
    }
}
