use thiserror::Error;

/**
 * \brief 适配器调用失败的分类。
 * \details 这些错误不会从 `Gateway::process_message` 向外传播，统一在网关边界转换为本地兜底回复。
 */
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network failure: {0}")]
    Network(reqwest::Error),
    #[error("authentication rejected ({status})")]
    Auth { status: u16 },
    #[error("request failed: {status} -> {body}")]
    Http { status: u16, body: String },
    #[error("unexpected response payload: {0}")]
    Malformed(String),
    #[error("empty response")]
    Empty,
}

/** \brief Gemini 拒绝 API Key 时 `error.details[].reason` 的取值。 */
const INVALID_KEY_REASON: &str = "API_KEY_INVALID";

impl From<reqwest::Error> for ProviderError {
    /** \brief 去掉错误里的 URL，Gemini 的 API Key 位于查询参数中。 */
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.without_url())
    }
}

impl ProviderError {
    /**
     * \brief 按 HTTP 状态码与响应体归类失败。
     * \details 401/403 视为鉴权失败；Gemini 对无效 Key 返回 400 且错误原因为
     *          `API_KEY_INVALID`，同样归为鉴权失败。其余为普通 HTTP 失败。
     */
    pub fn from_status(status: u16, body: String) -> Self {
        let rejected_key = match status {
            401 | 403 => true,
            400 => body.contains(INVALID_KEY_REASON),
            _ => false,
        };
        if rejected_key {
            Self::Auth { status }
        } else {
            Self::Http { status, body }
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /** \brief 遥测用的短标签。 */
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Auth { .. } => "auth",
            Self::Http { .. } => "http",
            Self::Malformed(_) => "malformed",
            Self::Empty => "empty",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_splits_auth() {
        assert!(ProviderError::from_status(401, String::new()).is_auth());
        let err = ProviderError::from_status(500, "boom".into());
        assert!(!err.is_auth());
        assert_eq!(err.code(), "http");
        assert_eq!(err.to_string(), "request failed: 500 -> boom");
    }

    #[test]
    fn test_forbidden_and_rejected_key_are_auth() {
        assert!(ProviderError::from_status(403, String::new()).is_auth());

        let gemini = r#"{"error":{"code":400,"status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#;
        let err = ProviderError::from_status(400, gemini.into());
        assert!(err.is_auth());
        assert_eq!(err.code(), "auth");

        let bad_request = r#"{"error":{"status":"INVALID_ARGUMENT","message":"contents is empty"}}"#;
        assert!(!ProviderError::from_status(400, bad_request.into()).is_auth());
    }
}
