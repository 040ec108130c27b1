use std::time::Duration;

/**
 * \brief 网关运行参数。
 * \details 源行为没有超时；这里为每个外发请求加上超时（默认 30 秒）。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /** \brief 单次请求超时 */
    pub request_timeout: Duration,
    /** \brief max_tokens / max_new_tokens */
    pub max_tokens: u32,
    pub temperature: f32,
    /** \brief 回复少于该字符数时视为无效，走兜底回复 */
    pub min_reply_chars: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_tokens: 500,
            temperature: 0.7,
            min_reply_chars: 2,
        }
    }
}

impl GatewayConfig {
    /**
     * \brief 读取环境变量覆盖默认值；无法解析的值会被忽略。
     */
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(secs) = lookup("CLEANCHAT_TIMEOUT_SECS").and_then(|v| v.trim().parse::<u64>().ok())
        {
            if secs > 0 {
                cfg.request_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(n) = lookup("CLEANCHAT_MAX_TOKENS").and_then(|v| v.trim().parse::<u32>().ok()) {
            cfg.max_tokens = n;
        }
        if let Some(n) =
            lookup("CLEANCHAT_MIN_REPLY_CHARS").and_then(|v| v.trim().parse::<usize>().ok())
        {
            cfg.min_reply_chars = n;
        }
        cfg
    }
}

/**
 * \brief Provider 地址覆盖对应的环境变量名，如 `CLEANCHAT_ENDPOINT_OPENAI`。
 */
pub fn endpoint_env_key(provider_id: &str) -> String {
    format!(
        "CLEANCHAT_ENDPOINT_{}",
        provider_id.to_ascii_uppercase().replace('-', "_")
    )
}
