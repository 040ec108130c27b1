use std::{fs::OpenOptions, io::Write, path::PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

static TELEMETRY_ENABLED: Lazy<std::sync::RwLock<bool>> =
    Lazy::new(|| std::sync::RwLock::new(false));

/**
 * \brief 更新遥测开关状态。
 */
pub fn set_enabled(enabled: bool) {
    if let Ok(mut guard) = TELEMETRY_ENABLED.write() {
        *guard = enabled;
    }
}

/**
 * \brief 查询当前遥测开关状态。
 */
pub fn is_enabled() -> bool {
    TELEMETRY_ENABLED.read().map(|g| *g).unwrap_or(false)
}

/**
 * \brief 记录常规事件。
 */
pub fn log_event(category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = write_line("INFO", category, message) {
        eprintln!("telemetry write failed: {}", err);
    }
}

/**
 * \brief 记录错误事件。
 */
pub fn log_error(category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = write_line("ERROR", category, message) {
        eprintln!("telemetry write failed: {}", err);
    }
}

/** \brief 可能出现在错误信息里的凭据形态。 */
static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)(bearer\s+)[^\s\x22',]+", "${1}***"),
        (r"([?&]key=)[^&\s\x22']+", "${1}***"),
        (r"\b(sk|hf|gsk)([-_])[A-Za-z0-9_\-]{4,}", "${1}${2}***"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/**
 * \brief 写入日志前遮蔽 API Key、Bearer 令牌与 `key=` 查询参数。
 */
pub fn redact_secrets(message: &str) -> String {
    SECRET_PATTERNS
        .iter()
        .fold(message.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

/** \brief 日志目录，`CLEANCHAT_LOG_DIR` 可覆盖默认的 `logs`。 */
pub fn log_dir() -> PathBuf {
    std::env::var("CLEANCHAT_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"))
}

fn format_line(timestamp: &str, level: &str, category: &str, message: &str) -> String {
    format!("{} [{}] {} - {}", timestamp, level, category, message)
}

fn write_line(level: &str, category: &str, message: &str) -> Result<()> {
    let log_dir = log_dir();
    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)?;
    }
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("cleanchat.log"))?;
    let message = redact_secrets(message);
    writeln!(file, "{}", format_line(&timestamp, level, category, &message))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line("2024-01-01T00:00:00Z", "INFO", "gateway.reply", "provider=openai"),
            "2024-01-01T00:00:00Z [INFO] gateway.reply - provider=openai"
        );
    }

    #[test]
    fn test_redact_secrets() {
        assert_eq!(
            redact_secrets("header Authorization: Bearer sk-live-abc123"),
            "header Authorization: Bearer ***"
        );
        assert_eq!(
            redact_secrets("POST /v1beta/models/gemini:generateContent?key=AIzaSyXYZ&alt=json"),
            "POST /v1beta/models/gemini:generateContent?key=***&alt=json"
        );
        assert_eq!(
            redact_secrets(r#"{"error":"Incorrect API key provided: sk-proj-9f8e7d"}"#),
            r#"{"error":"Incorrect API key provided: sk-***"}"#
        );
        assert_eq!(redact_secrets("token hf_AbCdEf123"), "token hf_***");
        assert_eq!(
            redact_secrets("provider=openai kind=http"),
            "provider=openai kind=http"
        );
    }
}
