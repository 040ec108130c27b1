use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::config::GatewayConfig;
use crate::errors::ProviderError;
use crate::models::{Message, ProviderDescriptor, ProviderFamily};
use crate::prompt::{render_prompt, strip_echoed_markers};

/**
 * \brief Provider 适配器统一接口：发送对话，返回纯文本回复。
 * \details 适配器只负责请求与响应归一化，不修改会话历史。
 */
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    async fn send(
        &self,
        conversation: &[Message],
        provider: &ProviderDescriptor,
        api_key: Option<&str>,
    ) -> Result<String, ProviderError>;
}

/**
 * \brief 各接口族适配器的查找表。
 */
pub struct Adapters {
    openai: Box<dyn ChatAdapter>,
    huggingface: Box<dyn ChatAdapter>,
    gemini: Box<dyn ChatAdapter>,
}

impl Adapters {
    /**
     * \brief 构建共享同一个 HTTP 客户端（含超时）的适配器集合。
     */
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let params = SamplingParams {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };
        Ok(Self {
            openai: Box::new(OpenAiAdapter {
                client: client.clone(),
                params,
            }),
            huggingface: Box::new(HuggingFaceAdapter {
                client: client.clone(),
                params,
            }),
            gemini: Box::new(GeminiAdapter { client }),
        })
    }

    /** \brief 替换某个接口族的适配器。 */
    pub fn replace(mut self, family: ProviderFamily, adapter: Box<dyn ChatAdapter>) -> Self {
        match family {
            ProviderFamily::OpenAiCompatible => self.openai = adapter,
            ProviderFamily::HuggingFace => self.huggingface = adapter,
            ProviderFamily::Gemini => self.gemini = adapter,
        }
        self
    }

    pub fn for_family(&self, family: ProviderFamily) -> &dyn ChatAdapter {
        match family {
            ProviderFamily::OpenAiCompatible => self.openai.as_ref(),
            ProviderFamily::HuggingFace => self.huggingface.as_ref(),
            ProviderFamily::Gemini => self.gemini.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SamplingParams {
    max_tokens: u32,
    temperature: f32,
}

/**
 * \brief OpenAI 兼容接口（OpenAI、Groq 等）。
 */
pub struct OpenAiAdapter {
    client: reqwest::Client,
    params: SamplingParams,
}

#[async_trait]
impl ChatAdapter for OpenAiAdapter {
    async fn send(
        &self,
        conversation: &[Message],
        provider: &ProviderDescriptor,
        api_key: Option<&str>,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": provider.model,
            "messages": conversation,
            "temperature": self.params.temperature,
            "max_tokens": self.params.max_tokens,
        });

        let resp = self
            .client
            .post(&provider.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", api_key.unwrap_or_default()))
            .json(&body)
            .send()
            .await?;

        let v = read_json(resp).await?;
        extract_openai_content(&v)
            .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".into()))
    }
}

/**
 * \brief Hugging Face 单提示推理接口。
 */
pub struct HuggingFaceAdapter {
    client: reqwest::Client,
    params: SamplingParams,
}

#[async_trait]
impl ChatAdapter for HuggingFaceAdapter {
    async fn send(
        &self,
        conversation: &[Message],
        provider: &ProviderDescriptor,
        api_key: Option<&str>,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "inputs": render_prompt(conversation),
            "parameters": {
                "max_new_tokens": self.params.max_tokens,
                "temperature": self.params.temperature,
                "return_full_text": false,
            }
        });

        let mut req = self
            .client
            .post(&provider.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            req = req.header(AUTHORIZATION, format!("Bearer {}", key));
        }
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), text));
        }
        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);
        let text = resp.text().await?;

        let raw = if is_json {
            let v: Value = serde_json::from_str(&text)
                .map_err(|e| ProviderError::Malformed(e.to_string()))?;
            extract_hf_generated_text(&v)
                .ok_or_else(|| ProviderError::Malformed("missing generated_text".into()))?
        } else {
            text
        };
        Ok(strip_echoed_markers(&raw))
    }
}

/**
 * \brief Gemini generateContent 接口，API Key 通过 `key` 查询参数传递。
 */
pub struct GeminiAdapter {
    client: reqwest::Client,
}

#[async_trait]
impl ChatAdapter for GeminiAdapter {
    async fn send(
        &self,
        conversation: &[Message],
        provider: &ProviderDescriptor,
        api_key: Option<&str>,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "contents": [{
                "parts": [{"text": render_prompt(conversation)}]
            }]
        });

        let resp = self
            .client
            .post(&provider.endpoint)
            .query(&[("key", api_key.unwrap_or_default())])
            .json(&body)
            .send()
            .await?;

        let v = read_json(resp).await?;
        extract_gemini_content(&v).ok_or_else(|| {
            ProviderError::Malformed("missing candidates[0].content.parts".into())
        })
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value, ProviderError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), text));
    }
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(e.to_string()))
}

fn extract_openai_content(v: &Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/**
 * \brief 兼容 `[{generated_text}]`、`{generated_text}` 与纯字符串三种响应形态。
 */
fn extract_hf_generated_text(v: &Value) -> Option<String> {
    match v {
        Value::Array(items) => items
            .first()?
            .get("generated_text")?
            .as_str()
            .map(|s| s.to_string()),
        Value::Object(_) => v.get("generated_text")?.as_str().map(|s| s.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn extract_gemini_content(v: &Value) -> Option<String> {
    let parts = v
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_openai_content() {
        let v = json!({"choices": [{"message": {"role": "assistant", "content": "oi"}}]});
        assert_eq!(extract_openai_content(&v).as_deref(), Some("oi"));
        assert!(extract_openai_content(&json!({"choices": []})).is_none());
        assert!(extract_openai_content(&json!({"error": {"message": "x"}})).is_none());
    }

    #[test]
    fn test_extract_hf_shapes() {
        let list = json!([{"generated_text": "a"}]);
        let single = json!({"generated_text": "b"});
        let bare = json!("c");
        assert_eq!(extract_hf_generated_text(&list).as_deref(), Some("a"));
        assert_eq!(extract_hf_generated_text(&single).as_deref(), Some("b"));
        assert_eq!(extract_hf_generated_text(&bare).as_deref(), Some("c"));
        assert!(extract_hf_generated_text(&json!([])).is_none());
        assert!(extract_hf_generated_text(&json!({"error": "loading"})).is_none());
        assert!(extract_hf_generated_text(&json!(42)).is_none());
    }

    #[test]
    fn test_extract_gemini_joins_parts() {
        let v = json!({
            "candidates": [{"content": {"parts": [{"text": "Olá, "}, {"text": "tudo bem?"}]}}]
        });
        assert_eq!(extract_gemini_content(&v).as_deref(), Some("Olá, tudo bem?"));
        assert!(extract_gemini_content(&json!({"candidates": []})).is_none());
        let no_text = json!({"candidates": [{"content": {"parts": [{"inline": 1}]}}]});
        assert!(extract_gemini_content(&no_text).is_none());
    }

    #[test]
    fn test_for_family_dispatch_is_total() {
        let adapters = Adapters::new(&GatewayConfig::default()).expect("build adapters");
        for family in [
            ProviderFamily::OpenAiCompatible,
            ProviderFamily::HuggingFace,
            ProviderFamily::Gemini,
        ] {
            let _ = adapters.for_family(family);
        }
    }
}
