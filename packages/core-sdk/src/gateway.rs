use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::config::GatewayConfig;
use crate::conversation::Conversation;
use crate::db::CredentialStore;
use crate::errors::ProviderError;
use crate::fallback::fallback_response;
use crate::llm::{Adapters, ChatAdapter};
use crate::models::{Credentials, Message, ProviderDescriptor, ProviderFamily};
use crate::prompt::SYSTEM_PROMPT;
use crate::registry::ProviderRegistry;
use crate::telemetry;

/** \brief 空输入时的提示。 */
pub const EMPTY_INPUT_REPLY: &str = "Por favor, digite uma mensagem.";

/**
 * \brief 凭据获取回调（例如终端里的输入提示）。
 * \details 返回 `None` 或空白字符串表示用户拒绝，并非错误。
 */
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn acquire(&self, provider: &ProviderDescriptor) -> Option<String>;
}

/**
 * \brief 总是拒绝的凭据回调，用于无法交互的场景（HTTP 服务）。
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclinePrompt;

#[async_trait]
impl CredentialPrompt for DeclinePrompt {
    async fn acquire(&self, _provider: &ProviderDescriptor) -> Option<String> {
        None
    }
}

/**
 * \brief 单个会话的状态：对话历史与凭据缓存。
 */
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub conversation: Conversation,
    pub credentials: Credentials,
}

impl ChatSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            conversation: Conversation::new(SYSTEM_PROMPT),
            credentials,
        }
    }
}

/**
 * \brief AI 网关：选择 Provider、管理凭据、调用适配器，失败时回落到本地回复。
 */
pub struct Gateway {
    session: ChatSession,
    registry: ProviderRegistry,
    adapters: Adapters,
    store: Box<dyn CredentialStore>,
    prompt: Box<dyn CredentialPrompt>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(
        session: ChatSession,
        registry: ProviderRegistry,
        store: Box<dyn CredentialStore>,
        prompt: Box<dyn CredentialPrompt>,
        config: GatewayConfig,
    ) -> Result<Self> {
        let adapters = Adapters::new(&config)?;
        Ok(Self {
            session,
            registry,
            adapters,
            store,
            prompt,
            config,
        })
    }

    /**
     * \brief 从凭据存储恢复 Provider 与 API Key，创建新会话。
     * \details 存储中的未知 Provider 标识会回落到默认 Provider。
     */
    pub fn load(
        registry: ProviderRegistry,
        store: Box<dyn CredentialStore>,
        prompt: Box<dyn CredentialPrompt>,
        config: GatewayConfig,
    ) -> Result<Self> {
        let stored = store.provider_id()?;
        let provider_id = registry.lookup(stored.as_deref()).id.clone();
        let api_key = store.api_key(&provider_id)?;
        let session = ChatSession::new(Credentials {
            provider_id: Some(provider_id),
            api_key,
        });
        Self::new(session, registry, store, prompt, config)
    }

    /** \brief 替换某个接口族的适配器。 */
    pub fn with_adapter(mut self, family: ProviderFamily, adapter: Box<dyn ChatAdapter>) -> Self {
        self.adapters = self.adapters.replace(family, adapter);
        self
    }

    /**
     * \brief 处理一条用户消息，总是返回可展示的非空文本。
     */
    pub async fn process_message(&mut self, raw: &str) -> String {
        let text = raw.trim();
        if text.is_empty() {
            return EMPTY_INPUT_REPLY.to_string();
        }

        let provider = self.active_provider().clone();
        if provider.requires_credential && !self.is_credential_configured() {
            let answer = self
                .prompt
                .acquire(&provider)
                .await
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty());
            match answer {
                Some(key) => self.remember_credential(&provider.id, key),
                None => {
                    telemetry::log_event(
                        "gateway.credential",
                        &format!("declined provider={}", provider.id),
                    );
                    let reply = format!(
                        "{}\n\n{}",
                        fallback_response(text),
                        credential_hint(&provider)
                    );
                    self.session.conversation.append_exchange(text, reply.clone());
                    return reply;
                }
            }
        }

        let request = self.session.conversation.with_user_turn(text);
        let outcome = dispatch(
            &self.adapters,
            &provider,
            &request,
            self.session.credentials.api_key.as_deref(),
            self.config.min_reply_chars,
        )
        .await;

        let reply = match outcome {
            Ok(reply) => {
                telemetry::log_event(
                    "gateway.reply",
                    &format!(
                        "provider={} model={} turns={} reply_len={}",
                        provider.id,
                        provider.model,
                        request.len(),
                        reply.chars().count()
                    ),
                );
                reply
            }
            Err(err) => {
                if err.is_auth() {
                    self.forget_credential(&provider.id);
                }
                telemetry::log_error(
                    "gateway.fallback",
                    &format!("provider={} kind={} error={}", provider.id, err.code(), err),
                );
                fallback_response(text).to_string()
            }
        };

        let reply = if reply.trim().is_empty() {
            fallback_response(text).to_string()
        } else {
            reply
        };
        self.session.conversation.append_exchange(text, reply.clone());
        reply
    }

    fn remember_credential(&mut self, provider_id: &str, key: String) {
        if let Err(err) = self.store.save_api_key(provider_id, &key) {
            telemetry::log_error(
                "gateway.credential",
                &format!("persist failed provider={} error={}", provider_id, err),
            );
        }
        self.session.credentials.api_key = Some(key);
    }

    fn forget_credential(&mut self, provider_id: &str) {
        self.session.credentials.api_key = None;
        if let Err(err) = self.store.clear_api_key(provider_id) {
            telemetry::log_error(
                "gateway.credential",
                &format!("clear failed provider={} error={}", provider_id, err),
            );
        }
        telemetry::log_event(
            "gateway.credential",
            &format!("cleared after auth failure provider={}", provider_id),
        );
    }

    /**
     * \brief 为当前 Provider 配置 API Key；空白输入返回 `false`。
     */
    pub fn configure_credential(&mut self, key: &str) -> Result<bool> {
        let key = key.trim();
        if key.is_empty() {
            return Ok(false);
        }
        let provider_id = self.active_provider().id.clone();
        self.store.save_api_key(&provider_id, key)?;
        self.session.credentials.api_key = Some(key.to_string());
        Ok(true)
    }

    /**
     * \brief 切换 Provider 并持久化；对话历史保留，凭据改为该 Provider 已保存的 Key。
     */
    pub fn select_provider(&mut self, provider_id: &str) -> Result<&ProviderDescriptor> {
        let id = self
            .registry
            .get(provider_id)
            .map(|p| p.id.clone())
            .ok_or_else(|| anyhow!("unknown provider: {}", provider_id))?;
        self.store.save_provider(&id)?;
        let api_key = self.store.api_key(&id)?;
        self.session.credentials = Credentials {
            provider_id: Some(id),
            api_key,
        };
        Ok(self.active_provider())
    }

    pub fn active_provider(&self) -> &ProviderDescriptor {
        self.registry
            .lookup(self.session.credentials.provider_id.as_deref())
    }

    pub fn is_credential_configured(&self) -> bool {
        self.session
            .credentials
            .api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    /**
     * \brief 当前 Provider 需要凭据但尚未配置时的欢迎语。
     */
    pub fn welcome_message(&self) -> Option<String> {
        let provider = self.active_provider();
        if provider.requires_credential && !self.is_credential_configured() {
            Some(format!(
                "Olá! Sou seu assistente de limpeza inteligente. Para usar o {}, você precisará configurar uma API key ({}). Quando fizer sua primeira pergunta, será solicitada a configuração.",
                provider.display_label, provider.credential_url
            ))
        } else {
            None
        }
    }

    pub fn transcript(&self) -> &[Message] {
        self.session.conversation.transcript()
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }
}

// 只借用适配器表；`Gateway` 本身不是 Sync，不能跨 await 持有 `&self`。
async fn dispatch(
    adapters: &Adapters,
    provider: &ProviderDescriptor,
    request: &[Message],
    api_key: Option<&str>,
    min_reply_chars: usize,
) -> Result<String, ProviderError> {
    let reply = adapters
        .for_family(provider.family)
        .send(request, provider, api_key)
        .await?;
    validate_reply(reply, min_reply_chars)
}

fn validate_reply(reply: String, min_chars: usize) -> Result<String, ProviderError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() || trimmed.chars().count() < min_chars {
        return Err(ProviderError::Empty);
    }
    Ok(trimmed.to_string())
}

fn credential_hint(provider: &ProviderDescriptor) -> String {
    format!(
        "Dica: configure uma API key do {} ({}) para receber respostas da IA.",
        provider.display_label, provider.credential_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryCredentialStore;
    use crate::fallback;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedAdapter {
        reply: Result<&'static str, u16>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatAdapter for FixedAdapter {
        async fn send(
            &self,
            _conversation: &[Message],
            _provider: &ProviderDescriptor,
            _api_key: Option<&str>,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(status) => Err(ProviderError::from_status(status, String::new())),
            }
        }
    }

    fn gateway_with(reply: Result<&'static str, u16>) -> (Gateway, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway = Gateway::load(
            ProviderRegistry::builtin(),
            Box::new(MemoryCredentialStore::new()),
            Box::new(DeclinePrompt),
            GatewayConfig::default(),
        )
        .expect("gateway")
        .with_adapter(
            ProviderFamily::HuggingFace,
            Box::new(FixedAdapter {
                reply,
                calls: calls.clone(),
            }),
        );
        (gateway, calls)
    }

    #[tokio::test]
    async fn test_blank_input_short_circuits() {
        let (mut gateway, calls) = gateway_with(Ok("resposta"));
        assert_eq!(gateway.process_message("   \n").await, EMPTY_INPUT_REPLY);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(gateway.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_success_appends_trimmed_reply_once() {
        let (mut gateway, calls) = gateway_with(Ok("  Claro!  "));
        let reply = gateway.process_message(" olá ").await;
        assert_eq!(reply, "Claro!");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            gateway.transcript(),
            &[Message::user("olá"), Message::assistant("Claro!")]
        );
    }

    #[tokio::test]
    async fn test_too_short_reply_falls_back() {
        let (mut gateway, _) = gateway_with(Ok(" k "));
        let reply = gateway.process_message("quero agendar").await;
        assert_eq!(reply, fallback::fallback_response("quero agendar"));
        assert_eq!(gateway.session().conversation.message_count(), 3);
    }

    #[tokio::test]
    async fn test_http_failure_falls_back() {
        let (mut gateway, _) = gateway_with(Err(503));
        let reply = gateway.process_message("lavar o carro").await;
        assert_eq!(reply, fallback::fallback_response("lavar o carro"));
    }

    #[tokio::test]
    async fn test_select_provider_rejects_unknown() {
        let (mut gateway, _) = gateway_with(Ok("ok!"));
        assert!(gateway.select_provider("nope").is_err());
        assert_eq!(gateway.active_provider().id, "huggingface");
        let selected = gateway.select_provider("gemini").expect("select");
        assert_eq!(selected.id, "gemini");
        assert!(gateway.welcome_message().is_some());
    }

    #[test]
    fn test_validate_reply_threshold() {
        assert!(matches!(validate_reply("  ".into(), 2), Err(ProviderError::Empty)));
        assert!(matches!(validate_reply("a".into(), 2), Err(ProviderError::Empty)));
        assert_eq!(validate_reply(" ok ".into(), 2).expect("valid"), "ok");
        assert_eq!(validate_reply("é".into(), 1).expect("valid"), "é");
    }
}
