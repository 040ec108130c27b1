use crate::config::endpoint_env_key;
use crate::models::{ProviderDescriptor, ProviderFamily};

pub const DEFAULT_PROVIDER_ID: &str = "huggingface";

const HF_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";

/**
 * \brief Provider 注册表：标识 -> 描述。
 * \details 未知或未设置的标识回落到默认 Provider（无需凭据的 Hugging Face）。
 */
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ProviderDescriptor>,
    default_index: usize,
}

impl ProviderRegistry {
    /**
     * \brief 内置 Provider 列表。
     */
    pub fn builtin() -> Self {
        let providers = vec![
            ProviderDescriptor {
                id: DEFAULT_PROVIDER_ID.to_string(),
                model: HF_MODEL.to_string(),
                endpoint: format!("https://api-inference.huggingface.co/models/{}", HF_MODEL),
                requires_credential: false,
                credential_url: "https://huggingface.co/settings/tokens".to_string(),
                display_label: "Hugging Face (gratuito)".to_string(),
                family: ProviderFamily::HuggingFace,
            },
            ProviderDescriptor {
                id: "openai".to_string(),
                model: "gpt-3.5-turbo".to_string(),
                endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
                requires_credential: true,
                credential_url: "https://platform.openai.com/api-keys".to_string(),
                display_label: "OpenAI".to_string(),
                family: ProviderFamily::OpenAiCompatible,
            },
            ProviderDescriptor {
                id: "groq".to_string(),
                model: "llama-3.1-8b-instant".to_string(),
                endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
                requires_credential: true,
                credential_url: "https://console.groq.com/keys".to_string(),
                display_label: "Groq".to_string(),
                family: ProviderFamily::OpenAiCompatible,
            },
            ProviderDescriptor {
                id: "gemini".to_string(),
                model: "gemini-1.5-flash".to_string(),
                endpoint: "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent".to_string(),
                requires_credential: true,
                credential_url: "https://aistudio.google.com/app/apikey".to_string(),
                display_label: "Google Gemini".to_string(),
                family: ProviderFamily::Gemini,
            },
        ];
        Self {
            providers,
            default_index: 0,
        }
    }

    /**
     * \brief 内置列表，并应用 `CLEANCHAT_ENDPOINT_<ID>` 地址覆盖。
     */
    pub fn from_env() -> Self {
        let mut registry = Self::builtin();
        let ids: Vec<String> = registry.providers.iter().map(|p| p.id.clone()).collect();
        for id in ids {
            if let Ok(url) = std::env::var(endpoint_env_key(&id)) {
                if !url.trim().is_empty() {
                    registry = registry.with_endpoint(&id, url.trim());
                }
            }
        }
        registry
    }

    /**
     * \brief 替换指定 Provider 的请求地址；未知标识时原样返回。
     */
    pub fn with_endpoint(mut self, id: &str, endpoint: &str) -> Self {
        if let Some(p) = self.providers.iter_mut().find(|p| p.id == id) {
            p.endpoint = endpoint.to_string();
        }
        self
    }

    pub fn lookup(&self, provider_id: Option<&str>) -> &ProviderDescriptor {
        provider_id
            .and_then(|id| self.get(id))
            .unwrap_or_else(|| self.default_provider())
    }

    /** \brief 精确查找，不回落默认。 */
    pub fn get(&self, provider_id: &str) -> Option<&ProviderDescriptor> {
        let wanted = provider_id.trim();
        self.providers
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(wanted))
    }

    pub fn default_provider(&self) -> &ProviderDescriptor {
        &self.providers[self.default_index]
    }

    pub fn all(&self) -> &[ProviderDescriptor] {
        &self.providers
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
