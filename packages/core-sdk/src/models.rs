use serde::{Deserialize, Serialize};

/**
 * \brief 消息角色，序列化为小写，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/**
 * \brief 单条对话消息（Turn），创建后不可变。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /** \brief 角色：system/user/assistant */
    pub role: Role,
    /** \brief 内容 */
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/**
 * \brief Provider 接口族，决定使用哪个适配器。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderFamily {
    /** \brief `{model, messages}` 请求 / `choices[0].message.content` 响应 */
    OpenAiCompatible,
    /** \brief `{inputs, parameters}` 单提示推理 */
    HuggingFace,
    /** \brief `contents/parts` 单提示内容生成 */
    Gemini,
}

/**
 * \brief Provider 静态描述，进程生命周期内只读。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    /** \brief Provider 标识，如 "openai" */
    pub id: String,
    /** \brief 模型名 */
    pub model: String,
    /** \brief 请求地址 */
    pub endpoint: String,
    /** \brief 是否必须提供 API Key */
    pub requires_credential: bool,
    /** \brief 获取 API Key 的页面 */
    pub credential_url: String,
    /** \brief 显示名称 */
    pub display_label: String,
    pub family: ProviderFamily,
}

/**
 * \brief 凭据快照：当前 Provider 以及（可选的）对应 API Key。
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub provider_id: Option<String>,
    pub api_key: Option<String>,
}
