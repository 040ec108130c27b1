pub mod config;
pub mod conversation;
pub mod db;
pub mod errors;
pub mod fallback;
pub mod gateway;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod registry;
pub mod server;
pub mod telemetry;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::config::GatewayConfig;
    pub use crate::db::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
    pub use crate::fallback::fallback_response;
    pub use crate::gateway::{ChatSession, CredentialPrompt, DeclinePrompt, Gateway};
    pub use crate::models::{Credentials, Message, ProviderDescriptor, Role};
    pub use crate::registry::ProviderRegistry;
    pub use crate::{db, server, telemetry};
}
