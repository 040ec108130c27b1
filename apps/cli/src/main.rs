use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use cleanchat_core_sdk::config::GatewayConfig;
use cleanchat_core_sdk::db::{self, SqliteCredentialStore};
use cleanchat_core_sdk::gateway::{CredentialPrompt, DeclinePrompt, Gateway};
use cleanchat_core_sdk::models::ProviderDescriptor;
use cleanchat_core_sdk::registry::ProviderRegistry;
use cleanchat_core_sdk::{server, telemetry};

/**
 * \brief CLI 程序入口：清洁服务聊天助手。
 */
#[derive(Parser, Debug)]
#[command(name = "cleanchat", version, about = "Cleaning-service chat assistant")]
struct Cli {
    /** \brief 配置数据库路径 */
    #[arg(long, global = true, default_value = "cleanchat.db")]
    db: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 交互式聊天，输入 /sair 退出。
     */
    Chat,

    /**
     * \brief 发送单条消息并打印回复。
     */
    Ask {
        #[arg(long)]
        message: String,
    },

    /**
     * \brief 选择 Provider、保存 API Key 或切换遥测。
     * \param provider  Provider 标识
     * \param api_key   当前 Provider 的 API Key
     * \param telemetry 是否写入本地日志
     */
    Configure {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        telemetry: Option<bool>,
    },

    /**
     * \brief 列出可用 Provider。
     */
    Providers,

    /**
     * \brief 启动本地 HTTP 服务，供网页聊天组件调用。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },
}

/**
 * \brief 在终端中请求用户粘贴 API Key；空输入视为拒绝。
 */
struct StdinPrompt;

#[async_trait]
impl CredentialPrompt for StdinPrompt {
    async fn acquire(&self, provider: &ProviderDescriptor) -> Option<String> {
        println!(
            "Para usar o assistente de IA ({}), você precisa de uma API key.\nObtenha em: {}\nCole sua API key aqui (será salva localmente), ou deixe em branco para continuar sem:",
            provider.display_label, provider.credential_url
        );
        match read_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => Some(line.trim().to_string()),
            _ => None,
        }
    }
}

async fn read_line() -> Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| -> std::io::Result<Option<String>> {
        let mut buf = String::new();
        let n = std::io::stdin().read_line(&mut buf)?;
        Ok(if n == 0 { None } else { Some(buf) })
    })
    .await
    .context("stdin reader panicked")??;
    Ok(line)
}

fn open_store(path: &Path) -> Result<SqliteCredentialStore> {
    let conn = db::open_db(path).context("open database failed")?;
    db::migrate(&conn).context("apply migrations failed")?;
    let telemetry_enabled = db::get_telemetry_enabled(&conn).unwrap_or(false);
    telemetry::set_enabled(telemetry_enabled);
    Ok(SqliteCredentialStore::new(conn))
}

fn build_gateway(
    store: SqliteCredentialStore,
    prompt: Box<dyn CredentialPrompt>,
) -> Result<Gateway> {
    Gateway::load(
        ProviderRegistry::from_env(),
        Box::new(store),
        prompt,
        GatewayConfig::from_env(),
    )
    .context("initialize gateway failed")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let store = open_store(&cli.db)?;

    match cli.command {
        Commands::Chat => {
            let mut gateway = build_gateway(store, Box::new(StdinPrompt))?;
            let provider = gateway.active_provider();
            println!(
                "Provider: {} ({}). Digite /sair para encerrar.",
                provider.display_label, provider.model
            );
            if let Some(welcome) = gateway.welcome_message() {
                println!("{}", welcome);
            }
            loop {
                print!("> ");
                std::io::stdout().flush().ok();
                let Some(line) = read_line().await? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/sair" {
                    break;
                }
                let reply = gateway.process_message(line).await;
                println!("{}\n", reply);
            }
        }
        Commands::Ask { message } => {
            let mut gateway = build_gateway(store, Box::new(StdinPrompt))?;
            telemetry::log_event(
                "cli.ask",
                &format!(
                    "provider={} prompt_len={}",
                    gateway.active_provider().id,
                    message.len()
                ),
            );
            println!("{}", gateway.process_message(&message).await);
        }
        Commands::Configure {
            provider,
            api_key,
            telemetry: telemetry_flag,
        } => {
            if let Some(enabled) = telemetry_flag {
                db::set_telemetry_enabled(store.connection(), enabled)
                    .context("save telemetry failed")?;
                telemetry::set_enabled(enabled);
            }
            let mut gateway = build_gateway(store, Box::new(DeclinePrompt))?;
            if let Some(id) = provider {
                gateway
                    .select_provider(&id)
                    .context("select provider failed")?;
            }
            if let Some(key) = api_key {
                if !gateway
                    .configure_credential(&key)
                    .context("save api key failed")?
                {
                    bail!("api key must not be empty");
                }
            }
            let active = gateway.active_provider();
            println!(
                "Active provider: {} ({} | {}) credential={}",
                active.id,
                active.model,
                active.endpoint,
                if gateway.is_credential_configured() {
                    "configured"
                } else if active.requires_credential {
                    "missing"
                } else {
                    "optional"
                }
            );
        }
        Commands::Providers => {
            let gateway = build_gateway(store, Box::new(DeclinePrompt))?;
            let active = gateway.active_provider().id.clone();
            for p in gateway.registry().all() {
                println!(
                    "{} {:<12} {:<24} {}{}",
                    if p.id == active { "*" } else { " " },
                    p.id,
                    p.display_label,
                    p.model,
                    if p.requires_credential {
                        format!("  (API key: {})", p.credential_url)
                    } else {
                        String::new()
                    }
                );
            }
        }
        Commands::Serve { addr } => {
            let gateway = build_gateway(store, Box::new(DeclinePrompt))?;
            server::run(&addr, gateway).await?;
        }
    }

    Ok(())
}
