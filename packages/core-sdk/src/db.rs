use anyhow::Result;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use crate::models::Credentials;

const PROVIDER_KEY: &str = "provider-id";
const TELEMETRY_KEY: &str = "telemetry_enabled";

fn api_key_name(provider_id: &str) -> String {
    format!("api-key:{}", provider_id)
}

/**
 * \brief 凭据存储：持久化当前 Provider 与按 Provider 划分的 API Key。
 */
pub trait CredentialStore: Send {
    /** \brief 读取当前 Provider 及其 API Key；均可缺省。 */
    fn load(&self) -> Result<Credentials> {
        let provider_id = self.provider_id()?;
        let api_key = match provider_id.as_deref() {
            Some(id) => self.api_key(id)?,
            None => None,
        };
        Ok(Credentials {
            provider_id,
            api_key,
        })
    }

    fn provider_id(&self) -> Result<Option<String>>;
    fn save_provider(&self, provider_id: &str) -> Result<()>;
    fn api_key(&self, provider_id: &str) -> Result<Option<String>>;
    fn save_api_key(&self, provider_id: &str, api_key: &str) -> Result<()>;
    fn clear_api_key(&self, provider_id: &str) -> Result<()>;
}

/**
 * \brief 基于 SQLite `app_config` 表的凭据存储。
 */
pub struct SqliteCredentialStore {
    conn: Connection,
}

impl SqliteCredentialStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn provider_id(&self) -> Result<Option<String>> {
        get_config(&self.conn, PROVIDER_KEY)
    }

    fn save_provider(&self, provider_id: &str) -> Result<()> {
        set_config(&self.conn, PROVIDER_KEY, provider_id)
    }

    fn api_key(&self, provider_id: &str) -> Result<Option<String>> {
        get_config(&self.conn, &api_key_name(provider_id))
    }

    fn save_api_key(&self, provider_id: &str, api_key: &str) -> Result<()> {
        set_config(&self.conn, &api_key_name(provider_id), api_key)
    }

    fn clear_api_key(&self, provider_id: &str) -> Result<()> {
        delete_config(&self.conn, &api_key_name(provider_id))
    }
}

/**
 * \brief 内存凭据存储；克隆体共享同一份数据，便于测试观察。
 */
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|guard| guard.get(key).cloned())
    }

    fn write(&self, key: &str, value: Option<&str>) {
        if let Ok(mut guard) = self.inner.lock() {
            match value {
                Some(v) => {
                    guard.insert(key.to_string(), v.to_string());
                }
                None => {
                    guard.remove(key);
                }
            }
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn provider_id(&self) -> Result<Option<String>> {
        Ok(self.read(PROVIDER_KEY))
    }

    fn save_provider(&self, provider_id: &str) -> Result<()> {
        self.write(PROVIDER_KEY, Some(provider_id));
        Ok(())
    }

    fn api_key(&self, provider_id: &str) -> Result<Option<String>> {
        Ok(self.read(&api_key_name(provider_id)))
    }

    fn save_api_key(&self, provider_id: &str, api_key: &str) -> Result<()> {
        self.write(&api_key_name(provider_id), Some(api_key));
        Ok(())
    }

    fn clear_api_key(&self, provider_id: &str) -> Result<()> {
        self.write(&api_key_name(provider_id), None);
        Ok(())
    }
}

/**
 * \brief 打开指定路径的数据库文件并设置忙等待。
 */
pub fn open_db(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/**
 * \brief 打开默认数据库文件（本地目录下的 cleanchat.db）并迁移。
 */
pub fn open_default_db() -> Result<Connection> {
    let conn = open_db("cleanchat.db")?;
    migrate(&conn)?;
    Ok(conn)
}

/**
 * \brief 运行数据库迁移，创建必要表结构。
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
        )
    })?;
    Ok(())
}

fn set_config(conn: &Connection, key: &str, value: &str) -> Result<()> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )
    })?;
    Ok(())
}

fn get_config(conn: &Connection, key: &str) -> Result<Option<String>> {
    let val = conn
        .query_row(
            "SELECT value FROM app_config WHERE key=?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(val)
}

fn delete_config(conn: &Connection, key: &str) -> Result<()> {
    retry_on_locked(|| conn.execute("DELETE FROM app_config WHERE key=?1", params![key]))?;
    Ok(())
}

/**
 * \brief 读取遥测开关。
 */
pub fn get_telemetry_enabled(conn: &Connection) -> Result<bool> {
    Ok(get_config(conn, TELEMETRY_KEY)?
        .map(|s| s == "1")
        .unwrap_or(false))
}

/**
 * \brief 更新遥测开关。
 */
pub fn set_telemetry_enabled(conn: &Connection, enabled: bool) -> Result<()> {
    set_config(conn, TELEMETRY_KEY, if enabled { "1" } else { "0" })
}

/**
 * \brief 针对 SQLite 锁冲突的重试助手。
 * \details 捕获 `database is locked`/`database table is locked` 等错误并进行指数退避，最大尝试 6 次。
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    const MAX_RETRIES: usize = 5;
    let mut attempt = 0;
    loop {
        match action() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) && attempt < MAX_RETRIES =>
            {
                attempt += 1;
                thread::sleep(Duration::from_millis(200 * attempt as u64));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_store() -> SqliteCredentialStore {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        migrate(&conn).expect("migrate");
        SqliteCredentialStore::new(conn)
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let store = mem_store();
        assert_eq!(store.load().expect("load"), Credentials::default());
    }

    #[test]
    fn test_keys_are_scoped_per_provider() {
        let store = mem_store();
        store.save_provider("openai").expect("save provider");
        store.save_api_key("openai", "sk-1").expect("save key");
        store.save_api_key("gemini", "g-1").expect("save key");

        let creds = store.load().expect("load");
        assert_eq!(creds.provider_id.as_deref(), Some("openai"));
        assert_eq!(creds.api_key.as_deref(), Some("sk-1"));

        store.save_provider("gemini").expect("switch provider");
        assert_eq!(store.load().expect("load").api_key.as_deref(), Some("g-1"));
    }

    #[test]
    fn test_overwrite_and_clear_key() {
        let store = mem_store();
        store.save_provider("groq").expect("save provider");
        store.save_api_key("groq", "old").expect("save key");
        store.save_api_key("groq", "new").expect("overwrite key");
        assert_eq!(store.api_key("groq").expect("read").as_deref(), Some("new"));

        store.clear_api_key("groq").expect("clear");
        let creds = store.load().expect("load");
        assert_eq!(creds.provider_id.as_deref(), Some("groq"));
        assert!(creds.api_key.is_none());
        // 删除不存在的键不报错
        store.clear_api_key("groq").expect("clear again");
    }

    #[test]
    fn test_telemetry_flag_roundtrip() {
        let store = mem_store();
        assert!(!get_telemetry_enabled(store.connection()).expect("default"));
        set_telemetry_enabled(store.connection(), true).expect("enable");
        assert!(get_telemetry_enabled(store.connection()).expect("enabled"));
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryCredentialStore::new();
        let observer = store.clone();
        store.save_provider("openai").expect("save");
        store.save_api_key("openai", "sk").expect("save key");
        assert_eq!(observer.load().expect("load").api_key.as_deref(), Some("sk"));
        store.clear_api_key("openai").expect("clear");
        assert!(observer.api_key("openai").expect("read").is_none());
    }
}
