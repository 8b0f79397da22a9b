use anyhow::Result;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::{path::Path, thread, time::Duration};
use time::OffsetDateTime;

use crate::models::{HistoryEntry, ProviderId, ToneResult, HISTORY_LIMIT};

const DEFAULT_DB_PATH: &str = "softspeak.db";
const SELECTED_PROVIDER_KEY: &str = "selected_provider";
const TELEMETRY_KEY: &str = "telemetry_enabled";

/**
 * \brief 打开指定路径的数据库文件。
 */
pub fn open_db(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/**
 * \brief 默认数据库路径：`SOFTSPEAK_DB` 环境变量，否则为当前目录下的 softspeak.db。
 */
pub fn default_db_path() -> String {
    std::env::var("SOFTSPEAK_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}

/**
 * \brief 打开默认数据库文件。
 */
pub fn open_default_db() -> Result<Connection> {
    open_db(default_db_path())
}

/**
 * \brief 运行数据库迁移，创建必要表结构。
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS credentials (
            provider TEXT PRIMARY KEY,
            api_key  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            input TEXT NOT NULL,
            results TEXT NOT NULL,
            provider TEXT NOT NULL,
            timestamp INTEGER NOT NULL
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
    conn.query_row(
        "SELECT value FROM app_config WHERE key=?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief 保存某个 Provider 的凭据；空白凭据视为删除。
 */
pub fn set_api_key(conn: &Connection, provider: ProviderId, api_key: &str) -> Result<()> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        retry_on_locked(|| {
            conn.execute(
                "DELETE FROM credentials WHERE provider=?1",
                params![provider.as_str()],
            )
        })?;
        return Ok(());
    }
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO credentials (provider, api_key) VALUES (?1, ?2)
         ON CONFLICT(provider) DO UPDATE SET api_key=excluded.api_key",
            params![provider.as_str(), api_key],
        )
    })?;
    Ok(())
}

/**
 * \brief 读取某个 Provider 的凭据。
 */
pub fn get_api_key(conn: &Connection, provider: ProviderId) -> Result<Option<String>> {
    conn.query_row(
        "SELECT api_key FROM credentials WHERE provider=?1",
        params![provider.as_str()],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief 列出已配置的凭据，按 `ProviderId::ALL` 顺序。无法识别的行被忽略。
 */
pub fn list_api_keys(conn: &Connection) -> Result<Vec<(ProviderId, String)>> {
    let mut stmt = conn.prepare("SELECT provider, api_key FROM credentials")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut keys: Vec<(ProviderId, String)> = rows
        .into_iter()
        .filter_map(|(id, key)| id.parse::<ProviderId>().ok().map(|p| (p, key)))
        .collect();
    keys.sort_by_key(|(p, _)| ProviderId::ALL.iter().position(|x| x == p));
    Ok(keys)
}

/**
 * \brief 记录上次选择的 Provider。
 */
pub fn set_selected_provider(conn: &Connection, provider: ProviderId) -> Result<()> {
    set_config(conn, SELECTED_PROVIDER_KEY, provider.as_str())
}

/**
 * \brief 读取上次选择的 Provider，未设置或无法识别时为 openai。
 */
pub fn get_selected_provider(conn: &Connection) -> Result<ProviderId> {
    Ok(get_config(conn, SELECTED_PROVIDER_KEY)?
        .and_then(|s| s.parse::<ProviderId>().ok())
        .unwrap_or_default())
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
 * \brief 追加一条历史记录，并只保留最近的 `HISTORY_LIMIT` 条。
 */
pub fn add_history(
    conn: &Connection,
    input: &str,
    results: &ToneResult,
    provider: ProviderId,
) -> Result<HistoryEntry> {
    let timestamp = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
    let results_json = serde_json::to_string(results)?;
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO history (input, results, provider, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![input, results_json, provider.as_str(), timestamp],
        )
    })?;
    let id = conn.last_insert_rowid();

    retry_on_locked(|| {
        conn.execute(
            "DELETE FROM history WHERE id NOT IN (
                SELECT id FROM history ORDER BY id DESC LIMIT ?1
            )",
            params![HISTORY_LIMIT as i64],
        )
    })?;

    Ok(HistoryEntry {
        id,
        input: input.to_string(),
        results: results.clone(),
        provider,
        timestamp,
    })
}

/**
 * \brief 读取历史记录，按写入顺序最新的在前；无法解析的行会被跳过。
 */
pub fn list_history(conn: &Connection, limit: Option<usize>) -> Result<Vec<HistoryEntry>> {
    let limit = limit.unwrap_or(HISTORY_LIMIT).min(HISTORY_LIMIT) as i64;
    let mut stmt = conn.prepare(
        "SELECT id, input, results, provider, timestamp FROM history
         ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut entries = Vec::with_capacity(rows.len());
    for (id, input, results, provider, timestamp) in rows {
        let results: ToneResult = match serde_json::from_str(&results) {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(id, error = %err, "skip history row with corrupt results");
                continue;
            }
        };
        let provider = match provider.parse::<ProviderId>() {
            Ok(provider) => provider,
            Err(_) => {
                tracing::warn!(id, provider = %provider, "skip history row with unknown provider");
                continue;
            }
        };
        entries.push(HistoryEntry {
            id,
            input,
            results,
            provider,
            timestamp,
        });
    }
    Ok(entries)
}

/**
 * \brief 清空历史记录。
 */
pub fn clear_history(conn: &Connection) -> Result<usize> {
    let removed = retry_on_locked(|| conn.execute("DELETE FROM history", []))?;
    Ok(removed)
}

/**
 * \brief 针对 SQLite 锁冲突的重试助手。
 * \details 捕获 `database is locked`/`database table is locked` 等错误并进行线性退避，最大尝试 6 次。
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
