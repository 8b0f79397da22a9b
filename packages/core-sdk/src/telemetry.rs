use std::{fs::OpenOptions, io::Write, path::PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::models::ProviderId;

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
        tracing::warn!(error = %err, "telemetry write failed");
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
        tracing::warn!(error = %err, "telemetry write failed");
    }
}

/**
 * \brief 记录一次转换的结果。只写 Provider、输入字数与结果，不写入输入原文和凭据。
 * \param outcome 成功时为 `Ok(())`，失败时为展示给用户的错误文案
 */
pub fn log_conversion(
    category: &str,
    provider: &str,
    input_chars: usize,
    outcome: Result<(), &str>,
) {
    let provider = provider
        .parse::<ProviderId>()
        .map(|p| p.as_str())
        .unwrap_or("unknown");
    match outcome {
        Ok(()) => log_event(
            category,
            &format!("convert provider={} input_chars={} ok", provider, input_chars),
        ),
        Err(message) => log_error(
            category,
            &format!(
                "convert provider={} input_chars={} failed: {}",
                provider, input_chars, message
            ),
        ),
    }
}

fn log_dir() -> PathBuf {
    std::env::var("SOFTSPEAK_LOG_DIR")
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
        .open(log_dir.join("softspeak.log"))?;
    writeln!(file, "{}", format_line(&timestamp, level, category, message))?;
    Ok(())
}
