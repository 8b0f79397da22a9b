use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use softspeak_core_sdk::{
    db,
    models::{ConversionRequest, ProviderId, ToneResult, MAX_INPUT_CHARS},
    server, telemetry, ToneClient,
};

/**
 * \brief CLI 程序入口：配置凭据、转换气话、查看历史。
 */
#[derive(Parser, Debug)]
#[command(name = "softspeak", version, about = "把气话转换成五种职场表达")]
struct Cli {
    /** \brief 数据库路径，缺省读取 SOFTSPEAK_DB 或 ./softspeak.db */
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 保存 Provider 凭据；传空字符串则删除。
     * \param provider Provider 标识符
     * \param key      API Key 或 access token
     */
    Key {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        key: String,
    },

    /**
     * \brief 设置默认使用的 Provider。
     */
    Use { provider: String },

    /**
     * \brief 开关本地遥测日志。
     */
    Telemetry { state: Toggle },

    /**
     * \brief 列出支持的 Provider 及其配置状态。
     */
    Providers,

    /**
     * \brief 转换一句气话。
     */
    Convert {
        text: String,
        #[arg(long)]
        provider: Option<String>,
        /** \brief 以 JSON 输出结果 */
        #[arg(long, default_value_t = false)]
        json: bool,
        /** \brief 不写入历史记录 */
        #[arg(long, default_value_t = false)]
        no_history: bool,
    },

    /**
     * \brief 查看或清空历史记录。
     */
    History {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = false)]
        clear: bool,
    },

    /**
     * \brief 启动本地 HTTP 服务并提供前端页面。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = &cli.db {
        std::env::set_var("SOFTSPEAK_DB", path);
    }

    let conn = db::open_default_db().context("open database failed")?;
    db::migrate(&conn).context("apply migrations failed")?;
    let telemetry_enabled = db::get_telemetry_enabled(&conn).unwrap_or(false);
    telemetry::set_enabled(telemetry_enabled);

    match cli.command {
        Commands::Key { provider, key } => {
            let provider: ProviderId = provider.parse()?;
            db::set_api_key(&conn, provider, &key).context("save api key failed")?;
            telemetry::log_event("cli.settings", &format!("key provider={}", provider));
            if key.trim().is_empty() {
                println!("Removed key for {}", provider.display_name());
            } else {
                println!("Saved key for {}", provider.display_name());
            }
        }
        Commands::Use { provider } => {
            let provider: ProviderId = provider.parse()?;
            db::set_selected_provider(&conn, provider).context("save provider failed")?;
            println!("Selected {} ({})", provider.display_name(), provider);
        }
        Commands::Telemetry { state } => {
            let enabled = matches!(state, Toggle::On);
            db::set_telemetry_enabled(&conn, enabled).context("save telemetry failed")?;
            telemetry::set_enabled(enabled);
            println!("Telemetry {}", if enabled { "enabled" } else { "disabled" });
        }
        Commands::Providers => {
            let keys = db::list_api_keys(&conn).context("load keys failed")?;
            let selected = db::get_selected_provider(&conn).context("load selection failed")?;
            for provider in ProviderId::ALL {
                let configured = keys.iter().any(|(p, _)| *p == provider);
                println!(
                    "{} {:<9} {:<16} {}",
                    if provider == selected { "*" } else { " " },
                    provider.as_str(),
                    provider.display_name(),
                    if configured { "已配置" } else { "未配置" }
                );
            }
        }
        Commands::Convert {
            text,
            provider,
            json,
            no_history,
        } => {
            let input_chars = text.chars().count();
            if input_chars > MAX_INPUT_CHARS {
                bail!("输入内容不能超过{}字（当前 {} 字）", MAX_INPUT_CHARS, input_chars);
            }
            let provider = match provider {
                Some(p) => p,
                None => db::get_selected_provider(&conn)?.as_str().to_string(),
            };
            let credential = match provider.parse::<ProviderId>() {
                Ok(p) => db::get_api_key(&conn, p)
                    .context("load api key failed")?
                    .unwrap_or_default(),
                Err(_) => String::new(),
            };
            let request = ConversionRequest {
                provider,
                credential,
                user_text: text,
            };

            let outcome = ToneClient::from_env().convert_request(&request).await;
            match &outcome {
                Ok(_) => {
                    telemetry::log_conversion("cli.convert", &request.provider, input_chars, Ok(()))
                }
                Err(err) => telemetry::log_conversion(
                    "cli.convert",
                    &request.provider,
                    input_chars,
                    Err(&err.to_string()),
                ),
            }
            let results = outcome?;

            if !no_history {
                let provider: ProviderId = request.provider.parse()?;
                db::add_history(&conn, &request.user_text, &results, provider)
                    .context("save history failed")?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_tones(&results);
            }
        }
        Commands::History { limit, clear } => {
            if clear {
                let removed = db::clear_history(&conn).context("clear history failed")?;
                telemetry::log_event("cli.history", &format!("clear removed={}", removed));
                println!("Cleared {} entries", removed);
                return Ok(());
            }
            let entries = db::list_history(&conn, limit).context("load history failed")?;
            if entries.is_empty() {
                println!("暂无历史记录");
            }
            for entry in entries {
                println!(
                    "#{} [{}] {}",
                    entry.id,
                    entry.provider.display_name(),
                    entry.input
                );
                print_tones(&entry.results);
                println!();
            }
        }
        Commands::Serve { addr } => {
            drop(conn);
            server::run(&addr).await?;
        }
    }

    Ok(())
}

fn print_tones(results: &ToneResult) {
    for (category, text) in results.iter() {
        println!("  {}：{}", category.label(), text);
    }
}
