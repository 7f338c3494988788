use crate::error::Error;
use serde::Deserialize;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// 日志文件的输出格式，控制台始终为文本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 每行一个 JSON 对象，便于日志采集
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(Error::Config(format!("unknown log format {}", other))),
        }
    }
}

/// 初始化日志：控制台输出文本，日志目录下按天滚动写文件
///
/// # 参数
/// - `app_name`: 日志文件前缀
/// - `log_dir`: 日志目录，不存在时创建
/// - `level`: 默认级别，`RUST_LOG` 存在时以其为准
/// - `format`: 日志文件格式
///
/// # 返回
/// WorkerGuard 必须保持存活直到程序结束，否则尾部日志会丢失
pub fn init_tracing(
    app_name: &str,
    log_dir: &str,
    level: &str,
    format: LogFormat,
) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, app_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);
    let file_layer = match format {
        LogFormat::Json => file_layer.json().boxed(),
        LogFormat::Text => file_layer.boxed(),
    };

    Registry::default()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .with(file_layer)
        .try_init()?;

    tracing::info!("Tracing initialized for {} ({:?} file log)", app_name, format);
    Ok(guard)
}

/// 库与测试使用，仅在没有全局 subscriber 时安装
pub fn init_default_if_none() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}
