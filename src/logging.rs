//! # Logging モジュール
//!
//! 再生ツールとエージェント制御コアのログ出力を初期化します。
//!
//! コア自身は標準出力に書かず、判断の経過を全て `tracing` のイベントとして出します。
//! このモジュールはそれを tracing-appender による非同期書き込みでコンソールと
//! ファイルへ振り分けます。
//!
//! ## 主要機能
//!
//! - **非同期ログ書き込み**: ティック処理を止めないファイル出力
//! - **出力先選択**: コンソール、ファイル、またはその両方
//! - **ログレベル制御**: `RUST_LOG` が設定されていればそちらを優先
//! - **構造化ログ**: `agent` / `tick` などのフィールドをファイルには JSON で記録
//!
//! ## 設定可能な出力先
//!
//! - `Console`: コンソールのみ（compact 形式）
//! - `File`: ファイルのみ（logs/arenabot.YYYY-MM-DD、JSON 形式）
//! - `Both`: コンソールとファイルの両方

use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// ログ出力先の設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

impl LogOutput {
    fn to_console(self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn to_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let output = match value.trim().to_ascii_lowercase().as_str() {
            "console" | "stdout" | "stderr" => LogOutput::Console,
            "file" => LogOutput::File,
            "both" | "all" => LogOutput::Both,
            other => return Err(format!("ログ出力先 '{}' は不明です (console / file / both)", other)),
        };
        Ok(output)
    }
}

/// 購読者の設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub output: LogOutput,
    /// ログファイルのディレクトリ（File または Both の場合）
    pub log_dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            log_dir: "logs".to_string(),
            file_prefix: "arenabot".to_string(),
        }
    }
}

/// ログシステムを初期化
///
/// # 引数
///
/// * `config` - ログ設定
///
/// # 戻り値
///
/// ファイル出力がある場合は非同期書き込みのガード。呼び出し側はプロセス終了まで
/// 保持してください（drop 時に未書き込みのログを flush します）。
///
/// # 例
///
/// ```no_run
/// use arenabot::logging::{LogConfig, LogOutput, init_logging};
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     output: LogOutput::Console,
///     ..LogConfig::default()
/// };
///
/// let _guard = init_logging(&config).expect("ログ初期化に失敗");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = config.output.to_console().then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .compact()
    });

    let mut guard = None;
    let file_layer = if config.output.to_file() {
        std::fs::create_dir_all(&config.log_dir)?;
        let (writer, worker_guard) = non_blocking(rolling::daily(&config.log_dir, &config.file_prefix));
        guard = Some(worker_guard);
        Some(fmt::layer().with_writer(writer).with_target(true).json())
    } else {
        None
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

/// `--log-level` の値を解析（"error" から "trace"、または 1 (error) から 5 (trace)）
///
/// 解析できない値は警告を出して INFO に落とします。購読者の初期化前に呼ばれるため
/// 警告は標準エラーへ直接書きます。
pub fn parse_log_level(value: &str) -> Level {
    value.trim().parse::<Level>().unwrap_or_else(|_| {
        eprintln!("警告: ログレベル '{}' を解釈できません。INFO で続行します", value);
        Level::INFO
    })
}

/// 詳細出力レベル（-v の数）からログレベルを決める
pub fn level_for_verbosity(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_aliases() {
        assert_eq!("stdout".parse(), Ok(LogOutput::Console));
        assert_eq!(" FILE ".parse(), Ok(LogOutput::File));
        assert_eq!("all".parse(), Ok(LogOutput::Both));
        assert!("syslog".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_output_targets() {
        assert!(LogOutput::Both.to_console() && LogOutput::Both.to_file());
        assert!(!LogOutput::Console.to_file());
        assert!(!LogOutput::File.to_console());
    }

    #[test]
    fn test_level_names_and_numbers() {
        assert_eq!(parse_log_level("Trace"), Level::TRACE);
        assert_eq!(parse_log_level("4"), Level::DEBUG);
        assert_eq!(parse_log_level("loud"), Level::INFO);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for_verbosity(0), Level::WARN);
        assert_eq!(level_for_verbosity(2), Level::DEBUG);
        assert_eq!(level_for_verbosity(9), Level::TRACE);
    }
}
