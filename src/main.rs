use std::str::FromStr;

use arenabot::config::AgentConfig;
use arenabot::logging::{init_logging, level_for_verbosity, parse_log_level, LogConfig, LogOutput};
use arenabot::replay::ReplayEngine;
use arenabot::tape::Tape;
use clap::{Arg, Command};
use tracing::info;

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("arenabot")
        .version("0.1.0")
        .about("アリーナ戦闘エージェント (Arena Bot)")
        .long_about("記録済みのセンサーテープでエージェント制御コアを再生します。\n\
                     ティックごとの判断はログに、集計は標準出力に出力されます。")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("エージェント設定ファイル(.yaml)のパスを指定")
                .long_help("エージェント設定ファイル(.yaml)のパスを指定します。\n\
                           指定しない場合、既定の設定を使用します。")
        )
        .arg(
            Arg::new("tape")
                .short('t')
                .long("tape")
                .value_name("FILE")
                .help("再生するセンサーテープ(.yaml)のパスを指定")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("設定とテープの情報のみ表示して終了")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: トレース)")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .default_value("console")
                .help("ログ出力先 (console, file, both)")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("ログレベル (trace, debug, info, warn, error)。-v より優先")
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");

    let output = match matches.get_one::<String>("log-output").map(|s| LogOutput::from_str(s)) {
        Some(Err(e)) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
        Some(Ok(output)) => output,
        None => LogOutput::Console,
    };
    let level = matches
        .get_one::<String>("log-level")
        .map(|s| parse_log_level(s))
        .unwrap_or_else(|| level_for_verbosity(verbose_level));
    let log_config = LogConfig {
        level,
        output,
        ..LogConfig::default()
    };
    // ガードはプロセス終了まで保持する
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ログ初期化エラー: {}", e);
            std::process::exit(1);
        }
    };

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let tape_path = matches.get_one::<String>("tape").map(String::as_str);

    if config_path.is_none() && tape_path.is_none() {
        show_default_help();
        return;
    }

    if let Err(e) = run(config_path, tape_path, matches.get_flag("info"), verbose_level) {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

/// 設定とテープを読み込んで再生
fn run(
    config_path: Option<&str>,
    tape_path: Option<&str>,
    info_only: bool,
    verbose_level: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => {
            let config = AgentConfig::from_file(path)?;
            info!("設定ファイル読み込み完了: {}", path);
            config
        }
        None => AgentConfig::default(),
    };

    let tape = match tape_path {
        Some(path) => Some(Tape::from_file(path)?),
        None => None,
    };

    if info_only {
        config.print_summary();
        if let Some(tape) = &tape {
            println!();
            tape.print_summary();
        }
        return Ok(());
    }

    let Some(tape) = tape else {
        return Err("再生にはテープファイル (-t) が必要です".into());
    };

    let mut engine = ReplayEngine::new(tape, config, verbose_level);
    engine.initialize()?;
    let summary = engine.run()?;
    summary.print();
    Ok(())
}

fn show_default_help() {
    println!("使用方法:");
    println!("  arenabot [オプション]");
    println!();
    println!("オプション:");
    println!("  -c, --config <FILE>      エージェント設定ファイル");
    println!("  -t, --tape <FILE>        センサーテープを指定して再生");
    println!("  -i, --info               設定とテープの情報のみ表示");
    println!("  -v, --verbose            詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-output <TARGET> ログ出力先 (console, file, both)");
    println!("      --log-level <LEVEL>  ログレベル");
    println!("  -h, --help               このヘルプを表示");
    println!();
    println!("例:");
    println!("  arenabot -t tapes/corridor.yaml");
    println!("  arenabot -c config/agent.yaml -t tapes/corridor.yaml -vv");
    println!("  arenabot -c config/agent.yaml -i");
}
