use std::str::FromStr;

use beesim::logging::{LogConfig, LogOutput, init_logging, parse_log_level};
use beesim::scenario::ScenarioConfig;
use beesim::simulation::SimulationEngine;
use clap::{Arg, ArgMatches, Command};

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("beesim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("ハチ型自律エージェントの操舵シミュレーション")
        .long_about(
            "ワンダー・目標追従・ポインタ回避を合成して飛行するエージェントを\n\
             ヘッドレスのフレームループで駆動します。",
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定"),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
                .conflicts_with("test"),
        )
        .arg(
            Arg::new("test")
                .short('t')
                .long("test")
                .action(clap::ArgAction::SetTrue)
                .help("組み込みのデモシナリオを実行")
                .conflicts_with_all(["info", "scenario"]),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: フレーム単位)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("OUTPUT")
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .value_parser(clap::value_parser!(u64))
                .help("シナリオのシード値を上書き"),
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");

    if let Err(e) = setup_logging(&matches, verbose_level) {
        eprintln!("ログ初期化エラー: {}", e);
        std::process::exit(1);
    }

    println!("beesim v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let scenario = if matches.get_flag("test") {
        println!("=== デモシナリオ ===");
        Ok(ScenarioConfig::demo())
    } else if let Some(path) = matches.get_one::<String>("scenario") {
        ScenarioConfig::from_file(path).inspect(|_| {
            if verbose_level > 0 {
                println!("シナリオファイル読み込み完了: {}", path);
            }
        })
    } else {
        show_default_help();
        return;
    };

    let mut scenario = match scenario {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(seed) = matches.get_one::<u64>("seed") {
        scenario.sim.seed = *seed;
    }

    if matches.get_flag("info") {
        scenario.print_summary();
        return;
    }

    if let Err(e) = execute_scenario(scenario, verbose_level) {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
    if verbose_level > 0 {
        println!("シナリオ実行が正常に完了しました。");
    }
}

fn setup_logging(matches: &ArgMatches, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    let level = matches
        .get_one::<String>("log-level")
        .map(|s| parse_log_level(s))
        .unwrap_or_else(|| LogConfig::level_for_verbosity(verbose_level));
    let output = matches
        .get_one::<String>("log-output")
        .map(|s| LogOutput::from_str(s))
        .transpose()?
        .unwrap_or(LogOutput::Console);

    init_logging(LogConfig {
        level,
        output,
        ..LogConfig::default()
    })
}

/// シナリオの実行
fn execute_scenario(scenario: ScenarioConfig, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    scenario.print_summary();
    println!();

    // 目標点タイマーはランタイム上のタスクとして動く
    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;

    runtime.block_on(async {
        let mut simulation = SimulationEngine::new(scenario, verbose_level);
        simulation.initialize().await?;
        simulation.run().await?;
        simulation.print_summary();
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// デフォルトヘルプとシナリオ一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  beesim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>   シナリオファイルを指定して実行");
    println!("  -i, --info              シナリオ情報のみ表示");
    println!("  -t, --test              デモシナリオを実行");
    println!("  -v, --verbose           詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-level <LEVEL> ログレベル");
    println!("      --log-output <OUT>  ログ出力先 (console, file, both)");
    println!("      --seed <SEED>       シード値の上書き");
    println!("  -h, --help              このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/bee_default.yaml  - 単体のハチ（既定値）");
    println!("  scenarios/swarm.yaml        - 複数のハチとポインタ操作");
    println!();
    println!("例:");
    println!("  beesim -s scenarios/bee_default.yaml");
    println!("  beesim -s scenarios/swarm.yaml -vv --log-output both");
    println!("  beesim -s scenarios/swarm.yaml -i");
    println!("  beesim --test --seed 7");
}
