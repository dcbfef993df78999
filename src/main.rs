//! mcpt CLI
//!
//! Monte Carlo permutation testing for OHLC trading strategies.
//! Usage:
//!   cargo run -- test --data data/BTCUSD_1h.parquet --strategy donchian -n 1000 --seed 42
//!   cargo run -- permute --data btc.parquet --data eth.parquet --seed 7 --count 5
//!   cargo run -- compare --data btc.csv --strategies all --export compare.csv

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcpt::backtest::{compare_strategies, BacktestEngine, BacktestResult, ComparisonResult, MetricKind, METRIC_NAMES};
use mcpt::config::{Config, TrialMode};
use mcpt::data::{load_markets, load_ohlc, write_ohlc, MultiMarketOhlc};
use mcpt::permutation::BarPermutationEngine;
use mcpt::significance::{
    save_report, trial_rng, MonteCarloOutcome, MonteCarloSignificanceTest, ReturnShuffleTrials,
    StrategyRerunTrials, TestReport,
};
use mcpt::strategy::{create_strategy, parse_strategy_list, Strategy, STRATEGY_NAMES};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mcpt")]
#[command(about = "Monte Carlo permutation testing for OHLC trading strategies")]
struct Cli {
    /// Configuration file (defaults to config/default.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Test whether a strategy's performance beats permuted price paths
    Test {
        /// OHLC files (CSV or parquet); the first is traded, all are permuted together
        #[arg(short, long)]
        data: Vec<PathBuf>,

        /// Strategy to test
        #[arg(short, long)]
        strategy: Option<String>,

        /// Number of permutations
        #[arg(short = 'n', long)]
        permutations: Option<usize>,

        /// Master random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Metric (sharpe, profit_factor, total_return, max_drawdown)
        #[arg(short, long)]
        metric: Option<String>,

        /// Bars up to and including this index are kept fixed
        #[arg(long)]
        start_index: Option<usize>,

        /// Significance level
        #[arg(long)]
        alpha: Option<f64>,

        /// How null trials are produced
        #[arg(long, value_enum)]
        mode: Option<TrialMode>,

        /// Run trials on one thread
        #[arg(long)]
        sequential: bool,

        /// Stop scheduling new trials after this many seconds
        #[arg(long)]
        time_budget: Option<u64>,

        /// Print results without writing them to the results directory
        #[arg(long)]
        no_save: bool,
    },

    /// Write permuted copies of one or more synchronized markets
    Permute {
        /// OHLC files (CSV or parquet)
        #[arg(short, long)]
        data: Vec<PathBuf>,

        /// Master random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Bars up to and including this index are kept fixed
        #[arg(long)]
        start_index: Option<usize>,

        /// Number of permuted copies
        #[arg(long, default_value = "1")]
        count: usize,

        /// Output directory
        #[arg(short, long, default_value = "permuted")]
        out_dir: PathBuf,
    },

    /// Run a single strategy backtest
    Backtest {
        /// OHLC file (CSV or parquet)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Strategy to run
        #[arg(short, long)]
        strategy: Option<String>,
    },

    /// Compare multiple strategies
    Compare {
        /// OHLC file (CSV or parquet)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Strategies to compare (comma-separated, or "all")
        #[arg(short = 'S', long, default_value = "all")]
        strategies: String,

        /// Export results to CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// List available strategies and metrics
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("mcpt=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path.clone())?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Test {
            data,
            strategy,
            permutations,
            seed,
            metric,
            start_index,
            alpha,
            mode,
            sequential,
            time_budget,
            no_save,
        } => {
            let mut config = config;
            if !data.is_empty() {
                config.data.paths = data;
            }
            if let Some(name) = strategy {
                config.strategy.name = name;
            }
            let sig = &mut config.significance;
            if let Some(n) = permutations {
                sig.n_permutations = n;
            }
            if seed.is_some() {
                sig.random_seed = seed;
            }
            if let Some(m) = metric {
                sig.metric = m;
            }
            if let Some(a) = alpha {
                sig.confidence_level = a;
            }
            if let Some(m) = mode {
                sig.trial_mode = m;
            }
            if sequential {
                sig.parallel = false;
            }
            if time_budget.is_some() {
                sig.time_budget_secs = time_budget;
            }
            if let Some(i) = start_index {
                config.permutation.start_index = i;
            }
            run_significance_test(&config, !no_save)
        }

        Commands::Permute {
            data,
            seed,
            start_index,
            count,
            out_dir,
        } => {
            let paths = if data.is_empty() { config.data.paths.clone() } else { data };
            let start_index = start_index.unwrap_or(config.permutation.start_index);
            run_permute(&paths, seed, start_index, count, &out_dir)
        }

        Commands::Backtest { data, strategy } => {
            let path = first_data_path(data, &config)?;
            let name = strategy.unwrap_or_else(|| config.strategy.name.clone());
            run_single_backtest(&path, &name, &config)
        }

        Commands::Compare {
            data,
            strategies,
            export,
        } => {
            let path = first_data_path(data, &config)?;
            run_comparison(&path, &strategies, export.as_deref(), &config)
        }

        Commands::List => {
            println!("\nAvailable strategies:");
            for name in STRATEGY_NAMES {
                println!("  - {}", name);
            }
            println!("\nAvailable metrics:");
            for name in METRIC_NAMES {
                println!("  - {}", name);
            }
            println!("\nUsage: mcpt test --strategy donchian --metric profit_factor -n 1000");
            println!("       mcpt compare --strategies all");
            Ok(())
        }
    }
}

fn first_data_path(data: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    data.or_else(|| config.data.paths.first().cloned())
        .context("No data file given and none configured")
}

fn build_strategy(name: &str, config: &Config) -> Result<Box<dyn Strategy>> {
    create_strategy(name, &config.strategy).with_context(|| {
        format!(
            "Unknown strategy '{}' (available: {})",
            name,
            STRATEGY_NAMES.join(", ")
        )
    })
}

fn run_significance_test(config: &Config, save: bool) -> Result<()> {
    let sig = &config.significance;
    let markets = load_markets(&config.data.paths)?;
    let strategy = build_strategy(&config.strategy.name, config)?;
    let metric: MetricKind = sig.metric.parse()?;

    let test = MonteCarloSignificanceTest::new(sig.n_permutations, metric, sig.confidence_level)?
        .with_seed(sig.random_seed)
        .with_periods_per_year(sig.periods_per_year)?
        .with_parallel(sig.parallel)
        .with_time_budget(sig.time_budget_secs.map(Duration::from_secs));

    let outcome = match sig.trial_mode {
        TrialMode::Rerun => {
            let trials = StrategyRerunTrials::new(
                strategy.as_ref(),
                markets.clone(),
                config.permutation.start_index,
                0,
            )?;
            let actual = trials.actual_returns();
            test.run(&actual, &trials)?
        }
        TrialMode::ShuffleReturns => {
            let actual = strategy.returns(&markets.tables()[0]);
            let trials = ReturnShuffleTrials::new(&actual);
            test.run(&actual, &trials)?
        }
    };

    print_test_results(strategy.name(), &markets, &outcome);

    if save {
        let market_names: Vec<String> = markets.tables().iter().map(|t| t.name().to_string()).collect();
        let report = TestReport {
            created_at: chrono::Utc::now(),
            strategy: strategy.name().to_string(),
            markets: market_names.clone(),
            n_bars: markets.n_bars(),
            start_index: config.permutation.start_index,
            trial_mode: sig.trial_mode.as_str().to_string(),
            outcome: &outcome,
        };
        let stem = format!(
            "mcpt_{}_{}",
            strategy.name().to_lowercase(),
            market_names[0].to_lowercase()
        );
        let saved = save_report(&config.output.results_dir, &stem, &report)?;
        println!("\nSaved: {}", saved.json_path.display());
        println!("       {}", saved.csv_path.display());
    }

    Ok(())
}

fn run_permute(
    paths: &[PathBuf],
    seed: Option<u64>,
    start_index: usize,
    count: usize,
    out_dir: &Path,
) -> Result<()> {
    let markets = load_markets(paths)?;
    let engine = BarPermutationEngine::new(start_index);
    let master_seed = seed.unwrap_or_else(rand::random);
    info!(
        "Permuting {} market(s), {} copies, seed {}",
        markets.n_markets(),
        count,
        master_seed
    );

    for copy in 0..count {
        let mut rng = trial_rng(master_seed, copy);
        let permuted = engine.permute_markets(&markets, &mut rng)?;

        for (market, (source, table)) in paths.iter().zip(permuted.tables()).enumerate() {
            let out = out_dir.join(permuted_file_name(source, market, copy));
            write_ohlc(&out, table)?;
            println!("Wrote {}", out.display());
        }
    }

    Ok(())
}

/// `<stem>_m<market>_perm_<copy>.<ext>`; the market index keeps same-named inputs apart.
fn permuted_file_name(source: &Path, market: usize, copy: usize) -> String {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("market");
    let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("csv");
    format!("{}_m{}_perm_{:04}.{}", stem, market, copy, ext)
}

fn run_single_backtest(path: &Path, name: &str, config: &Config) -> Result<()> {
    let table = load_ohlc(path)?;
    let strategy = build_strategy(name, config)?;
    let engine = BacktestEngine::new(config.significance.periods_per_year);
    let result = engine.run(strategy.as_ref(), &table);

    print_header(&format!("BACKTEST RESULTS: {} on {}", result.strategy, result.market), 55);
    println!("Bars: {}", table.len());
    println!();
    print_backtest(&result);
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(55));

    Ok(())
}

fn run_comparison(path: &Path, strategies: &str, export: Option<&Path>, config: &Config) -> Result<()> {
    let table = load_ohlc(path)?;
    let strategy_list = parse_strategy_list(strategies);
    let engine = BacktestEngine::new(config.significance.periods_per_year);

    let comparison = compare_strategies(&strategy_list, &table, &config.strategy, &engine)?;

    print_comparison_results(&comparison);

    if let Some(path) = export {
        comparison.export_csv(path)?;
        println!("\nExported to: {}", path.display());
    }

    Ok(())
}

fn format_ratio(value: f64) -> String {
    if value.is_nan() {
        "N/A".to_string()
    } else if value == f64::INFINITY {
        "∞".to_string()
    } else if value == f64::NEG_INFINITY {
        "-∞".to_string()
    } else {
        format!("{:.2}", value)
    }
}

fn print_header(title: &str, width: usize) {
    println!();
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(width));
    println!("\x1b[1;36m  {}\x1b[0m", title);
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(width));
}

fn print_test_results(strategy: &str, markets: &MultiMarketOhlc, outcome: &MonteCarloOutcome) {
    let names: Vec<&str> = markets.tables().iter().map(|t| t.name()).collect();
    print_header(&format!("PERMUTATION TEST: {} on {}", strategy, names.join(", ")), 60);
    println!("Bars: {} | Elapsed: {:.2}s", markets.n_bars(), outcome.elapsed_secs);
    println!();

    let verdict_color = if outcome.is_significant {
        "\x1b[32m"
    } else {
        "\x1b[31m"
    };
    for line in outcome.summary_text().lines() {
        if line.starts_with("Result:") {
            println!("{}{}\x1b[0m", verdict_color, line);
        } else {
            println!("{}", line);
        }
    }
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(60));
}

fn print_backtest(result: &BacktestResult) {
    let s = &result.summary;

    println!("\x1b[1;33mPERFORMANCE\x1b[0m");
    println!("  Total Trades:     {}", result.total_trades());
    println!("  Active Bars:      {} of {}", s.active_bars, s.periods);
    println!("  Win Rate:         {:.1}%", s.win_rate);
    println!("  Profit Factor:    {}", format_ratio(s.profit_factor));
    println!();

    println!("\x1b[1;33mRETURNS\x1b[0m");
    let ret_color = if s.total_return >= 0.0 {
        "\x1b[32m"
    } else {
        "\x1b[31m"
    };
    println!(
        "  Total Log Return: {}{:+.4}\x1b[0m ({:+.2}%)",
        ret_color,
        s.total_return,
        (s.total_return.exp() - 1.0) * 100.0
    );
    println!("  VaR (5%):         {:.4}", s.var_5);
    println!("  CVaR (5%):        {:.4}", s.cvar_5);
    println!();

    println!("\x1b[1;33mRISK\x1b[0m");
    println!("  Max Drawdown:     {:.2}%", s.max_drawdown * 100.0);
    println!("  Sharpe Ratio:     {}", format_ratio(s.sharpe_ratio));
    println!("  Sortino Ratio:    {}", format_ratio(s.sortino_ratio));
    println!("  Calmar Ratio:     {}", format_ratio(s.calmar_ratio));
}

fn print_comparison_results(result: &ComparisonResult) {
    println!();
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(78));
    println!(
        "\x1b[1;36m                    STRATEGY COMPARISON: {}\x1b[0m",
        result.market
    );
    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(78));
    println!("Bars: {}", result.bars);
    println!();

    println!(
        "┌{:─<17}┬{:─>8}┬{:─>10}┬{:─>10}┬{:─>11}┬{:─>11}┐",
        "", "", "", "", "", ""
    );
    println!(
        "│ {:15} │ {:>6} │ {:>8} │ {:>8} │ {:>9} │ {:>9} │",
        "Strategy", "Trades", "Win Rate", "Log Ret", "Drawdown", "Sharpe"
    );
    println!(
        "├{:─<17}┼{:─>8}┼{:─>10}┼{:─>10}┼{:─>11}┼{:─>11}┤",
        "", "", "", "", "", ""
    );

    for (name, backtest_result) in &result.results {
        let s = &backtest_result.summary;
        let ret_color = if s.total_return >= 0.0 {
            "\x1b[32m"
        } else {
            "\x1b[31m"
        };

        println!(
            "│ {:15} │ {:>6} │ {:>7.1}% │ {}{:>+8.4}\x1b[0m │ {:>8.1}% │ {:>9} │",
            name,
            backtest_result.total_trades(),
            s.win_rate,
            ret_color,
            s.total_return,
            s.max_drawdown * 100.0,
            format_ratio(s.sharpe_ratio)
        );
    }

    println!(
        "└{:─<17}┴{:─>8}┴{:─>10}┴{:─>10}┴{:─>11}┴{:─>11}┘",
        "", "", "", "", "", ""
    );

    if let Some((name, best)) = result.best_by_return() {
        println!();
        println!(
            "\x1b[1;32mBest Strategy: {} ({:+.4} log return, {} Sharpe)\x1b[0m",
            name,
            best.summary.total_return,
            format_ratio(best.summary.sharpe_ratio)
        );
    }
    if let Some((name, best)) = result.best_by_sharpe() {
        println!(
            "\x1b[1;32mBest Risk-Adjusted: {} ({} Sharpe)\x1b[0m",
            name,
            format_ratio(best.summary.sharpe_ratio)
        );
    }

    println!("\x1b[1;36m{}\x1b[0m", "═".repeat(78));
}
