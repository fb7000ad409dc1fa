use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use csv::Writer;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::{info, warn};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use graphviz_render::GraphvizSource;
use rpcgram_core::Dfa;
use rpcgram_learning::rpc::{HttpTransport, RpcProbe};
use rpcgram_learning::{
    ComplexOracle, MediumOracle, MembershipOracle, RandomWordSearch, SimpleOracle, geth, lstar,
    ttt,
};

/// Runs the L* and TTT learners against a JSON-RPC endpoint and records
/// execution time, membership query count and RPC call count per run.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// JSON-RPC endpoint to probe.
    #[arg(long, default_value = geth::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Which membership oracle variant(s) to learn.
    #[arg(long, value_enum, default_value = "all")]
    variant: VariantArg,

    /// Number of trials per variant.
    #[arg(long, default_value_t = 1)]
    trials: usize,

    /// Seed for the random phase of the equivalence search.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Per-probe timeout in seconds.
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,

    /// Directory for CSV results and rendered automata.
    #[arg(long, default_value = "results")]
    out_dir: PathBuf,

    /// Additionally write each learned DFA as .dot and render it to .png.
    #[arg(long)]
    render: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VariantArg {
    Simple,
    Medium,
    Complex,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Simple,
    Medium,
    Complex,
}

impl Variant {
    fn name(self) -> &'static str {
        match self {
            Variant::Simple => "simple",
            Variant::Medium => "medium",
            Variant::Complex => "complex",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algo {
    LStar,
    Ttt,
}

impl Algo {
    fn name(self) -> &'static str {
        match self {
            Algo::LStar => "lstar",
            Algo::Ttt => "ttt",
        }
    }
}

struct RunResult {
    variant: Variant,
    trial: usize,
    algo: Algo,
    states: usize,
    seconds: f64,
    mq: u64,
    rpc: u64,
    dfa: Dfa<char>,
}

#[derive(Tabled)]
struct SummaryRow {
    variant: &'static str,
    algo: &'static str,
    runs: usize,
    #[tabled(rename = "time_mean[s]")]
    time_mean: String,
    mq_mean: String,
    rpc_mean: String,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::filter::LevelFilter::INFO),
        )
        .init();

    let args = Args::parse();
    let variants: Vec<Variant> = match args.variant {
        VariantArg::Simple => vec![Variant::Simple],
        VariantArg::Medium => vec![Variant::Medium],
        VariantArg::Complex => vec![Variant::Complex],
        VariantArg::All => vec![Variant::Complex, Variant::Medium, Variant::Simple],
    };

    fs::create_dir_all(&args.out_dir).expect("cannot create output directory");
    info!(
        "probing {} with {} trial(s) per variant",
        args.endpoint, args.trials
    );

    let mut results = Vec::new();
    for &variant in &variants {
        for trial in 1..=args.trials {
            for algo in [Algo::LStar, Algo::Ttt] {
                let result = run_once(variant, trial, algo, &args);
                info!(
                    "[{} trial {trial:02}] {}: {:.2}s MQ={} RPC={} states={}",
                    variant.name(),
                    algo.name(),
                    result.seconds,
                    result.mq,
                    result.rpc,
                    result.states,
                );
                results.push(result);
            }
        }
    }

    write_results(&args.out_dir.join("results.csv"), &results);
    write_summary(&args.out_dir.join("summary.csv"), &results);
    if args.render {
        render_automata(&args.out_dir, &results);
    }

    println!("{}", Table::new(summarize(&results)).with(Style::sharp()));
    info!("wrote results to {:?}", args.out_dir);
}

/// One learning run on a fresh oracle, so caches and counters start empty.
fn run_once(variant: Variant, trial: usize, algo: Algo, args: &Args) -> RunResult {
    let transport = HttpTransport::with_timeout(
        args.endpoint.clone(),
        Duration::from_secs(args.timeout_secs),
    );
    let probe = RpcProbe::new(geth::bindings(), transport);
    match variant {
        Variant::Simple => run_learner(
            variant,
            trial,
            algo,
            SimpleOracle::new(geth::alphabet(), probe),
            args.seed,
        ),
        Variant::Medium => run_learner(
            variant,
            trial,
            algo,
            MediumOracle::new(geth::alphabet(), probe),
            args.seed,
        ),
        Variant::Complex => run_learner(
            variant,
            trial,
            algo,
            ComplexOracle::new(geth::alphabet(), probe),
            args.seed,
        ),
    }
}

fn run_learner<O: MembershipOracle<char>>(
    variant: Variant,
    trial: usize,
    algo: Algo,
    oracle: O,
    seed: u64,
) -> RunResult {
    oracle.reset();
    let eq = RandomWordSearch::new(&oracle, geth::call_templates()).with_seed(seed);
    let start = Instant::now();
    let dfa = match algo {
        Algo::LStar => lstar::learn(geth::alphabet(), &oracle, &eq),
        Algo::Ttt => ttt::learn(geth::alphabet(), &oracle, &eq),
    };
    let seconds = start.elapsed().as_secs_f64();
    RunResult {
        variant,
        trial,
        algo,
        states: dfa.size(),
        seconds,
        mq: oracle.mq_count(),
        rpc: oracle.rpc_count(),
        dfa,
    }
}

fn write_results(path: &Path, results: &[RunResult]) {
    let mut wtr = Writer::from_path(path).expect("creating results file failed");
    wtr.write_record(["variant", "trial", "algo", "states", "seconds", "mq", "rpc"])
        .unwrap();
    for r in results {
        wtr.write_record([
            r.variant.name().to_string(),
            r.trial.to_string(),
            r.algo.name().to_string(),
            r.states.to_string(),
            format!("{:.6}", r.seconds),
            r.mq.to_string(),
            r.rpc.to_string(),
        ])
        .unwrap();
    }
    wtr.flush().unwrap();
}

fn write_summary(path: &Path, results: &[RunResult]) {
    let mut wtr = Writer::from_path(path).expect("creating summary file failed");
    wtr.write_record([
        "variant", "algo", "runs", "time_mean", "time_std", "mq_mean", "mq_std", "rpc_mean",
        "rpc_std",
    ])
    .unwrap();
    for (variant, algo, runs) in groups(results) {
        let (t_mean, t_std) = mean_std(runs.iter().map(|r| r.seconds));
        let (mq_mean, mq_std) = mean_std(runs.iter().map(|r| r.mq as f64));
        let (rpc_mean, rpc_std) = mean_std(runs.iter().map(|r| r.rpc as f64));
        wtr.write_record([
            variant.name().to_string(),
            algo.name().to_string(),
            runs.len().to_string(),
            format!("{t_mean:.6}"),
            format!("{t_std:.6}"),
            format!("{mq_mean:.3}"),
            format!("{mq_std:.3}"),
            format!("{rpc_mean:.3}"),
            format!("{rpc_std:.3}"),
        ])
        .unwrap();
    }
    wtr.flush().unwrap();
}

fn summarize(results: &[RunResult]) -> Vec<SummaryRow> {
    groups(results)
        .into_iter()
        .map(|(variant, algo, runs)| {
            let (t_mean, _) = mean_std(runs.iter().map(|r| r.seconds));
            let (mq_mean, _) = mean_std(runs.iter().map(|r| r.mq as f64));
            let (rpc_mean, _) = mean_std(runs.iter().map(|r| r.rpc as f64));
            SummaryRow {
                variant: variant.name(),
                algo: algo.name(),
                runs: runs.len(),
                time_mean: format!("{t_mean:.2}"),
                mq_mean: format!("{mq_mean:.0}"),
                rpc_mean: format!("{rpc_mean:.0}"),
            }
        })
        .collect()
}

fn groups(results: &[RunResult]) -> Vec<(Variant, Algo, Vec<&RunResult>)> {
    let mut grouped = Vec::new();
    for variant in [Variant::Complex, Variant::Medium, Variant::Simple] {
        for algo in [Algo::LStar, Algo::Ttt] {
            let runs: Vec<&RunResult> = results
                .iter()
                .filter(|r| r.variant == variant && r.algo == algo)
                .collect();
            if !runs.is_empty() {
                grouped.push((variant, algo, runs));
            }
        }
    }
    grouped
}

/// Mean and sample standard deviation; a single observation has deviation
/// zero.
fn mean_std(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() == 1 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    (mean, var.sqrt())
}

/// Writes the last trial's automaton per (variant, algo) as dot and tries
/// to render it to PNG.
fn render_automata(out_dir: &Path, results: &[RunResult]) {
    for (variant, algo, runs) in groups(results) {
        let Some(last) = runs.last() else { continue };
        let dot = last.dfa.dot_representation();
        let stem = format!("dfa_{}_{}", variant.name(), algo.name());
        let dot_path = out_dir.join(format!("{stem}.dot"));
        fs::write(&dot_path, &dot).expect("cannot write dot file");
        match graphviz_render::render_to_file(
            &GraphvizSource::new(dot),
            out_dir.join(format!("{stem}.png")),
        ) {
            Ok(()) => info!("rendered {stem}.png"),
            Err(err) => warn!("could not render {stem}: {err}"),
        }
    }
}
