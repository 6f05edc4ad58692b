//! Treeload CLI
//!
//! - Scanning a directory into an entity snapshot
//! - Generating synthetic snapshots for the registered cases
//! - Rendering a strategy's batches to a Cypher script
//! - Benchmarking strategies against the in-memory store or Neo4j

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use treeload_ingest::harness::load_fixture;
use treeload_ingest::report::{render_tsv, RunReport};
use treeload_ingest::{BenchConfig, CaseReport, ConfigError, FixtureSource, Harness, RunPlan};
use treeload_model::{
    display_tree, find_case, save_snapshot, scan, synthesize, ScanOptions, CASES,
};
use treeload_store::cypher::render_script;
use treeload_store::{GraphStore, MemoryGraph};

mod neo4j;

use neo4j::{Neo4jConfig, Neo4jHttpStore};

const NEO4J_PASSWORD_ENV: &str = "NEO4J_PASSWORD";

#[derive(Parser)]
#[command(name = "treeload")]
#[command(
    author,
    version,
    about = "Treeload: benchmark strategies for loading filesystem trees into a graph store"
)]
struct Cli {
    /// Log more (-v debug, -vv trace). `RUST_LOG` applies when not given.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a directory into a JSON entity snapshot.
    ///
    /// Unreadable entries are skipped (with their subtree) and reported.
    Scan {
        root: PathBuf,
        /// Output snapshot
        #[arg(short, long)]
        out: PathBuf,
        /// Directory names to leave out, e.g. `.git`
        #[arg(long)]
        exclude: Vec<String>,
        /// Print the scanned tree
        #[arg(long)]
        print: bool,
    },

    /// Generate a synthetic snapshot whose counts match a registered case.
    Generate {
        #[arg(short, long)]
        case: String,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Render one strategy's batches to a `cypher-shell` script.
    Render {
        #[arg(short, long)]
        case: String,
        /// Strategy number or name (1|gulp, 2|bounded, 4|merge, 6|bulk)
        #[arg(short, long)]
        strategy: String,
        #[arg(short, long, default_value_t = 1_000)]
        batch_size: usize,
        #[arg(long)]
        max_batch_lines: Option<usize>,
        /// Read the tree from this snapshot instead of generating it
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Run the benchmark harness.
    Bench(BenchArgs),

    /// List the registered cases.
    Cases,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    Neo4j,
}

#[derive(Args)]
struct BenchArgs {
    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Strategies to run (repeatable)
    #[arg(short, long = "strategy")]
    strategies: Vec<String>,
    #[arg(short, long)]
    iterations: Option<usize>,
    #[arg(short, long)]
    batch_size: Option<usize>,
    #[arg(long)]
    max_batch_lines: Option<usize>,
    /// Cases to run (repeatable)
    #[arg(short, long = "case")]
    cases: Vec<String>,
    /// Directory of `<case>.json` snapshots
    #[arg(long, conflicts_with = "seed")]
    snapshots: Option<PathBuf>,
    /// Seed for synthetic fixtures
    #[arg(long)]
    seed: Option<u64>,
    /// Check per-kind counts after each pair
    #[arg(long)]
    validate: bool,
    #[arg(long, value_enum, default_value_t = StoreKind::Memory)]
    store: StoreKind,
    #[arg(long, default_value = "http://localhost:7474")]
    neo4j_url: String,
    #[arg(long, default_value = "neo4j")]
    neo4j_user: String,
    /// Falls back to `NEO4J_PASSWORD`
    #[arg(long)]
    neo4j_password: Option<String>,
    #[arg(long, default_value = "neo4j")]
    neo4j_database: String,
    /// Per-request timeout in seconds
    #[arg(long)]
    neo4j_timeout_secs: Option<u64>,
    /// Also write a JSON report
    #[arg(long)]
    out_json: Option<PathBuf>,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scan {
            root,
            out,
            exclude,
            print,
        } => cmd_scan(&root, &out, exclude, print),
        Commands::Generate { case, seed, out } => cmd_generate(&case, seed, &out),
        Commands::Render {
            case,
            strategy,
            batch_size,
            max_batch_lines,
            snapshot,
            seed,
            out,
        } => {
            let config = BenchConfig {
                strategies: vec![strategy],
                batch_size,
                max_batch_lines,
                cases: vec![case],
                ..BenchConfig::default()
            };
            let plan = validated(&config);
            cmd_render(&plan, snapshot.as_deref(), seed, &out)
        }
        Commands::Bench(args) => cmd_bench(args),
        Commands::Cases => {
            println!("{:<10} {:>10} {:>8} {:>10}", "Case", "Nodes", "Dirs", "Files");
            for case in CASES {
                println!(
                    "{:<10} {:>10} {:>8} {:>10}",
                    case.name, case.node_count, case.dir_count, case.file_count
                );
            }
            Ok(())
        }
    }
}

/// Configuration errors end the process before any store is touched.
fn validated(config: &BenchConfig) -> RunPlan {
    match config.validate() {
        Ok(plan) => plan,
        Err(err) => config_exit(err),
    }
}

fn config_exit(err: ConfigError) -> ! {
    eprintln!("{} {err}", "error:".red().bold());
    std::process::exit(2);
}

fn cmd_scan(root: &Path, out: &Path, exclude: Vec<String>, print: bool) -> Result<()> {
    let options = ScanOptions {
        exclude_dir_names: exclude,
    };
    let (tree, report) =
        scan(root, &options).with_context(|| format!("failed to scan {}", root.display()))?;
    if print {
        print!("{}", display_tree(&tree));
    }
    save_snapshot(&tree, out)?;

    let counts = tree.count();
    println!(
        "{} {} entities ({} directories, {} files) -> {}",
        "scanned".green(),
        report.entities,
        counts.directories,
        counts.files,
        out.display()
    );
    if !report.skipped.is_empty() {
        println!("{} {} entries skipped", "warn:".yellow(), report.skipped.len());
        for skipped in &report.skipped {
            println!("  {}: {}", skipped.path.display(), skipped.reason);
        }
    }
    Ok(())
}

fn cmd_generate(case: &str, seed: u64, out: &Path) -> Result<()> {
    let case = find_case(case)?;
    let tree = synthesize(case, seed)?;
    save_snapshot(&tree, out)?;
    println!(
        "{} {} ({} nodes, seed {seed}) -> {}",
        "generated".green(),
        case.name,
        case.node_count,
        out.display()
    );
    Ok(())
}

fn cmd_render(plan: &RunPlan, snapshot: Option<&Path>, seed: u64, out: &Path) -> Result<()> {
    let (strategy, case) = match (plan.strategies.first(), plan.cases.first()) {
        (Some(strategy), Some(case)) => (*strategy, *case),
        _ => return Err(anyhow!("render needs one strategy and one case")),
    };
    let tree = match snapshot {
        Some(path) => treeload_model::load_snapshot(path)?,
        None => load_fixture(&FixtureSource::Synthetic { seed }, case)?,
    };

    let batches = strategy
        .render(&tree, plan.bound)
        .collect::<treeload_ingest::Result<Vec<_>>>()?;
    let count = batches.len();
    let lines: usize = batches.iter().map(|b| b.lines()).sum();
    fs::write(out, render_script(batches))
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "{} {strategy} {}: {count} batches, {lines} lines -> {}",
        "rendered".green(),
        case.name,
        out.display()
    );
    Ok(())
}

fn bench_config(args: &BenchArgs) -> BenchConfig {
    let mut config = match &args.config {
        Some(path) => BenchConfig::from_json_file(path).unwrap_or_else(|err| config_exit(err)),
        None => BenchConfig::default(),
    };
    if !args.strategies.is_empty() {
        config.strategies = args.strategies.clone();
    }
    if !args.cases.is_empty() {
        config.cases = args.cases.clone();
    }
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if args.max_batch_lines.is_some() {
        config.max_batch_lines = args.max_batch_lines;
    }
    if let Some(dir) = &args.snapshots {
        config.fixture = FixtureSource::SnapshotDir { dir: dir.clone() };
    } else if let Some(seed) = args.seed {
        config.fixture = FixtureSource::Synthetic { seed };
    }
    config.validate |= args.validate;
    config
}

fn cmd_bench(args: BenchArgs) -> Result<()> {
    let plan = validated(&bench_config(&args));

    let (store_name, reports) = match args.store {
        StoreKind::Memory => ("memory", run_plan(&mut MemoryGraph::new(), &plan)?),
        StoreKind::Neo4j => {
            let password = args
                .neo4j_password
                .clone()
                .or_else(|| env::var(NEO4J_PASSWORD_ENV).ok())
                .unwrap_or_else(|| "neo4j".to_string());
            let mut store = Neo4jHttpStore::connect(&Neo4jConfig {
                url: args.neo4j_url.clone(),
                user: args.neo4j_user.clone(),
                password,
                database: args.neo4j_database.clone(),
                timeout: args.neo4j_timeout_secs.map(Duration::from_secs),
            })?;
            ("neo4j", run_plan(&mut store, &plan)?)
        }
    };

    print!("{}", render_tsv(&reports));
    print_diagnostics(&reports);

    if let Some(path) = &args.out_json {
        let json = RunReport::new(store_name, &plan, &reports).to_json_pretty()?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "wrote JSON report");
    }
    Ok(())
}

fn run_plan<S: GraphStore>(store: &mut S, plan: &RunPlan) -> Result<Vec<CaseReport>> {
    info!(
        strategies = plan.strategies.len(),
        cases = plan.cases.len(),
        iterations = plan.iterations,
        batch_size = plan.bound.target,
        "starting benchmark"
    );
    Ok(Harness::new(store).run(plan)?)
}

fn print_diagnostics(reports: &[CaseReport]) {
    for report in reports {
        for (iteration, error) in report.failures() {
            eprintln!(
                "{} {} iteration {iteration}: {error}",
                "failed".red().bold(),
                report.label()
            );
        }
        let Some(validation) = &report.validation else {
            continue;
        };
        if validation.passed() {
            eprintln!(
                "{} {} ({} directories, {} files, {} edges)",
                "valid".green(),
                report.label(),
                validation.observed.directories,
                validation.observed.files,
                validation.edges
            );
        } else {
            for mismatch in &validation.mismatches {
                eprintln!("{} {}: {mismatch}", "mismatch".yellow(), report.label());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.json");
        fs::write(&path, r#"{"iterations": 9, "cases": ["5000"], "validate": true}"#).unwrap();
        let cli = Cli::parse_from([
            "treeload",
            "bench",
            "--config",
            path.to_str().unwrap(),
            "-s",
            "bulk",
            "-s",
            "2",
            "-i",
            "3",
            "--seed",
            "42",
        ]);
        let Commands::Bench(args) = cli.command else {
            panic!("expected bench");
        };
        let config = bench_config(&args);
        assert_eq!(config.iterations, 3);
        assert_eq!(config.cases, vec!["5000".to_string()]);
        assert_eq!(config.strategies, vec!["bulk".to_string(), "2".to_string()]);
        assert_eq!(config.fixture, FixtureSource::Synthetic { seed: 42 });
        assert!(config.validate);
    }

    #[test]
    fn test_snapshots_conflict_with_seed() {
        assert!(Cli::try_parse_from([
            "treeload",
            "bench",
            "--snapshots",
            "/tmp",
            "--seed",
            "1"
        ])
        .is_err());
    }

    #[test]
    fn test_render_writes_script() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("case_100.cypher");
        let plan = BenchConfig {
            strategies: vec!["merge".to_string()],
            batch_size: 100,
            cases: vec!["100".to_string()],
            ..BenchConfig::default()
        }
        .validate()
        .unwrap();
        cmd_render(&plan, None, 1, &out).unwrap();
        let script = fs::read_to_string(&out).unwrap();
        assert!(script.starts_with("// batch 1 (standalone"));
        assert!(script.contains("MERGE (n9700000:Directory {id: 9700000}) SET"));
    }

    proptest::proptest! {
        #[test]
        fn prop_numeric_flags_override_defaults(
            iterations in 1usize..1000,
            batch_size in 1usize..100_000,
            max_lines in proptest::option::of(1usize..100_000),
            seed in proptest::prelude::any::<u64>(),
        ) {
            let iterations_arg = iterations.to_string();
            let batch_arg = batch_size.to_string();
            let seed_arg = seed.to_string();
            let mut argv = vec![
                "treeload".to_string(),
                "bench".to_string(),
                "-i".to_string(),
                iterations_arg,
                "-b".to_string(),
                batch_arg,
                "--seed".to_string(),
                seed_arg,
            ];
            if let Some(lines) = max_lines {
                argv.push("--max-batch-lines".to_string());
                argv.push(lines.to_string());
            }
            let Commands::Bench(args) = Cli::parse_from(argv).command else {
                panic!("expected bench");
            };
            let config = bench_config(&args);
            proptest::prop_assert_eq!(config.iterations, iterations);
            proptest::prop_assert_eq!(config.batch_size, batch_size);
            proptest::prop_assert_eq!(config.max_batch_lines, max_lines);
            proptest::prop_assert_eq!(config.fixture, FixtureSource::Synthetic { seed });
            proptest::prop_assert_eq!(config.strategies, BenchConfig::default().strategies);
        }
    }
}
