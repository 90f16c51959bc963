// Landmark SLAM on a synthetic world with periodic landmark removal
//
// Runs the incremental estimator over a seeded scenario, scores every step
// against ground truth and optionally compares all removal strategies.

use std::path::{Path, PathBuf};

use clap::Parser;
use log::{error, info};

use landmark_slam::common::SlamResult;
use landmark_slam::config::SlamConfig;
use landmark_slam::io::{write_json, SnapshotSink, SnapshotWriter};
use landmark_slam::landmark_removal::RemovalStrategy;
use landmark_slam::simulation::{compare_strategies, prepare_estimator, run_slam, RunResults, Scenario};
use landmark_slam::utils::{trajectory_plot, Metric, Visualizer};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of steps (overrides the configuration)
    #[arg(short, long)]
    steps: Option<usize>,

    /// Removal strategy name, see --list-strategies
    #[arg(long)]
    strategy: Option<String>,

    /// Scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for per-step JSON snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Output image (.svg or .png)
    #[arg(short, long)]
    plot: Option<PathBuf>,

    /// Run every removal strategy on the same scenario
    #[arg(long)]
    compare: bool,

    /// Print the available removal strategies and exit
    #[arg(long)]
    list_strategies: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Args::parse()) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> SlamResult<()> {
    if args.list_strategies {
        for name in RemovalStrategy::catalog() {
            println!("{}", name);
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => SlamConfig::load(path)?,
        None => SlamConfig::default(),
    };
    if let Some(steps) = args.steps {
        config.simulation.steps = steps;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    if args.strategy.is_some() {
        config.removal.strategy = args.strategy.clone();
    }
    if args.snapshot_dir.is_some() {
        config.output.snapshot_dir = args.snapshot_dir.clone();
    }
    if args.plot.is_some() {
        config.output.plot_path = args.plot.clone();
    }

    let estimator_config = config.estimator.to_estimator_config()?;
    let scenario = Scenario::generate(&config.simulation.to_scenario_config())?;
    info!(
        "scenario: {} steps, {} landmarks, seed {}",
        scenario.steps(),
        scenario.landmarks.len(),
        config.simulation.seed
    );

    if args.compare {
        let runs = compare_strategies(
            &estimator_config,
            &scenario,
            config.removal.interval,
            config.removal.keep_ratio,
            config.removal.k,
        )?;
        for (name, results) in &runs {
            print_summary(name, results);
        }
        if let Some(path) = &config.output.plot_path {
            for (metric, suffix) in [(Metric::Ate, "ate"), (Metric::Are, "are"), (Metric::Ud, "ud")] {
                let mut vis = Visualizer::new();
                vis.set_title(&format!("{} vs landmarks remaining", metric.label()))
                    .plot_metric(&runs, metric);
                vis.save(&suffixed(path, suffix), 800, 600)?;
            }
        }
        return Ok(());
    }

    let schedule = config.removal.to_schedule()?;
    let mut estimator = prepare_estimator(estimator_config, &scenario)?;
    let mut writer = config.output.snapshot_dir.as_ref().map(SnapshotWriter::new).transpose()?;

    let sink = writer.as_mut().map(|w| w as &mut dyn SnapshotSink);
    let results = run_slam(&mut estimator, &scenario, schedule.as_ref(), sink)?;
    let name = schedule.map_or("no_removal".to_string(), |s| s.strategy.to_string());
    print_summary(&name, &results);

    if let Some(writer) = &writer {
        let path = writer.dir().join("results.json");
        write_json(&path, &results)?;
        info!("results written to {}", path.display());
    }

    if let Some(path) = &config.output.plot_path {
        let landmarks: Vec<_> = estimator.map().landmarks().map(|lm| *lm.mean()).collect();
        let truth: Vec<_> = scenario.true_landmarks.values().copied().collect();
        let mut vis = trajectory_plot(estimator.poses(), &scenario.ground_truth, &landmarks, &truth, &name);
        vis.save(path, 800, 600)?;
        info!("plot written to {}", path.display());
    }
    Ok(())
}

fn print_summary(name: &str, results: &RunResults) {
    println!("{}", name);
    println!(
        "  steps: {} ok, {} failed",
        results.successful_steps(),
        results.failures.len()
    );
    println!(
        "  landmarks remaining: {}",
        results.landmarks_remaining.last().copied().unwrap_or(0)
    );
    if let Some(metrics) = results.last_metrics() {
        println!("  ATE: {:.3} m", metrics.ate);
        println!("  ARE: {:.3} deg", metrics.are);
        println!("  UD: {:.6}", metrics.ud);
    }
}

/// `plot.svg` -> `plot_ate.svg`
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}_{}", stem, suffix),
    };
    path.with_file_name(file_name)
}
