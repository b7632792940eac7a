//! dpexplore CLI - exploration decisions for concurrent learning runs.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dpexplore::{
    CheckpointManager, Config, ConfSelector, ExplorationReport, ExplorationScheduler,
    ModelDeviTableRender,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "dpexplore")]
#[command(version)]
#[command(about = "Exploration decision engine for concurrent learning of interatomic potentials")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "dpexplore.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify model deviation tables and select frames for labeling
    Select {
        /// model_devi.out tables, one per trajectory
        #[arg(short, long, num_args = 1.., required = true)]
        model_devi: Vec<PathBuf>,

        /// Trajectory files matching the tables (defaults to the tables)
        #[arg(short, long, num_args = 1..)]
        trajs: Vec<PathBuf>,
    },

    /// Feed the last iteration's tables to a checkpointed run and plan the next one
    Step {
        /// Checkpoint directory of the run
        #[arg(long)]
        checkpoint: PathBuf,

        /// model_devi.out tables of the last iteration; omit to start the run
        #[arg(short, long, num_args = 1..)]
        model_devi: Vec<PathBuf>,
    },

    /// Print the convergence table of a checkpointed run
    Progress {
        /// Checkpoint directory of the run
        #[arg(long)]
        checkpoint: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn print_example_config() {
    let example = r#"# dpexplore configuration file

[scheduler]
max_numb_iter = 10
fatal_at_max = true
max_selected_frames = 100
type_map = ["O", "H"]

[convergence]
type = "fixed-levels"
level_f_lo = 0.05
level_f_hi = 0.50
# level_v_lo = 0.05
# level_v_hi = 0.50
conv_accuracy = 0.9

# [convergence]
# type = "adaptive-lower"
# level_f_hi = 0.50
# numb_candi_f = 200
# rate_candi_f = 0.01
# n_checked_steps = 2
# conv_tolerance = 0.005

[downsample]
policy = "max-deviation"
# policy = "random"
# seed = 42

[[stages]]
name = "warmup"
ensemble = "nvt"
temps = [300.0]
nsteps = 1000
trj_freq = 10

[[stages]]
name = "heat"
ensemble = "npt"
temps = [300.0, 600.0]
press = [1.0, 1000.0]
nsteps = 5000
max_numb_iter = 20
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

fn render_for(report: &ExplorationReport) -> Arc<ModelDeviTableRender> {
    Arc::new(ModelDeviTableRender::new(report.level_v().is_some()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => print_example_config(),

        Commands::Validate => {
            let config = load_config(&cli.config)?;
            let report = ExplorationReport::from_config(&config.convergence, config.downsample);
            let (f_lo, f_hi) = report.level_f();

            info!("Configuration is valid");
            info!("  Stages: {}", config.stages.len());
            info!("  Force trust level: [{f_lo}, {f_hi})");
            if let Some((v_lo, v_hi)) = report.level_v() {
                info!("  Virial trust level: [{v_lo}, {v_hi})");
            }
            info!(
                "  Max iterations per stage: {} (fatal at max: {})",
                config.scheduler.max_numb_iter, config.scheduler.fatal_at_max
            );
            info!(
                "  Labeling budget: {} frames per iteration",
                config.scheduler.max_selected_frames
            );
        }

        Commands::Select { model_devi, trajs } => {
            let config = load_config(&cli.config)?;
            let report = ExplorationReport::from_config(&config.convergence, config.downsample);
            let selector = ConfSelector::new(
                render_for(&report),
                report,
                config.scheduler.max_selected_frames,
            );

            let trajs = if trajs.is_empty() {
                model_devi.clone()
            } else {
                trajs
            };
            let (confs, report) = selector.select(&trajs, &model_devi, &config.scheduler.type_map)?;

            let (f_lo, f_hi) = report.level_f();
            let summary = json!({
                "accurate": report.accurate_ratio()?,
                "candidate": report.candidate_ratio()?,
                "failed": report.failed_ratio()?,
                "level_f": [f_lo, f_hi],
                "level_v": report.level_v().map(|(lo, hi)| [lo, hi]),
                "selected": confs.len(),
            });
            println!("{summary}");
            for conf in &confs {
                println!("{}", serde_json::to_string(conf)?);
            }
        }

        Commands::Step {
            checkpoint,
            model_devi,
        } => {
            let config = load_config(&cli.config)?;
            let template = ExplorationReport::from_config(&config.convergence, config.downsample);
            let mut sched = ExplorationScheduler::from_config(&config, render_for(&template));

            let name = cli
                .config
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dpexplore".to_string());
            let mut mgr =
                CheckpointManager::new(&checkpoint).context("Failed to create checkpoint manager")?;
            let saved = mgr
                .init_or_load(&name)
                .context("Failed to initialize checkpoint")?
                .scheduler
                .clone();
            sched.restore(saved).context("Checkpoint does not match the configuration")?;

            if sched.complete() {
                println!("Exploration complete");
                return Ok(());
            }

            let report = match (sched.get_iteration(), model_devi.is_empty()) {
                (None, false) => {
                    warn!("Run has not started; ignoring model deviation tables");
                    None
                }
                (None, true) => None,
                (Some(_), true) => bail!("--model-devi is required once the run has started"),
                (Some(_), false) => {
                    let Some(stage) = sched.stage_schedulers().get(sched.get_stage()) else {
                        bail!("Checkpoint points past the configured stages");
                    };
                    let (confs, report) = stage.selector().select(
                        &model_devi,
                        &model_devi,
                        &config.scheduler.type_map,
                    )?;
                    for conf in &confs {
                        println!("{}", serde_json::to_string(conf)?);
                    }
                    Some(report)
                }
            };

            let outcome = sched.plan_next_iteration(report, Some(model_devi.as_slice()));
            mgr.update(sched.state())
                .context("Failed to save checkpoint")?;
            let plan = outcome?;

            let last = sched.print_last_iteration(true)?;
            if !last.is_empty() {
                info!("Last iteration:\n{last}");
            }
            match plan.task_group {
                Some(group) => println!("{}", serde_json::to_string(&group)?),
                None => println!("Exploration complete"),
            }
        }

        Commands::Progress { checkpoint } => {
            let mut mgr =
                CheckpointManager::new(&checkpoint).context("Failed to create checkpoint manager")?;
            if !mgr.exists() {
                bail!("No checkpoint found in {checkpoint:?}");
            }
            let state = mgr.load().context("Failed to load checkpoint")?;

            println!("{}", state.scheduler.print_convergence()?);
            println!(
                "# run '{}': {} iterations planned, stage {}, {}",
                state.name,
                state.scheduler.planned_iterations,
                state.scheduler.cur_stage,
                if state.scheduler.complete {
                    "complete"
                } else {
                    "in progress"
                }
            );
        }
    }

    Ok(())
}
