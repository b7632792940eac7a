//! End-to-end exploration runs driven through model deviation files.

use dpexplore::{
    CheckpointManager, Config, ExplorationScheduler, ModelDeviTableRender, StageTemplate,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

type Scheduler = ExplorationScheduler<StageTemplate, ModelDeviTableRender>;

const FIXED: &str = r#"
[scheduler]
max_numb_iter = 5
fatal_at_max = false
max_selected_frames = 3

[convergence]
type = "fixed-levels"
level_f_lo = 0.1
level_f_hi = 0.3
conv_accuracy = 0.75

[[stages]]
name = "cold"
temps = [100.0]

[[stages]]
name = "hot"
temps = [600.0, 900.0]
max_numb_iter = 2
"#;

const ADAPTIVE: &str = r#"
[scheduler]

[convergence]
type = "adaptive-lower"
level_f_hi = 0.3
numb_candi_f = 1
rate_candi_f = 0.0
n_checked_steps = 2
conv_tolerance = 0.01

[[stages]]
temps = [300.0]
"#;

fn scheduler(text: &str) -> Scheduler {
    let config: Config = toml::from_str(text).unwrap();
    config.validate().unwrap();
    ExplorationScheduler::from_config(&config, Arc::new(ModelDeviTableRender::new(false)))
}

/// Write one `model_devi.out` per trajectory with the given max force deviations.
fn write_tables(dir: &Path, iter: usize, trajs: &[&[f64]]) -> Vec<PathBuf> {
    trajs
        .iter()
        .enumerate()
        .map(|(i, devi)| {
            let mut text = String::from("# step max_devi_v min_devi_v avg_devi_v max_devi_f min_devi_f avg_devi_f\n");
            for (frame, f) in devi.iter().enumerate() {
                text.push_str(&format!("{} 0 0 0 {} 0 {}\n", frame * 10, f, f / 2.0));
            }
            let path = dir.join(format!("iter{iter:03}.traj{i:03}.out"));
            fs::write(&path, text).unwrap();
            path
        })
        .collect()
}

/// Select on the current stage and feed the report back.
fn step(
    sched: &mut Scheduler,
    files: &[PathBuf],
) -> dpexplore::Result<(usize, dpexplore::IterationPlan<dpexplore::TaskGroup, ModelDeviTableRender>)> {
    let selector = sched.stage_schedulers()[sched.get_stage()].selector().clone();
    let (confs, report) = selector.select(files, files, &[])?;
    let plan = sched.plan_next_iteration(Some(report), Some(files))?;
    Ok((confs.len(), plan))
}

#[test]
fn test_two_stage_run_with_resume() {
    let dir = TempDir::new().unwrap();
    let mut sched = scheduler(FIXED);

    let plan = sched.plan_next_iteration(None, None).unwrap();
    let group = plan.task_group.unwrap();
    assert_eq!(group.stage, "cold");
    assert_eq!(group.len(), 1);
    assert_eq!(sched.get_iteration(), Some(0));

    // 1 accurate, 3 candidates, 2 failed
    let files = write_tables(dir.path(), 0, &[&[0.05, 0.2, 0.25, 0.5], &[0.15, 0.35]]);
    let (selected, plan) = step(&mut sched, &files).unwrap();
    assert_eq!(selected, 3);
    assert!(!plan.converged);
    assert_eq!(sched.get_stage(), 0);

    // persist and resume into a fresh scheduler
    let mut mgr = CheckpointManager::new(&dir.path().join("ckpt")).unwrap();
    mgr.init_or_load("run").unwrap();
    mgr.update(sched.state()).unwrap();
    let mut mgr = CheckpointManager::new(&dir.path().join("ckpt")).unwrap();
    let saved = mgr.load().unwrap().scheduler.clone();
    let mut sched = scheduler(FIXED);
    sched.restore(saved).unwrap();
    assert_eq!(sched.get_iteration(), Some(1));

    // 3 of 4 accurate: "cold" converges and "hot" starts in the same call
    let files = write_tables(dir.path(), 1, &[&[0.01, 0.02, 0.03, 0.2]]);
    let (_, plan) = step(&mut sched, &files).unwrap();
    assert!(!plan.converged);
    let group = plan.task_group.unwrap();
    assert_eq!(group.stage, "hot");
    assert_eq!(group.len(), 2);
    assert_eq!(sched.get_stage(), 1);
    assert_eq!(sched.get_iteration(), Some(2));

    let files = write_tables(dir.path(), 2, &[&[0.05, 0.2]]);
    let (_, plan) = step(&mut sched, &files).unwrap();
    assert!(!plan.converged);
    assert_eq!(sched.get_iteration(), Some(3));

    // "hot" allows two iterations and is not fatal at the limit
    let files = write_tables(dir.path(), 3, &[&[0.05, 0.2]]);
    let (_, plan) = step(&mut sched, &files).unwrap();
    assert!(plan.converged);
    assert!(plan.task_group.is_none());
    assert!(sched.complete());

    let index = sched.get_stage_of_iterations();
    let flat: Vec<(usize, usize)> = index.iter().map(|i| (i.stage, i.idx_in_stage)).collect();
    assert_eq!(flat, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);

    let ratios = sched.get_convergence_ratio().unwrap();
    assert!((ratios[0].candidate - 0.5).abs() < 1e-12);
    assert!((ratios[1].accurate - 0.75).abs() < 1e-12);
    for r in &ratios {
        assert!((r.accurate + r.candidate + r.failed - 1.0).abs() < 1e-12);
    }

    let table = sched.print_convergence().unwrap();
    assert!(table.contains("# Stage    0  converged"));
    assert!(table.contains("# Stage    1  reached the maximal number of iterations"));
}

#[test]
fn test_adaptive_lower_level_settles() {
    let dir = TempDir::new().unwrap();
    let mut sched = scheduler(ADAPTIVE);
    sched.plan_next_iteration(None, None).unwrap();

    let devi: &[f64] = &[0.05, 0.1, 0.2, 0.4];
    let files = write_tables(dir.path(), 0, &[devi]);
    let (selected, plan) = step(&mut sched, &files).unwrap();
    assert_eq!(selected, 1);
    assert!(!plan.converged);

    let files = write_tables(dir.path(), 1, &[devi]);
    let (_, plan) = step(&mut sched, &files).unwrap();
    assert!(plan.converged);
    assert!(sched.complete());

    let reports = sched.stage_schedulers()[0].reports();
    assert_eq!(reports.len(), 2);
    assert!((reports[1].level_f().0 - 0.2).abs() < 1e-12);
}

#[test]
fn test_no_candidate_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let mut sched = scheduler(FIXED);
    sched.plan_next_iteration(None, None).unwrap();

    let files = write_tables(dir.path(), 0, &[&[0.01, 0.02, 0.5, 0.6]]);
    let err = step(&mut sched, &files).err().unwrap();
    assert!(err.is_fatal());
    assert!(err.to_string().starts_with("Fatal: stage 0: "));
    assert!(err.to_string().contains("does not select any candidate"));
}

#[test]
fn test_fatal_survives_checkpoint() {
    let text = FIXED.replace("fatal_at_max = false", "fatal_at_max = true");
    let dir = TempDir::new().unwrap();
    let ckpt = dir.path().join("ckpt");

    let mut sched = scheduler(&text);
    sched.plan_next_iteration(None, None).unwrap();
    let mut mgr = CheckpointManager::new(&ckpt).unwrap();
    mgr.init_or_load("run").unwrap();

    // "cold" stays unconverged until it hits max_numb_iter = 5
    for iter in 0..5 {
        let files = write_tables(dir.path(), iter, &[&[0.05, 0.2]]);
        let outcome = step(&mut sched, &files);
        mgr.update(sched.state()).unwrap();
        if iter < 4 {
            assert!(outcome.is_ok());
        } else {
            let err = outcome.err().unwrap();
            assert!(err.to_string().contains("stage 0: reached maximal number of iterations"));
        }
    }

    // a fresh process resubmitting the same report stops again
    let saved = CheckpointManager::new(&ckpt).unwrap().load().unwrap().scheduler.clone();
    let mut resumed = scheduler(&text);
    resumed.restore(saved).unwrap();
    let files = write_tables(dir.path(), 4, &[&[0.05, 0.2]]);
    let err = step(&mut resumed, &files).err().unwrap();
    assert!(err.is_fatal());
    assert_eq!(resumed.get_stage(), 0);
    assert_eq!(resumed.get_iteration(), Some(4));
    assert_eq!(resumed.get_stage_of_iterations().len(), 5);
}
