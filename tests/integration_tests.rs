//! Integration tests for the smina-driver library

use smina_driver::command::CommandLine;
use smina_driver::flex::FlexibleResidue;
use smina_driver::io::{read_box_config, PluginSettings};
use smina_driver::job::{DockingMode, JobConfig, JobError, MinimizeOptions, RefineConfig};
use smina_driver::paths::PathStyle;
use smina_driver::results::{extract_model, merge_flexres, parse_poses};
use smina_driver::runner::{Executor, ProcessStatus, RunError};
use smina_driver::scoring::{ScoringChoice, ScoringError};
use smina_driver::session::{DockOutcome, DockPlanning, Session};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Get the path to test data directory
fn test_data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("test_data")
}

fn fixture(name: &str) -> String {
    fs::read_to_string(test_data_dir().join(name)).expect("Failed to read fixture")
}

/// Stands in for smina: copies recorded outputs to wherever a command asks
#[derive(Default)]
struct ReplaySmina {
    commands: Vec<CommandLine>,
}

impl Executor for ReplaySmina {
    fn execute(&mut self, command: &CommandLine) -> Result<ProcessStatus, RunError> {
        self.commands.push(command.clone());
        if let Some(out) = command.value_of("-o") {
            let body = if out.ends_with("_docked.pdbqt") {
                fixture("lig1_docked.pdbqt")
            } else {
                "REMARK minimizedAffinity -9.02\nROOT\nENDROOT\nTORSDOF 1\n".to_string()
            };
            fs::write(out, body)?;
        }
        if let Some(flex) = command.value_of("--out_flex") {
            fs::write(flex, fixture("lig1_flexres.pdbqt"))?;
        }
        Ok(ProcessStatus::success())
    }
}

/// A working directory with a prepared receptor and one custom table
fn workspace(dir: &Path, style: PathStyle) -> Session<ReplaySmina> {
    let tables = dir.join("tables");
    fs::create_dir_all(&tables).unwrap();
    fs::copy(test_data_dir().join("custom.scr"), tables.join("custom.scr")).unwrap();
    fs::copy(test_data_dir().join("rec_config.txt"), dir.join("rec_config.txt")).unwrap();
    fs::write(dir.join("rec.pdbqt"), "ATOM\n").unwrap();

    let settings = PluginSettings {
        smina_exe: "/opt/smina/smina.static".into(),
        openbabel_exe: "obabel".into(),
        scoring_table_dir_path: tables.to_string_lossy().into_owned(),
        path_style: style,
        ..PluginSettings::default()
    };
    Session::new(settings, dir, ReplaySmina::default())
}

#[test]
fn test_parse_docked_fixture() {
    let poses = parse_poses(&fixture("lig1_docked.pdbqt")).expect("Failed to parse poses");
    let models: Vec<u32> = poses.iter().map(|p| p.model_number).collect();
    assert_eq!(models, vec![1, 2, 3]);
    assert_approx_eq::assert_approx_eq!(poses[0].affinity, -8.41352272);
    assert_approx_eq::assert_approx_eq!(poses[2].affinity, -6.20931482);
}

#[test]
fn test_merge_flexres_fixture() {
    let merged = merge_flexres(&fixture("lig1_flexres.pdbqt"));
    let models: Vec<&str> = merged.lines().filter(|l| l.starts_with("MODEL")).collect();
    assert_eq!(models, vec!["MODEL 1", "MODEL 2"]);
    assert_eq!(merged.matches("ENDMDL").count(), 2);
    assert_eq!(merged.matches("BEGIN_RES").count(), 4);
    assert!(merged.ends_with("ENDMDL\n"));
}

#[test]
fn test_box_config_fixture() {
    let spec = read_box_config(test_data_dir().join("rec_config.txt")).expect("Failed to read box");
    assert_eq!(spec.size.x, 22);
    let corners = spec.corners().unwrap();
    assert_approx_eq::assert_approx_eq!(corners[0].x, 12.5 - 11.0);
    assert_approx_eq::assert_approx_eq!(corners[7].y, 17.75 + 9.0);
    assert_approx_eq::assert_approx_eq!(corners[7].z, -4.25 + 10.0);
}

#[test]
fn test_flexible_dock_round_trip() {
    let dir = tempdir().unwrap();
    let mut session = workspace(dir.path(), PathStyle::Native);
    session
        .flexibles
        .add_selection(["A:ARG12", "A:ARG12", "A:TYR40"].map(|r| r.parse::<FlexibleResidue>().unwrap()));

    let mut job = JobConfig {
        receptor: "rec".into(),
        ligand: dir.path().join("lig1"),
        mode: DockingMode::Flexible,
        scoring: ScoringChoice::from_name("custom"),
        seed: Some(42),
        suffix: Some("run2".into()),
        ..JobConfig::default()
    };

    let report = match session.dock(&mut job).expect("Docking failed") {
        DockOutcome::Completed(report) => report,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(report.label, "lig1_run2");
    assert_eq!(report.poses, 3);
    assert_eq!(report.output, dir.path().join("lig1_run2_docked.pdbqt"));

    let command = &session.executor().commands[0];
    assert_eq!(command.value_of("--flexres"), Some("A:12,A:40"));
    assert_eq!(
        command.value_of("--out_flex").map(PathBuf::from),
        Some(dir.path().join("lig1_run2_flexres.pdbqt"))
    );
    assert_eq!(command.value_of("--seed"), Some("42"));
    assert_eq!(command.args.iter().filter(|a| *a == "--custom_scoring").count(), 1);
    assert_eq!(
        command.value_of("--custom_scoring").map(PathBuf::from),
        Some(dir.path().join("tables").join("custom.scr"))
    );
    assert!(!command.has_flag("--log"));

    let merged = fs::read_to_string(dir.path().join("lig1_run2_flexres_merged.pdbqt")).unwrap();
    assert_eq!(merged.matches("MODEL").count(), 2);

    // Select two poses, refine them, export the table
    let set = session.results.get_mut("lig1_run2").unwrap();
    set.select(1);
    set.select(3);
    assert!(!dir.path().join("pose1_lig1_run2.pdbqt").exists());

    let refine = RefineConfig {
        minimize: Some(MinimizeOptions::default()),
        ..RefineConfig::default()
    };
    let reports = session.refine("rec", &refine).expect("Refinement failed");
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].output, dir.path().join("pose3_lig1_run2_minimized.pdbqt"));
    let pose3 = fs::read_to_string(dir.path().join("pose3_lig1_run2.pdbqt")).unwrap();
    assert_eq!(Some(pose3), extract_model(&fixture("lig1_docked.pdbqt"), 3));
    assert_eq!(
        session.executor().commands[1].value_of("-l").map(PathBuf::from),
        Some(dir.path().join("pose1_lig1_run2.pdbqt"))
    );

    let csv = session.export_refinements().unwrap();
    assert_eq!(csv, dir.path().join("minimization.csv"));
    assert_eq!(
        fs::read_to_string(csv).unwrap(),
        "model,Affinity\npose1_lig1_run2_minimized,-9.02\npose3_lig1_run2_minimized,-9.02\n"
    );

    let csv = session.export_results("lig1_run2").unwrap();
    assert!(fs::read_to_string(csv).unwrap().starts_with("model,Affinity\n1,-8.41352272\n"));
}

#[test]
fn test_batch_docks_past_missing_ligand() {
    let dir = tempdir().unwrap();
    let mut session = workspace(dir.path(), PathStyle::Native);
    let mut job = JobConfig {
        receptor: "rec".into(),
        ..JobConfig::default()
    };

    let ligands = [dir.path().join("missing.sdf"), dir.path().join("lig1.pdbqt")];
    let entries = session.dock_batch(&mut job, &ligands);

    assert!(matches!(entries[0].result, Err(RunError::MissingInput(_))));
    match &entries[1].result {
        Ok(DockOutcome::Completed(report)) => {
            assert_eq!(report.label, "lig1");
            assert_eq!(report.poses, 3);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.executor().commands.len(), 1);
    assert!(session.results.get("lig1").is_some());
}

#[test]
fn test_unknown_table_fails_before_translation() {
    let dir = tempdir().unwrap();
    // Temporary directories are not drive paths, so WSL translation would fail
    let session = workspace(dir.path(), PathStyle::Wsl);

    let mut job = JobConfig {
        receptor: "rec".into(),
        ligand: dir.path().join("lig1"),
        scoring: ScoringChoice::from_name("missing"),
        ..JobConfig::default()
    };
    assert!(matches!(
        session.plan_dock(&mut job),
        Err(RunError::Job(JobError::Scoring(ScoringError::UnknownTable(_))))
    ));

    job.scoring = ScoringChoice::Vina;
    assert!(matches!(session.plan_dock(&mut job), Err(RunError::Path(_))));
}

#[test]
fn test_dry_run_plan_is_deterministic() {
    let dir = tempdir().unwrap();
    let session = workspace(dir.path(), PathStyle::Native);
    let mut job = JobConfig {
        receptor: "rec".into(),
        ligand: dir.path().join("lig1"),
        ..JobConfig::default()
    };

    let plan = |job: &mut JobConfig| match session.plan_dock(job).unwrap() {
        DockPlanning::Ready(planned) => planned.command.to_string(),
        DockPlanning::Skipped(w) => panic!("skipped: {w}"),
    };
    let first = plan(&mut job);
    assert_eq!(first, plan(&mut job));
    assert!(first.contains(" --flex_hydrogens --exhaustiveness 8 --num_modes 9"));
    assert!(!first.contains("--custom_scoring"));
    assert!(session.executor().commands.is_empty());
}
