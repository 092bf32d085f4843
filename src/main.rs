//! Main executable for smina-driver

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use nalgebra::Vector3;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use smina_driver::flex::FlexibleResidue;
use smina_driver::geometry::{default_box, BoxSpec};
use smina_driver::io::{default_settings_path, read_box_config, write_box_config, PluginSettings};
use smina_driver::job::{
    parse_seed, Approximation, DockingMode, JobConfig, LocalDock, MinimizeOptions, Protonation,
    RefineConfig, DEFAULT_AUTOBOX_ADD, DEFAULT_EXHAUSTIVENESS, DEFAULT_NUM_MODES, DEFAULT_PH,
};
use smina_driver::naming::{pose_object, PDBQT_EXTENSION};
use smina_driver::results::{export_pose_set, merge_flexres, PoseSet};
use smina_driver::scoring::{ScoringChoice, ScoringTable};
use smina_driver::session::{
    ligand_stem, DockOutcome, DockPlanning, PlannedPose, ScoreRequest, Session,
};
use smina_driver::ProcessExecutor;

/// Command-line arguments for the application
#[derive(Parser, Debug)]
#[clap(
    name = "smina-driver",
    version = smina_driver::VERSION,
    author = "Hosein Fooladi <fooladi.hosein@gmail.com>",
    about = "Prepare, run and collect smina docking jobs"
)]
struct Cli {
    /// Plugin settings file (default: ~/.smina_plugin/smina_plugin.conf)
    #[clap(long, global = true, value_parser)]
    settings: Option<PathBuf>,

    /// Working directory holding receptors, configs and outputs
    #[clap(long, short = 'w', global = true, value_parser)]
    workdir: Option<PathBuf>,

    /// Print command lines instead of running them
    #[clap(long, global = true)]
    dry_run: bool,

    /// Print reports as JSON
    #[clap(long, global = true)]
    json: bool,

    /// Raise log verbosity (-v info, -vv debug)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Commands,
}

/// Poses to refine or score
#[derive(Args, Debug)]
struct PoseSelection {
    /// Docking output to take poses from, or the label it was docked under
    #[clap(long, value_parser)]
    from: Vec<PathBuf>,

    /// Model numbers to select in every --from file
    #[clap(long, value_delimiter = ',')]
    models: Vec<u32>,

    /// Pose saved as <NAME>.pdb or <NAME>.pdbqt in the working directory
    #[clap(long)]
    pose: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dock one ligand, or several in sequence
    Dock {
        /// Receptor name; needs <NAME>.pdbqt (or .pdb) and <NAME>_config.txt
        #[clap(long, short)]
        receptor: String,

        /// Ligand file; relative paths resolve against ligand_dir_path
        #[clap(long, short, value_parser, required = true)]
        ligand: Vec<PathBuf>,

        /// Flexible residue as CHAIN:RESNRESI, e.g. A:ARG123
        #[clap(long)]
        flex: Vec<String>,

        /// Dock with flexible side chains
        #[clap(long)]
        flexible: bool,

        /// Scoring table name
        #[clap(long, default_value = "vina")]
        scoring: String,

        /// Exhaustiveness of the search
        #[clap(long, default_value_t = DEFAULT_EXHAUSTIVENESS)]
        exhaustiveness: u32,

        /// Number of binding modes to generate
        #[clap(long, default_value_t = DEFAULT_NUM_MODES)]
        num_modes: u32,

        /// Fixed random seed
        #[clap(long, allow_hyphen_values = true)]
        seed: Option<String>,

        /// Tag added to every output name
        #[clap(long)]
        suffix: Option<String>,

        /// Ask smina to write a log file
        #[clap(long)]
        log: bool,

        /// Protonate for this pH when converting ligands (7.0 if no value)
        #[clap(long, num_args = 0..=1)]
        ph: Option<Option<f64>>,

        /// Write <label>.csv for every docked ligand
        #[clap(long)]
        export: bool,
    },

    /// Post-refine selected poses
    Refine {
        #[clap(long, short)]
        receptor: String,

        #[clap(flatten)]
        poses: PoseSelection,

        /// Re-dock inside a box drawn around the pose
        #[clap(long)]
        local_dock: bool,

        /// Padding around the pose for --local-dock
        #[clap(long, default_value_t = DEFAULT_AUTOBOX_ADD)]
        autobox_add: u32,

        /// Randomize the pose
        #[clap(long)]
        randomize: bool,

        /// Minimize the pose
        #[clap(long)]
        minimize: bool,

        /// Minimizer approximation: linear, spline or exact
        #[clap(long, default_value = "linear")]
        approximation: String,

        #[clap(long)]
        accurate_line: bool,

        #[clap(long)]
        early_term: bool,

        #[clap(long)]
        minimize_iters: Option<u32>,

        #[clap(long)]
        factor: Option<u32>,

        #[clap(long)]
        force_cap: Option<u32>,

        #[clap(long, default_value = "vina")]
        scoring: String,

        #[clap(long)]
        log: bool,

        /// Write minimization.csv
        #[clap(long)]
        export: bool,
    },

    /// Score selected poses without moving them
    Score {
        #[clap(long, short)]
        receptor: String,

        #[clap(flatten)]
        poses: PoseSelection,

        #[clap(long)]
        suffix: Option<String>,

        #[clap(long, default_value = "vina")]
        scoring: String,
    },

    /// Show or set a receptor's search box
    Box {
        receptor: String,

        /// Box center as x,y,z
        #[clap(long, value_delimiter = ',', allow_hyphen_values = true)]
        center: Option<Vec<f64>>,

        /// Box size as x,y,z (default 20,20,20)
        #[clap(long, value_delimiter = ',')]
        size: Option<Vec<i32>>,
    },

    /// List the poses of a docking output
    Poses {
        #[clap(value_parser)]
        file: PathBuf,

        /// Model numbers to mark as selected
        #[clap(long, value_delimiter = ',')]
        select: Vec<u32>,

        /// Write <label>.csv to the working directory
        #[clap(long)]
        export: bool,
    },

    /// Merge smina's flexible residue output into one model per pose
    MergeFlexres {
        #[clap(value_parser)]
        input: PathBuf,

        /// Output file (default: <input stem>_merged.pdbqt)
        #[clap(long, short, value_parser)]
        output: Option<PathBuf>,
    },

    /// Work with scoring tables
    Tables {
        #[clap(subcommand)]
        action: TableAction,
    },

    /// Show or change plugin settings
    Settings {
        #[clap(subcommand)]
        action: SettingsAction,
    },

    /// Convert a structure to .pdbqt with Open Babel
    Convert {
        #[clap(value_parser)]
        input: PathBuf,

        #[clap(long, short, value_parser)]
        output: Option<PathBuf>,

        /// Protonate for this pH instead of adding all hydrogens (7.0 if no value)
        #[clap(long, num_args = 0..=1)]
        ph: Option<Option<f64>>,
    },
}

#[derive(Subcommand, Debug)]
enum TableAction {
    /// List available tables
    List,
    /// Print a table
    Show { name: String },
    /// Copy a table to <NAME>_new.scr, changing weights as ROW=WEIGHT
    Edit {
        name: String,
        #[clap(long = "set", allow_hyphen_values = true)]
        weights: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the current settings
    Show,
    /// Set one value and save
    Set { key: String, value: String },
    /// Print the settings file location
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let settings = PluginSettings::load(&settings_path)
        .with_context(|| format!("Failed to read settings: {}", settings_path.display()))?;
    let workdir = match &cli.workdir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine working directory")?,
    };

    match cli.command {
        Commands::Dock {
            receptor,
            ligand,
            flex,
            flexible,
            scoring,
            exhaustiveness,
            num_modes,
            seed,
            suffix,
            log,
            ph,
            export,
        } => {
            let mut session = Session::new(settings, &workdir, ProcessExecutor::new());
            if let Some(ph) = ph {
                session.conversion.protonation = Protonation::ph(ph.unwrap_or(DEFAULT_PH))?;
            }
            let residues = flex
                .iter()
                .map(|r| r.parse::<FlexibleResidue>())
                .collect::<Result<Vec<_>, _>>()?;
            session.flexibles.add_selection(residues);

            let mut job = JobConfig {
                receptor,
                mode: if flexible {
                    DockingMode::Flexible
                } else {
                    DockingMode::Rigid
                },
                scoring: ScoringChoice::from_name(&scoring),
                exhaustiveness,
                num_modes,
                seed: seed.as_deref().map(parse_seed).transpose()?,
                suffix,
                write_log: log,
                ..JobConfig::default()
            };

            let ligands: Vec<PathBuf> = ligand
                .iter()
                .map(|path| resolve_ligand(path, &session.settings.ligand_dir_path))
                .collect();

            if cli.dry_run {
                for path in &ligands {
                    job.ligand = ligand_stem(path).0;
                    match session.plan_dock(&mut job)? {
                        DockPlanning::Ready(planned) => println!("{}", planned.command),
                        DockPlanning::Skipped(warning) => warn!("{}", warning),
                    }
                }
                return Ok(());
            }

            let mut failures = 0;
            let mut reports = Vec::new();
            for entry in session.dock_batch(&mut job, &ligands) {
                match entry.result {
                    Ok(DockOutcome::Completed(report)) => {
                        if export {
                            session.export_results(&report.label)?;
                        }
                        reports.push(report);
                    }
                    Ok(DockOutcome::Skipped(reason)) => warn!("{}", reason),
                    Err(e) => {
                        failures += 1;
                        eprintln!("ERROR : {}: {}", entry.ligand.display(), e);
                    }
                }
            }

            if cli.json {
                print_json(&reports)?;
            } else {
                for report in &reports {
                    println!(
                        "{}: {} poses, best {}",
                        report.label,
                        report.poses,
                        report
                            .best_affinity
                            .map_or_else(|| "-".to_string(), |a| format!("{:.1}", a))
                    );
                }
            }
            if failures > 0 {
                bail!("{} of {} ligands failed", failures, ligand.len());
            }
        }

        Commands::Refine {
            receptor,
            poses,
            local_dock,
            autobox_add,
            randomize,
            minimize,
            approximation,
            accurate_line,
            early_term,
            minimize_iters,
            factor,
            force_cap,
            scoring,
            log,
            export,
        } => {
            let refine = RefineConfig {
                local_dock: local_dock.then_some(LocalDock { autobox_add }),
                randomize,
                minimize: if minimize {
                    Some(MinimizeOptions {
                        approximation: approximation.parse::<Approximation>()?,
                        accurate_line,
                        early_term,
                        iterations: minimize_iters,
                        factor,
                        force_cap,
                    })
                } else {
                    None
                },
                scoring: ScoringChoice::from_name(&scoring),
                write_log: log,
            };

            let mut session = Session::new(settings, &workdir, ProcessExecutor::new());
            select_poses(&mut session, &poses)?;

            if cli.dry_run {
                print_planned(&session.plan_refine(&receptor, &refine)?);
                return Ok(());
            }

            let reports = session.refine(&receptor, &refine)?;
            if export {
                session.export_refinements()?;
            }
            print_pose_reports(&reports, cli.json)?;
        }

        Commands::Score {
            receptor,
            poses,
            suffix,
            scoring,
        } => {
            let request = ScoreRequest {
                receptor,
                suffix,
                scoring: ScoringChoice::from_name(&scoring),
            };
            let mut session = Session::new(settings, &workdir, ProcessExecutor::new());
            select_poses(&mut session, &poses)?;

            if cli.dry_run {
                print_planned(&session.plan_score(&request)?);
                return Ok(());
            }

            let reports = session.score(&request)?;
            print_pose_reports(&reports, cli.json)?;
        }

        Commands::Box {
            receptor,
            center,
            size,
        } => {
            let path = workdir.join(format!("{}_config.txt", receptor));
            let spec = match center {
                Some(center) => {
                    let center = vector3(&center, "center")?;
                    let spec = match size {
                        Some(size) => BoxSpec::new(center, vector3(&size, "size")?)?,
                        None => default_box(center),
                    };
                    write_box_config(&path, &spec)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Wrote {}", path.display());
                    spec
                }
                None => read_box_config(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
            };

            if cli.json {
                #[derive(Serialize)]
                struct BoxReport {
                    center: Vector3<f64>,
                    size: Vector3<i32>,
                    corners: Vec<Vector3<f64>>,
                }
                print_json(&BoxReport {
                    center: spec.center,
                    size: spec.size,
                    corners: spec.corners()?.to_vec(),
                })?;
            } else {
                println!(
                    "center {:.3} {:.3} {:.3}  size {} {} {}",
                    spec.center.x, spec.center.y, spec.center.z, spec.size.x, spec.size.y, spec.size.z
                );
                for corner in spec.corners()? {
                    println!("  {:8.3} {:8.3} {:8.3}", corner.x, corner.y, corner.z);
                }
            }
        }

        Commands::Poses {
            file,
            select,
            export,
        } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut set = PoseSet::from_artifact(&file, &text)?;
            for model in select {
                if !set.select(model) {
                    warn!("No model {} in {}", model, file.display());
                }
            }

            if export {
                let path = workdir.join(format!("{}.csv", set.label));
                export_pose_set(&set, &path)?;
                info!("Wrote results for docking as {}", path.display());
            }

            if cli.json {
                print_json(&set)?;
            } else {
                println!("{:>6} {:>10}  {}", "Model", "Affinity", "Select");
                for pose in &set.poses {
                    println!(
                        "{:>6} {:>10.1}  {}",
                        pose.model_number,
                        pose.affinity,
                        if pose.selected { "[X]" } else { "[ ]" }
                    );
                }
                for pose in set.selected() {
                    println!("{}", pose_object(pose.model_number, &set.label));
                }
            }
        }

        Commands::MergeFlexres { input, output } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let output = output.unwrap_or_else(|| merged_name(&input));
            fs::write(&output, merge_flexres(&text))
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("{}", output.display());
        }

        Commands::Tables { action } => {
            let session = Session::new(settings, &workdir, ProcessExecutor::new());
            match action {
                TableAction::List => {
                    for name in session.tables.list()? {
                        println!("{}", name);
                    }
                }
                TableAction::Show { name } => {
                    let table = session.tables.load(&name)?;
                    if cli.json {
                        print_json(&table)?;
                    } else {
                        print!("{}", table.format());
                    }
                }
                TableAction::Edit { name, weights } => {
                    let mut table = session.tables.editable(&name)?;
                    apply_weights(&mut table, &weights)?;
                    let path = session.tables.save_edited(&name, &table)?;
                    println!("{}", path.display());
                }
            }
        }

        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                if cli.json {
                    print_json(&settings)?;
                } else {
                    print!("{}", settings.format());
                }
            }
            SettingsAction::Set { key, value } => {
                let mut settings = settings;
                settings.set(&key, &value)?;
                settings
                    .save(&settings_path)
                    .with_context(|| format!("Failed to write {}", settings_path.display()))?;
            }
            SettingsAction::Path => println!("{}", settings_path.display()),
        },

        Commands::Convert { input, output, ph } => {
            let mut session = Session::new(settings, &workdir, ProcessExecutor::new());
            if let Some(ph) = ph {
                session.conversion.protonation = Protonation::ph(ph.unwrap_or(DEFAULT_PH))?;
            }
            let output = output.unwrap_or_else(|| input.with_extension(PDBQT_EXTENSION));
            if cli.dry_run {
                let command = smina_driver::command::build_conversion_command(
                    Path::new(&session.settings.openbabel_exe),
                    &input,
                    &output,
                    &session.conversion,
                );
                println!("{}", command);
                return Ok(());
            }
            session.convert(&input, &output)?;
            println!("{}", output.display());
        }
    }

    Ok(())
}

/// Ligand paths relative to the working directory fall back to the ligand directory
fn resolve_ligand(path: &Path, ligand_dir: &str) -> PathBuf {
    if path.is_relative() && !ligand_dir.is_empty() && !path.exists() {
        Path::new(ligand_dir).join(path)
    } else {
        path.to_path_buf()
    }
}

fn merged_name(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}_merged.{}", stem, PDBQT_EXTENSION))
}

fn vector3<T: Copy + nalgebra::Scalar>(values: &[T], name: &str) -> Result<Vector3<T>> {
    match values {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => bail!("--{} needs three comma-separated values", name),
    }
}

/// Load result files, select models and register loose poses
fn select_poses(session: &mut Session<ProcessExecutor>, poses: &PoseSelection) -> Result<()> {
    for from in &poses.from {
        let file = results_file(session, from);
        let set = session
            .load_results(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        for model in &poses.models {
            if !set.select(*model) {
                warn!("No model {} in {}", model, file.display());
            }
        }
    }
    for name in &poses.pose {
        session.results.load_pose(Path::new(name));
    }
    Ok(())
}

/// A docking output given as a path, a path inside the working directory,
/// or the label it was docked under
fn results_file(session: &Session<ProcessExecutor>, from: &Path) -> PathBuf {
    if from.is_file() {
        return from.to_path_buf();
    }
    let in_workdir = session.namer.workdir.join(from);
    if in_workdir.is_file() {
        return in_workdir;
    }
    session.namer.docked(&from.to_string_lossy(), None)
}

/// Apply `ROW=WEIGHT` edits, rows counted from 1
fn apply_weights(table: &mut ScoringTable, edits: &[String]) -> Result<()> {
    for edit in edits {
        let (row, weight) = edit
            .split_once('=')
            .with_context(|| format!("Expected ROW=WEIGHT, got {}", edit))?;
        let row: usize = row.trim().parse().with_context(|| format!("Bad row in {}", edit))?;
        let weight: f64 = weight
            .trim()
            .parse()
            .with_context(|| format!("Bad weight in {}", edit))?;
        match row.checked_sub(1).and_then(|idx| table.terms.get_mut(idx)) {
            Some(term) => term.weight = weight,
            None => bail!("Table {} has no row {}", table.name, row),
        }
    }
    Ok(())
}

fn print_planned(planned: &[PlannedPose]) {
    for p in planned {
        println!("{}", p.command);
    }
}

fn print_pose_reports(reports: &[smina_driver::session::PoseReport], json: bool) -> Result<()> {
    if json {
        return print_json(&reports);
    }
    for report in reports {
        println!("Affinity for {} : {}", report.pose, report.affinity);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
