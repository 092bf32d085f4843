//! A docking session: settings, collaborators and accumulated results

use log::{debug, info, warn};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::command::{
    build_conversion_command, build_dock_command, build_refine_command, build_score_command,
    CommandLine, DockPaths, RefinePaths,
};
use crate::flex::FlexibleResidueSpec;
use crate::io::PluginSettings;
use crate::job::{
    ConversionOptions, DockPlan, FlexibleFallbackWarning, JobConfig, JobError, Preparation,
    RefineConfig,
};
use crate::naming::{ArtifactNamer, PDBQT_EXTENSION};
use crate::paths::PathTranslator;
use crate::results::{
    export_pose_set, export_refinements, extract_model, merge_flexres, parse_affinity,
    strip_ligand_flexres, PoseSet, WorkingSet,
};
use crate::runner::{expect_artifact, Executor, RunError};
use crate::scoring::{ScoringChoice, ScoringLibrary};

/// A docking run that is ready to execute
#[derive(Debug, Clone)]
pub struct PlannedDock {
    pub plan: DockPlan,
    pub paths: DockPaths,
    pub command: CommandLine,
}

/// A refinement or scoring run of one pose, ready to execute
#[derive(Debug, Clone)]
pub struct PlannedPose {
    pub pose: String,
    pub paths: RefinePaths,
    pub command: CommandLine,
}

/// Result of [`Session::plan_dock`]
#[derive(Debug, Clone)]
pub enum DockPlanning {
    Ready(PlannedDock),
    Skipped(FlexibleFallbackWarning),
}

/// What a finished docking run produced
#[derive(Debug, Clone, Serialize)]
pub struct DockReport {
    pub label: String,
    pub command: String,
    pub output: PathBuf,
    pub poses: usize,
    pub best_affinity: Option<f64>,
    pub merged_flexres: Option<PathBuf>,
    pub log: Option<PathBuf>,
}

/// Outcome of one docking attempt
#[derive(Debug, Clone, Serialize)]
pub enum DockOutcome {
    Completed(DockReport),
    Skipped(String),
}

/// Outcome for one ligand of a batch
#[derive(Debug)]
pub struct BatchEntry {
    pub ligand: PathBuf,
    pub result: Result<DockOutcome, RunError>,
}

/// One refined or scored pose
#[derive(Debug, Clone, Serialize)]
pub struct PoseReport {
    pub pose: String,
    pub command: String,
    pub output: PathBuf,
    pub affinity: f64,
}

/// Rescoring of the current poses
#[derive(Debug, Clone, Default)]
pub struct ScoreRequest {
    pub receptor: String,
    pub suffix: Option<String>,
    pub scoring: ScoringChoice,
}

/// State of one working directory and the programs that act on it
pub struct Session<E: Executor> {
    pub settings: PluginSettings,
    pub namer: ArtifactNamer,
    pub tables: ScoringLibrary,
    pub translator: PathTranslator,
    pub conversion: ConversionOptions,
    pub flexibles: FlexibleResidueSpec,

    /// Ligands docked by [`Session::dock_batch`], as paths without extension
    pub multirun: Vec<PathBuf>,
    pub results: WorkingSet,
    executor: E,
}

impl<E: Executor> Session<E> {
    pub fn new<P: AsRef<Path>>(settings: PluginSettings, workdir: P, executor: E) -> Self {
        let tables = ScoringLibrary::new(&settings.scoring_table_dir_path);
        let translator = PathTranslator::new(settings.path_style);
        Self {
            settings,
            namer: ArtifactNamer::new(workdir),
            tables,
            translator,
            conversion: ConversionOptions::default(),
            flexibles: FlexibleResidueSpec::new(),
            multirun: Vec::new(),
            results: WorkingSet::new(),
            executor,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn smina(&self) -> Result<PathBuf, RunError> {
        configured(&self.settings.smina_exe, "smina_exe")
    }

    fn obabel(&self) -> Result<PathBuf, RunError> {
        configured(&self.settings.openbabel_exe, "openbabel_exe")
    }

    /// Run a command and require its artifact
    fn run(&mut self, command: &CommandLine, artifact: &Path) -> Result<(), RunError> {
        let status = self.executor.execute(command)?;
        expect_artifact(command, status, artifact)
    }

    /// Convert `input` to `.pdbqt` next to it with Open Babel
    pub fn convert(&mut self, input: &Path, output: &Path) -> Result<CommandLine, RunError> {
        if !input.is_file() {
            return Err(RunError::MissingInput(input.to_path_buf()));
        }
        let command = build_conversion_command(&self.obabel()?, input, output, &self.conversion);
        info!("Converting {} to {}", input.display(), output.display());
        self.run(&command, output)?;
        Ok(command)
    }

    /// The receptor's `.pdbqt`, converted from its `.pdb` when absent
    pub fn ensure_receptor_pdbqt(&mut self, receptor: &str) -> Result<PathBuf, RunError> {
        let pdbqt = self.namer.receptor_pdbqt(receptor);
        if !pdbqt.is_file() {
            let pdb = self.namer.receptor_pdb(receptor);
            self.convert(&pdb, &pdbqt)?;
        }
        Ok(pdbqt)
    }

    /// A ligand's `.pdbqt`, converted from `<ligand>.<format>` when absent
    pub fn ensure_ligand_pdbqt(&mut self, ligand: &Path, format: &str) -> Result<PathBuf, RunError> {
        let pdbqt = with_extension(ligand, PDBQT_EXTENSION);
        if !pdbqt.is_file() {
            let source = with_extension(ligand, format);
            self.convert(&source, &pdbqt)?;
        }
        Ok(pdbqt)
    }

    /// Validate a job and build its command without running anything
    pub fn plan_dock(&self, job: &mut JobConfig) -> Result<DockPlanning, RunError> {
        job.flexibles = self.flexibles.clone();
        let plan = match job.prepare(&self.namer, &self.tables)? {
            Preparation::Ready(plan) => plan,
            Preparation::Skipped(warning) => return Ok(DockPlanning::Skipped(warning)),
        };
        let paths = DockPaths::for_plan(&plan, &self.smina()?, &self.namer);
        let command = build_dock_command(&plan, &paths, &self.translator)?;
        Ok(DockPlanning::Ready(PlannedDock {
            plan,
            paths,
            command,
        }))
    }

    /// Dock one ligand and record its poses.
    ///
    /// Flexible mode without residues is not an error: the job drops back
    /// to rigid mode and this run is reported as skipped.
    pub fn dock(&mut self, job: &mut JobConfig) -> Result<DockOutcome, RunError> {
        let planned = match self.plan_dock(job)? {
            DockPlanning::Ready(planned) => planned,
            DockPlanning::Skipped(warning) => return Ok(DockOutcome::Skipped(warning.to_string())),
        };
        let PlannedDock {
            plan,
            paths,
            command,
        } = planned;

        self.ensure_receptor_pdbqt(&plan.receptor)?;
        info!("Docking {} into {}", plan.ligand_name, plan.receptor);
        self.run(&command, &paths.output)?;

        if let Some(log) = &paths.log {
            self.append_parameters(log, &command, &paths.config)?;
        }

        let text = fs::read_to_string(&paths.output)?;
        let set = PoseSet::from_artifact(&paths.output, &text)?;
        let poses = set.poses.len();
        let best_affinity = set
            .poses
            .iter()
            .map(|p| p.affinity)
            .fold(None, |best: Option<f64>, a| Some(best.map_or(a, |b| b.min(a))));
        let label = set.label.clone();

        let merged_flexres = match &paths.flex_output {
            Some(raw) => Some(self.merge_flex_output(raw, &plan)?),
            None => None,
        };
        self.results.insert(set);

        Ok(DockOutcome::Completed(DockReport {
            label,
            command: command.to_string(),
            output: paths.output,
            poses,
            best_affinity,
            merged_flexres,
            log: paths.log,
        }))
    }

    /// The stem a ligand file docks under, converted to `.pdbqt` first
    /// when it comes in another format
    pub fn prepare_ligand(&mut self, file: &Path) -> Result<PathBuf, RunError> {
        let (stem, format) = ligand_stem(file);
        if let Some(format) = format {
            self.ensure_ligand_pdbqt(&stem, &format)?;
        }
        Ok(stem)
    }

    /// Dock every ligand file in `ligands` in order.
    ///
    /// A ligand that fails to convert or dock is logged and skipped; the
    /// rest still run.
    pub fn dock_batch(&mut self, job: &mut JobConfig, ligands: &[PathBuf]) -> Vec<BatchEntry> {
        self.multirun = ligands.iter().map(|l| ligand_stem(l).0).collect();
        let mut entries = Vec::with_capacity(ligands.len());
        for ligand in ligands {
            let result = self.prepare_ligand(ligand).and_then(|stem| {
                job.ligand = stem;
                self.dock(job)
            });
            if let Err(e) = &result {
                warn!("Skipping {}: {}", ligand.display(), e);
            }
            entries.push(BatchEntry {
                ligand: ligand.clone(),
                result,
            });
        }
        entries
    }

    fn merge_flex_output(&mut self, raw: &Path, plan: &DockPlan) -> Result<PathBuf, RunError> {
        if !raw.is_file() {
            return Err(RunError::MissingInput(raw.to_path_buf()));
        }
        let merged = self.namer.merged_flexres(&plan.ligand_name, plan.suffix());
        fs::write(&merged, merge_flexres(&fs::read_to_string(raw)?))?;
        debug!("Merged flexible residues into {}", merged.display());
        Ok(merged)
    }

    /// Append the command line and box configuration to a docking log
    fn append_parameters(
        &self,
        log: &Path,
        command: &CommandLine,
        config: &Path,
    ) -> Result<(), RunError> {
        if !log.is_file() {
            warn!("Could not find {}", log.display());
            return Ok(());
        }
        let config_text = fs::read_to_string(config)?;
        let mut file = OpenOptions::new().append(true).open(log)?;
        write!(file, "Parameters : \n{}\n{}", command, config_text)?;
        Ok(())
    }

    /// The `.pdbqt` of a current pose, ligand only.
    ///
    /// A pose of a loaded docking output is written from its model block.
    /// Any other pose is converted from `<pose>.pdb` when absent. Flexible
    /// residues saved with the pose are cut off.
    fn pose_input(&mut self, pose: &str) -> Result<PathBuf, RunError> {
        let pdbqt = self.namer.pose_pdbqt(pose);
        if let Some((source, model)) = self.results.pose_source(pose) {
            let body = extract_model(&fs::read_to_string(&source)?, model)
                .ok_or_else(|| RunError::MissingInput(source.clone()))?;
            debug!("Writing model {} of {} to {}", model, source.display(), pdbqt.display());
            fs::write(&pdbqt, body)?;
        } else if !pdbqt.is_file() {
            let pdb = self.namer.workdir.join(format!("{}.pdb", pose));
            self.convert(&pdb, &pdbqt)?;
        }
        if let Some(ligand) = strip_ligand_flexres(&fs::read_to_string(&pdbqt)?) {
            debug!("Removing flexible residues from {}", pdbqt.display());
            fs::write(&pdbqt, ligand)?;
        }
        Ok(pdbqt)
    }

    fn require_config(&self, receptor: &str) -> Result<(), RunError> {
        if receptor.trim().is_empty() {
            return Err(JobError::NoReceptor.into());
        }
        if !self.namer.config(receptor).is_file() {
            return Err(JobError::MissingConfig {
                receptor: receptor.to_string(),
                dir: self.namer.workdir.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Build the refinement command of every current pose
    pub fn plan_refine(
        &self,
        receptor: &str,
        refine: &RefineConfig,
    ) -> Result<Vec<PlannedPose>, RunError> {
        let poses = self.results.current_poses();
        if poses.is_empty() {
            return Err(RunError::NoPoses);
        }
        let kind = refine.output_kind()?;
        self.require_config(receptor)?;
        let scoring_table = self.tables.resolve(&refine.scoring)?;
        let smina = self.smina()?;

        poses
            .into_iter()
            .map(|pose| -> Result<PlannedPose, RunError> {
                let paths = RefinePaths::for_refinement(
                    refine,
                    kind,
                    &smina,
                    receptor,
                    &pose,
                    &self.namer,
                    scoring_table.clone(),
                );
                let command = build_refine_command(refine, &paths, &self.translator)?;
                Ok(PlannedPose {
                    pose,
                    paths,
                    command,
                })
            })
            .collect()
    }

    /// Refine every current pose against `receptor`.
    ///
    /// Each output's affinity is appended to the refinement table.
    pub fn refine(
        &mut self,
        receptor: &str,
        refine: &RefineConfig,
    ) -> Result<Vec<PoseReport>, RunError> {
        let planned = self.plan_refine(receptor, refine)?;
        self.ensure_receptor_pdbqt(receptor)?;

        let mut reports = Vec::with_capacity(planned.len());
        for PlannedPose {
            pose,
            paths,
            command,
        } in planned
        {
            self.pose_input(&pose)?;
            info!("Refining {}", pose);
            self.run(&command, &paths.output)?;

            if let Some(log) = &paths.log {
                if log.is_file() {
                    let mut file = OpenOptions::new().append(true).open(log)?;
                    write!(file, "{}", command)?;
                } else {
                    warn!("Could not find {}", log.display());
                }
            }

            let text = fs::read_to_string(&paths.output)?;
            let affinity = self
                .results
                .refinements
                .push_artifact(&paths.output, &text)?
                .affinity;
            reports.push(PoseReport {
                pose,
                command: command.to_string(),
                output: paths.output,
                affinity,
            });
        }
        Ok(reports)
    }

    /// Build the score-only command of every current pose
    pub fn plan_score(&self, request: &ScoreRequest) -> Result<Vec<PlannedPose>, RunError> {
        let poses = self.results.current_poses();
        if poses.is_empty() {
            return Err(RunError::NoPoses);
        }
        if request.receptor.trim().is_empty() {
            return Err(JobError::NoReceptor.into());
        }
        let scoring_table = self.tables.resolve(&request.scoring)?;
        let smina = self.smina()?;

        poses
            .into_iter()
            .map(|pose| -> Result<PlannedPose, RunError> {
                let paths = RefinePaths::for_scoring(
                    &smina,
                    &request.receptor,
                    &pose,
                    request.suffix.as_deref(),
                    &self.namer,
                    scoring_table.clone(),
                );
                let command = build_score_command(&paths, &self.translator)?;
                Ok(PlannedPose {
                    pose,
                    paths,
                    command,
                })
            })
            .collect()
    }

    /// Score every current pose in place
    pub fn score(&mut self, request: &ScoreRequest) -> Result<Vec<PoseReport>, RunError> {
        let planned = self.plan_score(request)?;
        self.ensure_receptor_pdbqt(&request.receptor)?;

        let mut reports = Vec::with_capacity(planned.len());
        for PlannedPose {
            pose,
            paths,
            command,
        } in planned
        {
            self.pose_input(&pose)?;
            self.run(&command, &paths.output)?;

            let affinity = parse_affinity(&fs::read_to_string(&paths.output)?)?;
            info!("Affinity for {} : {}", pose, affinity);
            reports.push(PoseReport {
                pose,
                command: command.to_string(),
                output: paths.output,
                affinity,
            });
        }
        Ok(reports)
    }

    /// Read a docking output produced elsewhere into the result sets
    pub fn load_results(&mut self, path: &Path) -> Result<&mut PoseSet, RunError> {
        let set = PoseSet::from_artifact(path, &fs::read_to_string(path)?)?;
        Ok(self.results.insert(set))
    }

    /// Read a refined output produced elsewhere into the refinement table
    pub fn load_refined(&mut self, path: &Path) -> Result<f64, RunError> {
        let text = fs::read_to_string(path)?;
        Ok(self.results.refinements.push_artifact(path, &text)?.affinity)
    }

    /// Export the result set `label` to `<label>.csv`
    pub fn export_results(&self, label: &str) -> Result<PathBuf, RunError> {
        let set = self
            .results
            .get(label)
            .ok_or_else(|| RunError::MissingInput(PathBuf::from(label)))?;
        let path = self.namer.results_csv(label);
        export_pose_set(set, &path)?;
        info!("Wrote results for docking as {}", path.display());
        Ok(path)
    }

    /// Export the refinement table to `minimization.csv`
    pub fn export_refinements(&self) -> Result<PathBuf, RunError> {
        let path = self.namer.refinement_csv();
        export_refinements(&self.results.refinements, &path)?;
        info!("Wrote results of refinement as {}", path.display());
        Ok(path)
    }
}

fn configured(value: &str, key: &'static str) -> Result<PathBuf, RunError> {
    match value.trim() {
        "" => Err(RunError::NotConfigured(key)),
        path => Ok(PathBuf::from(path)),
    }
}

/// Split a ligand file into its stem and, unless already `.pdbqt`, its format
pub fn ligand_stem(path: &Path) -> (PathBuf, Option<String>) {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext == PDBQT_EXTENSION => (path.with_extension(""), None),
        Some(ext) => (path.with_extension(""), Some(ext.to_string())),
        None => (path.to_path_buf(), None),
    }
}

/// `<stem>.<ext>`, keeping any dots already in the stem
fn with_extension(stem: &Path, ext: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
