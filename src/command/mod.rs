//! Command lines for smina and Open Babel
//!
//! Builders only assemble tokens. Quoting happens once, when a
//! [`CommandLine`] is displayed, and the process runner passes the tokens to
//! the OS as separate arguments without any shell in between.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::job::{ConversionOptions, DockPlan, Protonation, RefineConfig};
use crate::naming::{ArtifactNamer, RefineKind, PDBQT_EXTENSION};
use crate::paths::{PathError, PathTranslator};

/// One external invocation as a program and its argument tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    /// Wrapper the program runs under, e.g. `wsl`
    pub launcher: Option<String>,
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            launcher: None,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_launcher(mut self, launcher: Option<&str>) -> Self {
        self.launcher = launcher.map(str::to_string);
        self
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// A flag followed by its value
    pub fn opt(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.arg(flag).arg(value)
    }

    /// All tokens in execution order, launcher first
    pub fn tokens(&self) -> Vec<&str> {
        self.launcher
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.program.as_str()))
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Whether `flag` appears among the arguments
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// The token following `flag`, if present
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }
}

fn needs_quoting(token: &str) -> bool {
    token.is_empty()
        || token
            .chars()
            .any(|c| c.is_whitespace() || "'\"\\$`&|;<>()*?!#~{}[]".contains(c))
}

/// Quote a token for display in a POSIX shell
pub fn quote_token(token: &str) -> String {
    if needs_quoting(token) {
        format!("'{}'", token.replace('\'', r"'\''"))
    } else {
        token.to_string()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.tokens().into_iter().map(quote_token).collect();
        f.write_str(&quoted.join(" "))
    }
}

/// `<stem>.pdbqt`
fn pdbqt(stem: &Path) -> PathBuf {
    let mut name = stem.as_os_str().to_os_string();
    name.push(".");
    name.push(PDBQT_EXTENSION);
    PathBuf::from(name)
}

/// Host paths of everything a docking run touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockPaths {
    pub smina: PathBuf,
    pub receptor: PathBuf,
    /// Ligand path without the `.pdbqt` extension
    pub ligand: PathBuf,
    pub config: PathBuf,
    pub output: PathBuf,
    pub flex_output: Option<PathBuf>,
    pub log: Option<PathBuf>,
}

impl DockPaths {
    /// Lay out the files of `plan` in the namer's working directory
    pub fn for_plan(plan: &DockPlan, smina: &Path, namer: &ArtifactNamer) -> Self {
        let suffix = plan.suffix();
        Self {
            smina: smina.to_path_buf(),
            receptor: namer.receptor_pdbqt(&plan.receptor),
            ligand: plan.ligand.clone(),
            config: namer.config(&plan.receptor),
            output: namer.docked(&plan.ligand_name, suffix),
            flex_output: plan
                .flexres
                .as_ref()
                .map(|_| namer.flexres(&plan.ligand_name, suffix)),
            log: plan
                .write_log
                .then(|| namer.dock_log(&plan.receptor, &plan.ligand_name, suffix)),
        }
    }
}

/// Build the smina docking command.
///
/// Token order is fixed: receptor, ligand, config, output, hydrogen
/// flexibility, exhaustiveness and mode count, then flexible residues, seed,
/// custom scoring and log, each only when set.
pub fn build_dock_command(
    plan: &DockPlan,
    paths: &DockPaths,
    translator: &PathTranslator,
) -> Result<CommandLine, PathError> {
    let mut cmd = CommandLine::new(translator.translate(&paths.smina)?)
        .with_launcher(translator.launcher());

    cmd.opt("-r", translator.translate(&paths.receptor)?)
        .opt("-l", translator.translate(&pdbqt(&paths.ligand))?)
        .opt("--config", translator.translate(&paths.config)?)
        .opt("-o", translator.translate(&paths.output)?)
        .arg("--flex_hydrogens")
        .opt("--exhaustiveness", plan.exhaustiveness.to_string())
        .opt("--num_modes", plan.num_modes.to_string());

    if let (Some(flexres), Some(flex_output)) = (&plan.flexres, &paths.flex_output) {
        cmd.opt("--flexres", flexres.replace(' ', ""))
            .opt("--out_flex", translator.translate(flex_output)?);
    }

    if let Some(seed) = plan.seed {
        cmd.opt("--seed", seed.to_string());
    }

    if let Some(table) = &plan.scoring_table {
        cmd.opt("--custom_scoring", translator.translate(table)?);
    }

    if let (true, Some(log)) = (plan.write_log, &paths.log) {
        cmd.opt("--log", translator.translate(log)?);
    }

    Ok(cmd)
}

/// Host paths of a refinement or scoring run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefinePaths {
    pub smina: PathBuf,
    pub receptor: PathBuf,
    /// Pose path without the `.pdbqt` extension
    pub pose: PathBuf,
    pub config: PathBuf,
    pub output: PathBuf,
    pub log: Option<PathBuf>,
    pub scoring_table: Option<PathBuf>,
}

impl RefinePaths {
    /// Lay out a refinement of `pose` against `receptor`
    pub fn for_refinement(
        refine: &RefineConfig,
        kind: RefineKind,
        smina: &Path,
        receptor: &str,
        pose: &str,
        namer: &ArtifactNamer,
        scoring_table: Option<PathBuf>,
    ) -> Self {
        let output = namer.refined(pose, kind);
        Self {
            smina: smina.to_path_buf(),
            receptor: namer.receptor_pdbqt(receptor),
            pose: namer.workdir.join(pose),
            config: namer.config(receptor),
            log: refine.write_log.then(|| namer.log_for(&output)),
            output,
            scoring_table,
        }
    }

    /// Lay out a score-only evaluation of `pose`
    pub fn for_scoring(
        smina: &Path,
        receptor: &str,
        pose: &str,
        suffix: Option<&str>,
        namer: &ArtifactNamer,
        scoring_table: Option<PathBuf>,
    ) -> Self {
        Self {
            smina: smina.to_path_buf(),
            receptor: namer.receptor_pdbqt(receptor),
            pose: namer.workdir.join(pose),
            config: namer.config(receptor),
            output: namer.scored(pose, suffix),
            log: None,
            scoring_table,
        }
    }
}

/// Build a post-refinement command.
///
/// Local docking replaces the receptor box with one drawn around the pose
/// (`--autobox_ligand`, padded by `--autobox_add`); otherwise the receptor
/// config supplies the box. Randomisation and minimisation flags follow, then
/// the single output, custom scoring and log.
pub fn build_refine_command(
    refine: &RefineConfig,
    paths: &RefinePaths,
    translator: &PathTranslator,
) -> Result<CommandLine, PathError> {
    let pose = translator.translate(&pdbqt(&paths.pose))?;
    let mut cmd = CommandLine::new(translator.translate(&paths.smina)?)
        .with_launcher(translator.launcher());

    cmd.opt("-r", translator.translate(&paths.receptor)?)
        .opt("-l", pose.clone());

    match &refine.local_dock {
        Some(local) => {
            cmd.arg("--local_only")
                .opt("--autobox_ligand", pose)
                .opt("--autobox_add", local.autobox_add.to_string());
        }
        None => {
            cmd.opt("--config", translator.translate(&paths.config)?);
        }
    }

    if refine.randomize {
        cmd.arg("--randomized_only");
    }

    if let Some(minimize) = &refine.minimize {
        cmd.arg("--minimize")
            .opt("--approximation", minimize.approximation.as_str());
        if minimize.accurate_line {
            cmd.arg("--accurate_line");
        }
        if minimize.early_term {
            cmd.arg("--minimize_early_term");
        }
        if let Some(iterations) = minimize.iterations {
            cmd.opt("--minimize_iters", iterations.to_string());
        }
        if let Some(factor) = minimize.factor {
            cmd.opt("--factor", factor.to_string());
        }
        if let Some(force_cap) = minimize.force_cap {
            cmd.opt("--force_cap", force_cap.to_string());
        }
    }

    cmd.opt("-o", translator.translate(&paths.output)?);

    if let Some(table) = &paths.scoring_table {
        cmd.opt("--custom_scoring", translator.translate(table)?);
    }

    if let (true, Some(log)) = (refine.write_log, &paths.log) {
        cmd.opt("--log", translator.translate(log)?);
    }

    Ok(cmd)
}

/// Build a score-only command: no box, no search
pub fn build_score_command(
    paths: &RefinePaths,
    translator: &PathTranslator,
) -> Result<CommandLine, PathError> {
    let mut cmd = CommandLine::new(translator.translate(&paths.smina)?)
        .with_launcher(translator.launcher());

    cmd.opt("-r", translator.translate(&paths.receptor)?)
        .opt("-l", translator.translate(&pdbqt(&paths.pose))?)
        .arg("--score_only")
        .opt("-o", translator.translate(&paths.output)?);

    if let Some(table) = &paths.scoring_table {
        cmd.opt("--custom_scoring", translator.translate(table)?);
    }

    Ok(cmd)
}

/// Build an Open Babel conversion to `.pdbqt`.
///
/// Open Babel runs on the host, so paths are used as they are.
pub fn build_conversion_command(
    obabel: &Path,
    input: &Path,
    output: &Path,
    options: &ConversionOptions,
) -> CommandLine {
    let mut cmd = CommandLine::new(obabel.to_string_lossy());
    cmd.arg(input.to_string_lossy())
        .opt("-O", output.to_string_lossy())
        .opt("--partialcharge", options.charge_model.as_str());

    match options.protonation {
        Protonation::Ph(ph) => cmd.opt("-p", format!("{:.1}", ph)),
        Protonation::AddHydrogens => cmd.arg("-h"),
    };

    cmd
}
