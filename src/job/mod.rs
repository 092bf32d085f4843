//! Docking, refinement and conversion job settings, and their validation

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::flex::FlexibleResidueSpec;
use crate::naming::{ArtifactNamer, RefineKind};
use crate::scoring::{ScoringChoice, ScoringError, ScoringLibrary};

/// Default search exhaustiveness
pub const DEFAULT_EXHAUSTIVENESS: u32 = 8;

/// Default number of output poses
pub const DEFAULT_NUM_MODES: u32 = 9;

/// Default padding around the ligand for local docking, in Angstroms
pub const DEFAULT_AUTOBOX_ADD: u32 = 4;

/// Default pH when protonating for a given pH
pub const DEFAULT_PH: f64 = 7.0;

/// Errors that stop a job before any command is built
#[derive(Error, Debug)]
pub enum JobError {
    #[error("No receptor selected")]
    NoReceptor,

    #[error("No ligand selected")]
    NoLigand,

    #[error("Could not find {receptor}_config.txt in {}", .dir.display())]
    MissingConfig { receptor: String, dir: PathBuf },

    #[error("Invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("No post-refinement method selected")]
    NoRefinementSelected,

    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Rigid receptor or flexible side chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DockingMode {
    #[default]
    Rigid,
    Flexible,
}

/// Raised instead of an error when flexible docking is requested without any
/// flexible residues. The run is skipped and the job falls back to rigid mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlexibleFallbackWarning {
    pub receptor: String,
    pub ligand: String,
}

impl fmt::Display for FlexibleFallbackWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No flexibles selected for {} / {}: switched to rigid side chains",
            self.receptor, self.ligand
        )
    }
}

/// Everything a single docking run is configured with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Receptor object name; files are `<receptor>.pdbqt` and `<receptor>_config.txt`
    pub receptor: String,

    /// Ligand path without extension
    pub ligand: PathBuf,

    pub mode: DockingMode,
    pub flexibles: FlexibleResidueSpec,
    pub scoring: ScoringChoice,
    pub exhaustiveness: u32,
    pub num_modes: u32,

    /// Fixed random seed; `None` lets smina pick one
    pub seed: Option<i64>,

    /// Extra tag inserted into every output name
    pub suffix: Option<String>,

    /// Ask smina for a log file
    pub write_log: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            receptor: String::new(),
            ligand: PathBuf::new(),
            mode: DockingMode::Rigid,
            flexibles: FlexibleResidueSpec::default(),
            scoring: ScoringChoice::Vina,
            exhaustiveness: DEFAULT_EXHAUSTIVENESS,
            num_modes: DEFAULT_NUM_MODES,
            seed: None,
            suffix: None,
            write_log: false,
        }
    }
}

/// A validated docking run, ready to be turned into a command line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DockPlan {
    pub receptor: String,
    pub ligand: PathBuf,
    pub ligand_name: String,

    /// `chain:resi` list; present only in flexible mode
    pub flexres: Option<String>,

    /// Custom scoring table file; `None` for the built-in table
    pub scoring_table: Option<PathBuf>,
    pub exhaustiveness: u32,
    pub num_modes: u32,
    pub seed: Option<i64>,
    pub suffix: Option<String>,
    pub write_log: bool,
}

impl DockPlan {
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref().filter(|s| !s.is_empty())
    }
}

/// Outcome of preparing a job
#[derive(Debug, Clone, PartialEq)]
pub enum Preparation {
    Ready(DockPlan),
    Skipped(FlexibleFallbackWarning),
}

impl JobConfig {
    /// File name of the ligand, without directory or extension
    pub fn ligand_name(&self) -> String {
        self.ligand
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Validate the job and resolve what it refers to.
    ///
    /// Flexible mode with no residues does not fail: the mode is reset to
    /// [`DockingMode::Rigid`] and the run is reported as skipped.
    pub fn prepare(
        &mut self,
        namer: &ArtifactNamer,
        tables: &ScoringLibrary,
    ) -> Result<Preparation, JobError> {
        let receptor = self.receptor.trim().to_string();
        if receptor.is_empty() {
            return Err(JobError::NoReceptor);
        }

        let ligand_name = self.ligand_name();
        if ligand_name.is_empty() {
            return Err(JobError::NoLigand);
        }

        if !namer.config(&receptor).is_file() {
            return Err(JobError::MissingConfig {
                receptor,
                dir: namer.workdir.clone(),
            });
        }

        check_positive("exhaustiveness", self.exhaustiveness)?;
        check_positive("num_modes", self.num_modes)?;

        let scoring_table = tables.resolve(&self.scoring)?;

        let mode = self.mode;
        let flexres = match mode {
            DockingMode::Rigid => None,
            DockingMode::Flexible if self.flexibles.is_empty() => {
                self.mode = DockingMode::Rigid;
                let warning = FlexibleFallbackWarning {
                    receptor,
                    ligand: ligand_name,
                };
                warn!("{}", warning);
                return Ok(Preparation::Skipped(warning));
            }
            DockingMode::Flexible => Some(self.flexibles.flexres_arg()),
        };

        Ok(Preparation::Ready(DockPlan {
            receptor,
            ligand: self.ligand.clone(),
            ligand_name,
            flexres,
            scoring_table,
            exhaustiveness: self.exhaustiveness,
            num_modes: self.num_modes,
            seed: self.seed,
            suffix: self.suffix.clone(),
            write_log: self.write_log,
        }))
    }
}

fn check_positive(name: &'static str, value: u32) -> Result<(), JobError> {
    if value == 0 {
        return Err(JobError::InvalidParameter {
            name,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Parse a seed as typed by the user.
///
/// Accepts integers, and floats with no fractional part as a spin box reports them.
pub fn parse_seed(text: &str) -> Result<i64, JobError> {
    let text = text.trim();
    let invalid = || JobError::InvalidParameter {
        name: "seed",
        value: text.to_string(),
    };

    let integral = match text.split_once('.') {
        Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole,
        _ => text,
    };
    if let Ok(seed) = integral.parse::<i128>() {
        return i64::try_from(seed).map_err(|_| invalid());
    }

    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    let value = text.parse::<f64>().map_err(|_| invalid())?;
    if value.fract() != 0.0 || value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(invalid());
    }
    Ok(value as i64)
}

/// Line-search approximation used by smina's minimiser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approximation {
    #[default]
    Linear,
    Spline,
    Exact,
}

impl Approximation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Approximation::Linear => "linear",
            Approximation::Spline => "spline",
            Approximation::Exact => "exact",
        }
    }
}

impl fmt::Display for Approximation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Approximation {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "linear" => Ok(Approximation::Linear),
            "spline" => Ok(Approximation::Spline),
            "exact" => Ok(Approximation::Exact),
            other => Err(JobError::InvalidParameter {
                name: "approximation",
                value: other.to_string(),
            }),
        }
    }
}

/// Minimisation settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MinimizeOptions {
    pub approximation: Approximation,
    pub accurate_line: bool,
    pub early_term: bool,
    pub iterations: Option<u32>,
    pub factor: Option<u32>,
    pub force_cap: Option<u32>,
}

/// Re-docking confined to a box around the pose itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDock {
    /// Padding added around the ligand, in Angstroms
    pub autobox_add: u32,
}

impl Default for LocalDock {
    fn default() -> Self {
        Self {
            autobox_add: DEFAULT_AUTOBOX_ADD,
        }
    }
}

/// Post-refinement of an existing pose
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RefineConfig {
    pub local_dock: Option<LocalDock>,
    pub randomize: bool,
    pub minimize: Option<MinimizeOptions>,
    pub scoring: ScoringChoice,
    pub write_log: bool,
}

impl RefineConfig {
    /// The output this combination of operations writes to
    pub fn output_kind(&self) -> Result<RefineKind, JobError> {
        RefineKind::output_kind(
            self.local_dock.is_some(),
            self.randomize,
            self.minimize.is_some(),
        )
        .ok_or(JobError::NoRefinementSelected)
    }
}

/// Partial charge model for format conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeModel {
    #[default]
    Gasteiger,
}

impl ChargeModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeModel::Gasteiger => "gasteiger",
        }
    }
}

/// How hydrogens are added during format conversion
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Protonation {
    /// Add all hydrogens (`-h`)
    #[default]
    AddHydrogens,
    /// Protonate for a pH between 0 and 14 (`-p`)
    Ph(f64),
}

impl Protonation {
    pub fn ph(value: f64) -> Result<Self, JobError> {
        if !(0.0..=14.0).contains(&value) {
            return Err(JobError::InvalidParameter {
                name: "pH",
                value: value.to_string(),
            });
        }
        Ok(Protonation::Ph(value))
    }
}

/// Format conversion settings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub charge_model: ChargeModel,
    pub protonation: Protonation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flex::FlexibleResidue;
    use std::fs;

    struct Fixture {
        dir: tempfile::TempDir,
        namer: ArtifactNamer,
        tables: ScoringLibrary,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let namer = ArtifactNamer::new(dir.path());
        let tables = ScoringLibrary::new(dir.path().join("tables"));
        fs::write(namer.config("rec"), "center_x = 0\n").unwrap();
        Fixture { dir, namer, tables }
    }

    fn job() -> JobConfig {
        JobConfig {
            receptor: "rec".into(),
            ligand: PathBuf::from("/ligands/lig1"),
            ..JobConfig::default()
        }
    }

    #[test]
    fn test_rigid_job_is_ready() {
        let f = fixture();
        let mut job = job();
        match job.prepare(&f.namer, &f.tables).unwrap() {
            Preparation::Ready(plan) => {
                assert_eq!(plan.ligand_name, "lig1");
                assert_eq!(plan.flexres, None);
                assert_eq!(plan.scoring_table, None);
                assert_eq!(plan.exhaustiveness, DEFAULT_EXHAUSTIVENESS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_config_names_receptor() {
        let f = fixture();
        let mut job = JobConfig {
            receptor: "other".into(),
            ..job()
        };
        match job.prepare(&f.namer, &f.tables) {
            Err(JobError::MissingConfig { receptor, dir }) => {
                assert_eq!(receptor, "other");
                assert_eq!(dir, f.dir.path());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_identifiers_and_parameters() {
        let f = fixture();
        let mut no_receptor = JobConfig {
            receptor: " ".into(),
            ..job()
        };
        assert!(matches!(no_receptor.prepare(&f.namer, &f.tables), Err(JobError::NoReceptor)));

        let mut no_ligand = JobConfig {
            ligand: PathBuf::new(),
            ..job()
        };
        assert!(matches!(no_ligand.prepare(&f.namer, &f.tables), Err(JobError::NoLigand)));

        let mut zero = JobConfig {
            num_modes: 0,
            ..job()
        };
        assert!(matches!(
            zero.prepare(&f.namer, &f.tables),
            Err(JobError::InvalidParameter { name: "num_modes", .. })
        ));
    }

    #[test]
    fn test_flexible_without_residues_falls_back() {
        let f = fixture();
        let mut job = JobConfig {
            mode: DockingMode::Flexible,
            ..job()
        };
        let prepared = job.prepare(&f.namer, &f.tables).unwrap();
        assert!(matches!(prepared, Preparation::Skipped(ref w) if w.ligand == "lig1"));
        assert_eq!(job.mode, DockingMode::Rigid);

        // The next attempt runs rigid
        assert!(matches!(
            job.prepare(&f.namer, &f.tables).unwrap(),
            Preparation::Ready(DockPlan { flexres: None, .. })
        ));
    }

    #[test]
    fn test_flexible_with_residues() {
        let f = fixture();
        let mut job = JobConfig {
            mode: DockingMode::Flexible,
            ..job()
        };
        job.flexibles
            .add_selection([FlexibleResidue::new("A", "ARG", "12"), FlexibleResidue::new("B", "TYR", "40")]);
        match job.prepare(&f.namer, &f.tables).unwrap() {
            Preparation::Ready(plan) => assert_eq!(plan.flexres.as_deref(), Some("A:12,B:40")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_scoring_table() {
        let f = fixture();
        let mut job = JobConfig {
            scoring: ScoringChoice::from_name("missing"),
            ..job()
        };
        assert!(matches!(
            job.prepare(&f.namer, &f.tables),
            Err(JobError::Scoring(ScoringError::UnknownTable(_)))
        ));
    }

    #[test]
    fn test_seed_parsing() {
        assert_eq!(parse_seed("42").unwrap(), 42);
        assert_eq!(parse_seed("-1000.0").unwrap(), -1000);
        assert!(parse_seed("1.5").is_err());
        assert!(parse_seed("abc").is_err());
        assert!(parse_seed("1e40").is_err());
    }

    #[test]
    fn test_seed_must_fit_i64() {
        assert_eq!(parse_seed("9223372036854775807").unwrap(), i64::MAX);
        assert_eq!(parse_seed("-9223372036854775808").unwrap(), i64::MIN);
        assert!(parse_seed("9223372036854775808").is_err());
        assert!(parse_seed("-9223372036854775809").is_err());
        assert!(parse_seed("9223372036854775808.0").is_err());
        assert!(parse_seed("9.3e18").is_err());
    }

    #[test]
    fn test_refine_output_kind_and_protonation() {
        let refine = RefineConfig {
            minimize: Some(MinimizeOptions::default()),
            ..RefineConfig::default()
        };
        assert_eq!(refine.output_kind().unwrap(), RefineKind::Minimize);
        assert!(matches!(
            RefineConfig::default().output_kind(),
            Err(JobError::NoRefinementSelected)
        ));

        assert_eq!("spline".parse::<Approximation>().unwrap(), Approximation::Spline);
        assert!(Protonation::ph(7.4).is_ok());
        assert!(Protonation::ph(15.0).is_err());
    }
}
