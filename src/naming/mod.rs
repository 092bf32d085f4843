//! Names of the files a docking session reads and produces
//!
//! Every name is derived from the ligand or pose stem, the optional output
//! suffix and the kind of run, and lives in one working directory. Two runs
//! with the same inputs get the same names and overwrite each other's output.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extension of docking inputs and outputs
pub const PDBQT_EXTENSION: &str = "pdbqt";

/// Stem suffix smina's docking output carries
pub const DOCKED_SUFFIX: &str = "_docked";

/// The post-refinement operations, each with its own output name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefineKind {
    LocalDock,
    Randomize,
    Minimize,
}

impl RefineKind {
    /// Suffix appended to the pose stem
    pub fn suffix(&self) -> &'static str {
        match self {
            RefineKind::LocalDock => "_localdocked",
            RefineKind::Randomize => "_randomize",
            RefineKind::Minimize => "_minimized",
        }
    }

    /// Which output a combination of refinement flags writes to.
    ///
    /// Minimisation composes with local docking or randomisation and then
    /// shares their output. When local docking and randomisation are both
    /// requested the randomised output wins. `None` if nothing is selected.
    pub fn output_kind(local_dock: bool, randomize: bool, minimize: bool) -> Option<Self> {
        if randomize {
            Some(RefineKind::Randomize)
        } else if local_dock {
            Some(RefineKind::LocalDock)
        } else if minimize {
            Some(RefineKind::Minimize)
        } else {
            None
        }
    }

    /// Recognise a refined result by its label
    pub fn from_label(label: &str) -> Option<Self> {
        [RefineKind::LocalDock, RefineKind::Randomize, RefineKind::Minimize]
            .into_iter()
            .find(|kind| label.ends_with(kind.suffix()))
    }
}

fn with_suffix(stem: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(s) if !s.is_empty() => format!("{}_{}", stem, s),
        _ => stem.to_string(),
    }
}

/// Derives every artifact path relative to one working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNamer {
    pub workdir: PathBuf,
}

impl ArtifactNamer {
    pub fn new<P: AsRef<Path>>(workdir: P) -> Self {
        Self {
            workdir: workdir.as_ref().to_path_buf(),
        }
    }

    fn file(&self, name: String) -> PathBuf {
        self.workdir.join(name)
    }

    /// `<receptor>_config.txt`
    pub fn config(&self, receptor: &str) -> PathBuf {
        self.file(format!("{}_config.txt", receptor))
    }

    /// `<receptor>.pdbqt`
    pub fn receptor_pdbqt(&self, receptor: &str) -> PathBuf {
        self.file(format!("{}.{}", receptor, PDBQT_EXTENSION))
    }

    /// `<receptor>.pdb`, the input the receptor `.pdbqt` is converted from
    pub fn receptor_pdb(&self, receptor: &str) -> PathBuf {
        self.file(format!("{}.pdb", receptor))
    }

    /// `<ligand>[_<suffix>]_docked.pdbqt`
    pub fn docked(&self, ligand: &str, suffix: Option<&str>) -> PathBuf {
        self.file(format!(
            "{}{}.{}",
            with_suffix(ligand, suffix),
            DOCKED_SUFFIX,
            PDBQT_EXTENSION
        ))
    }

    /// `<ligand>[_<suffix>]_flexres.pdbqt`, smina's raw flexible residue output
    pub fn flexres(&self, ligand: &str, suffix: Option<&str>) -> PathBuf {
        self.file(format!(
            "{}_flexres.{}",
            with_suffix(ligand, suffix),
            PDBQT_EXTENSION
        ))
    }

    /// `<ligand>[_<suffix>]_flexres_merged.pdbqt`
    pub fn merged_flexres(&self, ligand: &str, suffix: Option<&str>) -> PathBuf {
        self.file(format!(
            "{}_flexres_merged.{}",
            with_suffix(ligand, suffix),
            PDBQT_EXTENSION
        ))
    }

    /// `<receptor>_<ligand>[_<suffix>].log`
    pub fn dock_log(&self, receptor: &str, ligand: &str, suffix: Option<&str>) -> PathBuf {
        self.file(format!(
            "{}.log",
            with_suffix(&format!("{}_{}", receptor, ligand), suffix)
        ))
    }

    /// `<pose>.pdbqt`, the input of a refinement or scoring run
    pub fn pose_pdbqt(&self, pose: &str) -> PathBuf {
        self.file(format!("{}.{}", pose, PDBQT_EXTENSION))
    }

    /// `<pose>_localdocked.pdbqt`, `<pose>_randomize.pdbqt` or `<pose>_minimized.pdbqt`
    pub fn refined(&self, pose: &str, kind: RefineKind) -> PathBuf {
        self.file(format!("{}{}.{}", pose, kind.suffix(), PDBQT_EXTENSION))
    }

    /// `<pose>_scored[_<suffix>].pdbqt`
    pub fn scored(&self, pose: &str, suffix: Option<&str>) -> PathBuf {
        self.file(format!(
            "{}.{}",
            with_suffix(&format!("{}_scored", pose), suffix),
            PDBQT_EXTENSION
        ))
    }

    /// The log written next to `artifact`: same stem, `.log` extension
    pub fn log_for(&self, artifact: &Path) -> PathBuf {
        artifact.with_extension("log")
    }

    /// CSV export of one result set
    pub fn results_csv(&self, label: &str) -> PathBuf {
        self.file(format!("{}.csv", label))
    }

    /// CSV export of the post-refinement table
    pub fn refinement_csv(&self) -> PathBuf {
        self.file("minimization.csv".to_string())
    }
}

/// Host object name of one materialized pose: `pose<model>_<label>`
pub fn pose_object(model: u32, label: &str) -> String {
    format!("pose{}_{}", model, label)
}

/// The result-set label of an output file.
///
/// Docking outputs drop their `_docked` suffix, anything else keeps its stem.
pub fn result_label(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.strip_suffix(DOCKED_SUFFIX) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(path: PathBuf) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn test_docking_names() {
        let namer = ArtifactNamer::new("/work");
        assert_eq!(name(namer.docked("lig1", None)), "lig1_docked.pdbqt");
        assert_eq!(name(namer.docked("lig1", Some("run2"))), "lig1_run2_docked.pdbqt");
        assert_eq!(name(namer.docked("lig1", Some(""))), "lig1_docked.pdbqt");
        assert_eq!(name(namer.flexres("lig1", Some("run2"))), "lig1_run2_flexres.pdbqt");
        assert_eq!(
            name(namer.merged_flexres("lig1", None)),
            "lig1_flexres_merged.pdbqt"
        );
        assert_eq!(name(namer.dock_log("1abc", "lig1", Some("x"))), "1abc_lig1_x.log");
        assert_eq!(namer.config("1abc"), PathBuf::from("/work/1abc_config.txt"));
    }

    #[test]
    fn test_names_are_stable_and_distinct() {
        let namer = ArtifactNamer::new("/work");
        assert_eq!(namer.docked("a", Some("s")), namer.docked("a", Some("s")));
        assert_ne!(namer.docked("a", Some("s")), namer.docked("b", Some("s")));
        assert_ne!(namer.docked("a", Some("s")), namer.docked("a", Some("t")));
        assert_ne!(namer.docked("a", None), namer.flexres("a", None));
    }

    #[test]
    fn test_refinement_names() {
        let namer = ArtifactNamer::new("/work");
        assert_eq!(
            name(namer.refined("pose1_lig1", RefineKind::LocalDock)),
            "pose1_lig1_localdocked.pdbqt"
        );
        assert_eq!(
            name(namer.refined("pose1_lig1", RefineKind::Randomize)),
            "pose1_lig1_randomize.pdbqt"
        );
        assert_eq!(name(namer.scored("pose1_lig1", Some("v2"))), "pose1_lig1_scored_v2.pdbqt");

        let minimized = namer.refined("pose1_lig1", RefineKind::Minimize);
        assert_eq!(namer.log_for(&minimized), PathBuf::from("/work/pose1_lig1_minimized.log"));
    }

    #[test]
    fn test_output_kind_compositing() {
        use RefineKind::*;
        assert_eq!(RefineKind::output_kind(false, false, true), Some(Minimize));
        assert_eq!(RefineKind::output_kind(true, false, true), Some(LocalDock));
        assert_eq!(RefineKind::output_kind(false, true, true), Some(Randomize));
        assert_eq!(RefineKind::output_kind(true, true, false), Some(Randomize));
        assert_eq!(RefineKind::output_kind(false, false, false), None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(result_label(Path::new("/w/lig1_run2_docked.pdbqt")), "lig1_run2");
        assert_eq!(
            result_label(Path::new("/w/pose1_lig1_minimized.pdbqt")),
            "pose1_lig1_minimized"
        );
        assert_eq!(pose_object(3, "lig1"), "pose3_lig1");
        assert_eq!(RefineKind::from_label("pose1_lig1_localdocked"), Some(RefineKind::LocalDock));
        assert_eq!(RefineKind::from_label("lig1"), None);
    }
}
