//! Docking results: scored pose sets, the post-refinement table and the
//! working set of poses offered for refinement

pub mod parser;

pub use parser::{
    extract_model, merge_flexres, parse_affinity, parse_poses, strip_ligand_flexres, ParseError,
    PoseRecord,
};

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::io::{write_affinity_csv, IoError};
use crate::naming::{pose_object, result_label, RefineKind};

/// The scored poses of one output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSet {
    pub label: String,
    pub source: PathBuf,
    pub poses: Vec<PoseRecord>,
}

impl PoseSet {
    /// Parse an output artifact; the label comes from its file name
    pub fn from_artifact(source: &Path, text: &str) -> Result<Self, ParseError> {
        Ok(Self {
            label: result_label(source),
            source: source.to_path_buf(),
            poses: parse_poses(text)?,
        })
    }

    /// Whether this set holds refined poses rather than docking output
    pub fn is_refined(&self) -> bool {
        RefineKind::from_label(&self.label).is_some()
    }

    fn pose_mut(&mut self, model: u32) -> Option<&mut PoseRecord> {
        self.poses.iter_mut().find(|p| p.model_number == model)
    }

    /// Mark a pose as selected; `false` if the model is unknown
    pub fn select(&mut self, model: u32) -> bool {
        self.pose_mut(model).map(|p| p.selected = true).is_some()
    }

    pub fn deselect(&mut self, model: u32) -> bool {
        self.pose_mut(model).map(|p| p.selected = false).is_some()
    }

    /// Flip a pose's selection and return the new state
    pub fn toggle(&mut self, model: u32) -> Option<bool> {
        self.pose_mut(model).map(|p| {
            p.selected = !p.selected;
            p.selected
        })
    }

    pub fn selected(&self) -> impl Iterator<Item = &PoseRecord> {
        self.poses.iter().filter(|p| p.selected)
    }

    /// Host object names of the selected poses.
    ///
    /// Docking output yields one `pose<n>_<label>` per selection. A refined
    /// set is one object already and contributes its label once.
    pub fn selected_objects(&self) -> Vec<String> {
        if self.is_refined() {
            if self.selected().next().is_some() {
                vec![self.label.clone()]
            } else {
                Vec::new()
            }
        } else {
            self.selected()
                .map(|p| pose_object(p.model_number, &self.label))
                .collect()
        }
    }

    /// `model,Affinity` rows for every pose in listing order
    pub fn rows(&self) -> Vec<(String, f64)> {
        self.poses
            .iter()
            .map(|p| (p.model_number.to_string(), p.affinity))
            .collect()
    }
}

/// One refinement or scoring output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRefinementRecord {
    pub ligand_label: String,
    pub affinity: f64,
    pub selected: bool,
}

/// Results of post-refinement runs. Rows are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinementTable {
    records: Vec<PostRefinementRecord>,
}

impl RefinementTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row; new rows start selected
    pub fn push(&mut self, ligand_label: &str, affinity: f64) -> &PostRefinementRecord {
        self.records.push(PostRefinementRecord {
            ligand_label: ligand_label.to_string(),
            affinity,
            selected: true,
        });
        &self.records[self.records.len() - 1]
    }

    /// Read the affinity of a refined artifact and append it
    pub fn push_artifact(
        &mut self,
        source: &Path,
        text: &str,
    ) -> Result<&PostRefinementRecord, ParseError> {
        let affinity = parse_affinity(text)?;
        Ok(self.push(&result_label(source), affinity))
    }

    pub fn toggle(&mut self, row: usize) -> Option<bool> {
        self.records.get_mut(row).map(|r| {
            r.selected = !r.selected;
            r.selected
        })
    }

    pub fn records(&self) -> &[PostRefinementRecord] {
        &self.records
    }

    pub fn selected(&self) -> impl Iterator<Item = &PostRefinementRecord> {
        self.records.iter().filter(|r| r.selected)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn rows(&self) -> Vec<(String, f64)> {
        self.records
            .iter()
            .map(|r| (r.ligand_label.clone(), r.affinity))
            .collect()
    }
}

/// Every result a session has produced or loaded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkingSet {
    pub sets: Vec<PoseSet>,
    pub refinements: RefinementTable,

    /// Poses loaded from elsewhere, by object name
    pub loaded: Vec<String>,

    /// Offer selected result poses for refinement
    pub include_selections: bool,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self {
            include_selections: true,
            ..Self::default()
        }
    }

    /// Add a result set, replacing an earlier one with the same label
    pub fn insert(&mut self, set: PoseSet) -> &mut PoseSet {
        let idx = match self.sets.iter().position(|s| s.label == set.label) {
            Some(idx) => {
                debug!("Replacing result set {}", set.label);
                self.sets[idx] = set;
                idx
            }
            None => {
                self.sets.push(set);
                self.sets.len() - 1
            }
        };
        &mut self.sets[idx]
    }

    pub fn get(&self, label: &str) -> Option<&PoseSet> {
        self.sets.iter().find(|s| s.label == label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut PoseSet> {
        self.sets.iter_mut().find(|s| s.label == label)
    }

    /// The docking output and model number a `pose<n>_<label>` name refers to
    pub fn pose_source(&self, pose: &str) -> Option<(PathBuf, u32)> {
        self.sets
            .iter()
            .filter(|set| !set.is_refined())
            .find_map(|set| {
                set.poses
                    .iter()
                    .find(|p| pose_object(p.model_number, &set.label) == pose)
                    .map(|p| (set.source.clone(), p.model_number))
            })
    }

    /// Register a pose loaded from a file outside the result sets
    pub fn load_pose(&mut self, path: &Path) -> String {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.loaded.push(name.clone());
        name
    }

    /// The poses refinement and scoring operate on.
    ///
    /// Selections of every result set come first, in set order, then loaded
    /// poses in load order. The list is recomputed on every call.
    pub fn current_poses(&self) -> Vec<String> {
        let mut poses = Vec::new();
        if self.include_selections {
            for set in &self.sets {
                poses.extend(set.selected_objects());
            }
        }
        poses.extend(self.loaded.iter().cloned());
        poses
    }
}

fn write_rows(path: &Path, rows: &[(String, f64)]) -> Result<(), IoError> {
    write_affinity_csv(File::create(path)?, rows)?;
    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Export one result set as `model,Affinity` CSV
pub fn export_pose_set(set: &PoseSet, path: &Path) -> Result<(), IoError> {
    write_rows(path, &set.rows())
}

/// Export the post-refinement table as `model,Affinity` CSV
pub fn export_refinements(table: &RefinementTable, path: &Path) -> Result<(), IoError> {
    write_rows(path, &table.rows())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DOCKED: &str = "MODEL 1\nREMARK minimizedAffinity -7.2\nENDMDL\n\
                          MODEL 2\nREMARK minimizedAffinity -5.1\nENDMDL\n";

    fn docked_set(label: &str) -> PoseSet {
        PoseSet::from_artifact(Path::new(&format!("/w/{}_docked.pdbqt", label)), DOCKED).unwrap()
    }

    #[test]
    fn test_selection() {
        let mut set = docked_set("lig1");
        assert_eq!(set.label, "lig1");
        assert!(set.select(2));
        assert!(!set.select(7));
        assert_eq!(set.selected_objects(), vec!["pose2_lig1"]);
        assert_eq!(set.toggle(2), Some(false));
        assert_eq!(set.toggle(1), Some(true));
        assert!(set.deselect(1));
        assert!(set.selected_objects().is_empty());
    }

    #[test]
    fn test_current_poses_order() {
        let mut work = WorkingSet::new();
        work.insert(docked_set("lig1")).select(1);
        let second = work.insert(docked_set("lig2"));
        second.select(2);
        second.select(1);

        let mut refined = PoseSet::from_artifact(
            Path::new("/w/pose1_lig1_minimized.pdbqt"),
            "MODEL 1\nREMARK minimizedAffinity -8.0\nENDMDL\n",
        )
        .unwrap();
        assert!(refined.is_refined());
        refined.select(1);
        work.insert(refined);
        work.load_pose(Path::new("/elsewhere/mypose.pdb"));

        assert_eq!(
            work.current_poses(),
            vec!["pose1_lig1", "pose1_lig2", "pose2_lig2", "pose1_lig1_minimized", "mypose"]
        );

        work.include_selections = false;
        assert_eq!(work.current_poses(), vec!["mypose"]);
    }

    #[test]
    fn test_insert_replaces_same_label() {
        let mut work = WorkingSet::new();
        work.insert(docked_set("lig1")).select(1);
        work.insert(docked_set("lig1"));
        assert_eq!(work.sets.len(), 1);
        assert!(work.current_poses().is_empty());
    }

    #[test]
    fn test_pose_source() {
        let mut work = WorkingSet::new();
        work.insert(docked_set("lig1"));
        work.insert(
            PoseSet::from_artifact(
                Path::new("/w/pose1_lig1_minimized.pdbqt"),
                "MODEL 1\nREMARK minimizedAffinity -8.0\nENDMDL\n",
            )
            .unwrap(),
        );

        assert_eq!(
            work.pose_source("pose2_lig1"),
            Some((PathBuf::from("/w/lig1_docked.pdbqt"), 2))
        );
        assert_eq!(work.pose_source("pose3_lig1"), None);
        assert_eq!(work.pose_source("pose1_pose1_lig1_minimized"), None);
    }

    #[test]
    fn test_refinement_table_appends() {
        let mut table = RefinementTable::new();
        table
            .push_artifact(
                Path::new("/w/pose1_lig1_localdocked.pdbqt"),
                "REMARK minimizedAffinity -9.1\n",
            )
            .unwrap();
        table.push("pose2_lig1_minimized", -6.0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[0].ligand_label, "pose1_lig1_localdocked");
        assert!(table.records().iter().all(|r| r.selected));
        assert_eq!(table.toggle(1), Some(false));
        assert_eq!(table.selected().count(), 1);
        assert!(table.push_artifact(Path::new("/w/x.pdbqt"), "").is_err());
    }

    #[test]
    fn test_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lig1.csv");
        export_pose_set(&docked_set("lig1"), &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "model,Affinity\n1,-7.2\n2,-5.1\n"
        );

        let mut table = RefinementTable::new();
        table.push("pose1_lig1_minimized", -8.5);
        let path = dir.path().join("minimization.csv");
        export_refinements(&table, &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "model,Affinity\npose1_lig1_minimized,-8.5\n"
        );
    }
}
