//! Scoring tables for smina's `--custom_scoring` option

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the built-in scoring table
pub const VINA_TABLE: &str = "vina";

/// Name offered by the editor for starting a table from scratch
pub const NEW_TABLE: &str = "new";

/// Extension of scoring table files
pub const TABLE_EXTENSION: &str = "scr";

/// Errors that can occur when working with scoring tables
#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Unknown scoring table: {0}")]
    UnknownTable(String),

    #[error("Malformed scoring table line {line}: {content}")]
    Malformed { line: usize, content: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One weighted energy term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTerm {
    pub weight: f64,
    pub term: String,
}

impl ScoringTerm {
    pub fn new(weight: f64, term: &str) -> Self {
        Self {
            weight,
            term: term.to_string(),
        }
    }
}

/// An ordered set of weighted terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTable {
    pub name: String,
    pub terms: Vec<ScoringTerm>,
}

impl ScoringTable {
    /// The default Vina weights
    pub fn vina() -> Self {
        Self {
            name: VINA_TABLE.to_string(),
            terms: vec![
                ScoringTerm::new(-0.035579, "gauss(o=0,_w=0.5,_c=8)"),
                ScoringTerm::new(-0.005156, "gauss(o=3,_w=2,_c=8)"),
                ScoringTerm::new(0.840245, "repulsion(o=0,_c=8)"),
                ScoringTerm::new(-0.035069, "hydrophobic(g=0.5,_b=1.5,_c=8)"),
                ScoringTerm::new(-0.587439, "non_dir_h_bond(g=-0.7,_b=0,_c=8)"),
                ScoringTerm::new(1.923, "num_tors_div"),
            ],
        }
    }

    /// Parse the `.scr` format: `weight term` per line.
    ///
    /// The first whitespace-separated token is the weight and the last one
    /// the term. Blank lines are skipped.
    pub fn parse(name: &str, text: &str) -> Result<Self, ScoringError> {
        let mut terms = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            let Some(first) = tokens.next() else {
                continue;
            };
            let last = tokens.last();

            let malformed = || ScoringError::Malformed {
                line: idx + 1,
                content: line.to_string(),
            };
            let weight = first.parse::<f64>().map_err(|_| malformed())?;
            let term = last.ok_or_else(malformed)?;
            terms.push(ScoringTerm::new(weight, term));
        }

        Ok(Self {
            name: name.to_string(),
            terms,
        })
    }

    /// Format in the `.scr` layout, weights padded to 13 columns
    pub fn format(&self) -> String {
        self.terms
            .iter()
            .map(|t| format!("{:<13}{}\n", t.weight.to_string(), t.term))
            .collect()
    }
}

/// Which table a run is scored with
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScoringChoice {
    /// smina's built-in weights; no `--custom_scoring` flag
    #[default]
    Vina,
    /// A named `.scr` file in the scoring table directory
    Custom(String),
}

impl ScoringChoice {
    /// `vina` maps to the built-in table, anything else to a custom table
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() || name == VINA_TABLE {
            ScoringChoice::Vina
        } else {
            ScoringChoice::Custom(name.to_string())
        }
    }
}

impl fmt::Display for ScoringChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringChoice::Vina => write!(f, "{}", VINA_TABLE),
            ScoringChoice::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// The directory holding `.scr` scoring tables
#[derive(Debug, Clone)]
pub struct ScoringLibrary {
    pub dir: PathBuf,
}

impl ScoringLibrary {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path a table of this name would have
    pub fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, TABLE_EXTENSION))
    }

    /// Available table names, `vina` first, then the files found sorted by name
    pub fn list(&self) -> Result<Vec<String>, ScoringError> {
        let mut names = Vec::new();
        if self.dir.is_dir() {
            for entry in fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        names.retain(|n| n != VINA_TABLE);
        names.insert(0, VINA_TABLE.to_string());
        Ok(names)
    }

    /// Resolve a choice to the table file it needs.
    ///
    /// `Vina` needs no file. A custom table that is not on disk is an error.
    pub fn resolve(&self, choice: &ScoringChoice) -> Result<Option<PathBuf>, ScoringError> {
        match choice {
            ScoringChoice::Vina => Ok(None),
            ScoringChoice::Custom(name) => {
                let path = self.table_path(name);
                if path.is_file() {
                    Ok(Some(path))
                } else {
                    Err(ScoringError::UnknownTable(name.clone()))
                }
            }
        }
    }

    /// Load a table by name
    pub fn load(&self, name: &str) -> Result<ScoringTable, ScoringError> {
        if name == VINA_TABLE {
            return Ok(ScoringTable::vina());
        }

        let path = self.table_path(name);
        if !path.is_file() {
            return Err(ScoringError::UnknownTable(name.to_string()));
        }
        debug!("Reading scoring table: {}", path.display());
        ScoringTable::parse(name, &fs::read_to_string(&path)?)
    }

    /// The rows the editor starts from for `name`.
    ///
    /// `new` yields a single blank row.
    pub fn editable(&self, name: &str) -> Result<ScoringTable, ScoringError> {
        if name == NEW_TABLE {
            return Ok(ScoringTable {
                name: NEW_TABLE.to_string(),
                terms: vec![ScoringTerm::new(0.0, "")],
            });
        }
        self.load(name)
    }

    /// Save an edited table as `<name>_new.scr`.
    ///
    /// The source table is never overwritten. Editing the `new` template
    /// therefore lands in `new_new.scr`.
    pub fn save_edited(&self, name: &str, table: &ScoringTable) -> Result<PathBuf, ScoringError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.table_path(&format!("{}_new", name));
        fs::write(&path, table.format())?;
        info!("Saved scoring table {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vina_table_is_fixed() {
        let vina = ScoringTable::vina();
        assert_eq!(vina.terms.len(), 6);
        assert_eq!(vina.terms[5].term, "num_tors_div");
        assert_approx_eq!(vina.terms[2].weight, 0.840245);
    }

    #[test]
    fn test_parse_scr() {
        let text = "-0.035579    gauss(o=0,_w=0.5,_c=8)\n\n0.840245     repulsion(o=0,_c=8)\n";
        let table = ScoringTable::parse("mine", text).unwrap();
        assert_eq!(table.terms.len(), 2);
        assert_approx_eq!(table.terms[0].weight, -0.035579);
        assert_eq!(table.terms[1].term, "repulsion(o=0,_c=8)");

        assert!(matches!(
            ScoringTable::parse("bad", "heavy gauss\n"),
            Err(ScoringError::Malformed { line: 1, .. })
        ));
        assert!(ScoringTable::parse("bad", "1.0\n").is_err());
    }

    #[test]
    fn test_format_pads_weights() {
        let table = ScoringTable {
            name: "t".into(),
            terms: vec![ScoringTerm::new(-0.5, "repulsion(o=0,_c=8)")],
        };
        assert_eq!(table.format(), "-0.5         repulsion(o=0,_c=8)\n");
        assert_eq!(ScoringTable::parse("t", &table.format()).unwrap(), table);
    }

    #[test]
    fn test_library_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let library = ScoringLibrary::new(dir.path());
        fs::write(library.table_path("dkoes"), "1.0 gauss(o=0,_w=0.5,_c=8)\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(library.list().unwrap(), vec!["vina", "dkoes"]);
        assert_eq!(library.resolve(&ScoringChoice::Vina).unwrap(), None);
        assert_eq!(
            library.resolve(&ScoringChoice::from_name("dkoes")).unwrap(),
            Some(library.table_path("dkoes"))
        );
        assert!(matches!(
            library.resolve(&ScoringChoice::from_name("missing")),
            Err(ScoringError::UnknownTable(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_save_edited_never_overwrites_source() {
        let dir = tempfile::tempdir().unwrap();
        let library = ScoringLibrary::new(dir.path());
        let original = "1.0 gauss(o=0,_w=0.5,_c=8)\n";
        fs::write(library.table_path("dkoes"), original).unwrap();

        let mut table = library.editable("dkoes").unwrap();
        table.terms[0].weight = 2.0;
        let saved = library.save_edited("dkoes", &table).unwrap();

        assert_eq!(saved, library.table_path("dkoes_new"));
        assert_eq!(fs::read_to_string(library.table_path("dkoes")).unwrap(), original);
        assert_approx_eq!(library.load("dkoes_new").unwrap().terms[0].weight, 2.0);

        let blank = library.editable(NEW_TABLE).unwrap();
        assert_eq!(blank.terms.len(), 1);
        assert_eq!(
            library.save_edited(NEW_TABLE, &library.editable("vina").unwrap()).unwrap(),
            library.table_path("new_new")
        );
    }
}
