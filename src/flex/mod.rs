//! Flexible receptor side chains

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when reading residue identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlexError {
    #[error("Invalid residue identifier {0:?}: expected CHAIN:RESNRESI, e.g. A:ARG123")]
    InvalidResidue(String),
}

/// A receptor residue, identified the way the host reports a selection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlexibleResidue {
    pub chain: String,
    pub resn: String,
    pub resi: String,
}

impl FlexibleResidue {
    pub fn new(chain: &str, resn: &str, resi: &str) -> Self {
        Self {
            chain: chain.to_string(),
            resn: resn.to_string(),
            resi: resi.to_string(),
        }
    }

    /// The `chain:resi` token smina expects in `--flexres`
    pub fn flexres_token(&self) -> String {
        format!("{}:{}", self.chain, self.resi).replace(' ', "")
    }
}

impl fmt::Display for FlexibleResidue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.chain, self.resn, self.resi)
    }
}

impl FromStr for FlexibleResidue {
    type Err = FlexError;

    /// Parse `A:ARG123`. The residue number starts at the first digit or `-`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FlexError::InvalidResidue(s.to_string());
        let (chain, residue) = s.trim().split_once(':').ok_or_else(invalid)?;

        let split = residue
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .ok_or_else(invalid)?;
        let (resn, resi) = residue.split_at(split);
        if chain.is_empty() || resi.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(chain, resn, resi))
    }
}

/// Drop consecutive repeats, keeping the first of each run.
///
/// Selections arrive one entry per atom, in the order the host iterates them,
/// so consecutive atoms of one residue collapse to a single entry. Repeats
/// that are not adjacent are kept.
pub fn collapse_adjacent<T: PartialEq>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut collapsed: Vec<T> = Vec::new();
    for item in items {
        if collapsed.last() != Some(&item) {
            collapsed.push(item);
        }
    }
    collapsed
}

/// The ordered list of residues treated as flexible during docking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlexibleResidueSpec {
    residues: Vec<FlexibleResidue>,
}

impl FlexibleResidueSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the residues of a per-atom selection
    pub fn add_selection(&mut self, atoms: impl IntoIterator<Item = FlexibleResidue>) -> usize {
        let added = collapse_adjacent(atoms);
        let count = added.len();
        self.residues.extend(added);
        count
    }

    /// Remove the first entry equal to `residue`
    pub fn remove(&mut self, residue: &FlexibleResidue) -> bool {
        match self.residues.iter().position(|r| r == residue) {
            Some(idx) => {
                self.residues.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.residues.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn residues(&self) -> &[FlexibleResidue] {
        &self.residues
    }

    /// Comma-joined `chain:resi` tokens for `--flexres`
    pub fn flexres_arg(&self) -> String {
        self.residues
            .iter()
            .map(FlexibleResidue::flexres_token)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromIterator<FlexibleResidue> for FlexibleResidueSpec {
    fn from_iter<I: IntoIterator<Item = FlexibleResidue>>(iter: I) -> Self {
        let mut spec = Self::new();
        spec.add_selection(iter);
        spec
    }
}
