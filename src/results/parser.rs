//! Text transforms over smina's `.pdbqt` output. No file access happens here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker opening a pose block
pub const MODEL_MARKER: &str = "MODEL";

/// Marker closing a pose block
pub const ENDMDL_MARKER: &str = "ENDMDL";

/// Remark tag smina puts in front of each pose's score
pub const AFFINITY_MARKER: &str = "minimizedAffinity";

/// Marker ending a ligand's torsion tree
pub const TORSDOF_MARKER: &str = "TORSDOF";

/// Errors that can occur when reading output artifacts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Malformed artifact at line {line}: {reason}")]
    MalformedArtifact { line: usize, reason: String },

    #[error("No {} value found", AFFINITY_MARKER)]
    MissingAffinity,
}

/// One scored pose of a docking run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub model_number: u32,
    pub affinity: f64,
    pub selected: bool,
}

impl PoseRecord {
    pub fn new(model_number: u32, affinity: f64) -> Self {
        Self {
            model_number,
            affinity,
            selected: false,
        }
    }
}

fn is_model_line(line: &str) -> bool {
    line.trim_start().starts_with(MODEL_MARKER)
}

fn model_number(line: &str, idx: usize) -> Result<u32, ParseError> {
    let rest = line.trim_start()[MODEL_MARKER.len()..].trim();
    match rest.split_whitespace().next().map(str::parse::<u32>) {
        Some(Ok(n)) if n >= 1 => Ok(n),
        _ => Err(ParseError::MalformedArtifact {
            line: idx + 1,
            reason: format!("bad model number {:?}", rest),
        }),
    }
}

/// The score following the affinity tag, `None` if the line carries no tag
fn affinity(line: &str, idx: usize) -> Result<Option<f64>, ParseError> {
    let Some(pos) = line.find(AFFINITY_MARKER) else {
        return Ok(None);
    };
    let rest = line[pos + AFFINITY_MARKER.len()..].trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    rest.split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .map(Some)
        .ok_or_else(|| ParseError::MalformedArtifact {
            line: idx + 1,
            reason: format!("bad affinity {:?}", rest.trim()),
        })
}

/// Read `(model, affinity)` pairs in file order.
///
/// A `MODEL n` line sets the current model, each affinity line emits one
/// record for it. An affinity before any model is an error.
pub fn parse_poses(text: &str) -> Result<Vec<PoseRecord>, ParseError> {
    let mut poses = Vec::new();
    let mut current = None;

    for (idx, line) in text.lines().enumerate() {
        if is_model_line(line) {
            current = Some(model_number(line, idx)?);
            continue;
        }
        if let Some(value) = affinity(line, idx)? {
            let model = current.ok_or_else(|| ParseError::MalformedArtifact {
                line: idx + 1,
                reason: format!("{} before any {}", AFFINITY_MARKER, MODEL_MARKER),
            })?;
            poses.push(PoseRecord::new(model, value));
        }
    }

    Ok(poses)
}

/// The last affinity in a single-pose refinement or scoring artifact
pub fn parse_affinity(text: &str) -> Result<f64, ParseError> {
    let mut last = None;
    for (idx, line) in text.lines().enumerate() {
        if let Some(value) = affinity(line, idx)? {
            last = Some(value);
        }
    }
    last.ok_or(ParseError::MissingAffinity)
}

/// Merge smina's flexible residue output into one block per pose.
///
/// smina writes one `MODEL n` fragment per residue. Fragments sharing an
/// original model number join into one block, blocks are renumbered `1..N`
/// in order of first appearance, and each ends with exactly one `ENDMDL`.
/// Lines ahead of the first marker belong to the first block. Input without
/// any marker merges to an empty string.
pub fn merge_flexres(text: &str) -> String {
    let mut blocks: Vec<(String, Vec<&str>)> = Vec::new();
    let mut current: Option<usize> = None;
    let mut preamble: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(ENDMDL_MARKER) {
            continue;
        }
        if trimmed.starts_with(MODEL_MARKER) {
            let key = trimmed[MODEL_MARKER.len()..].trim().to_string();
            current = Some(match blocks.iter().position(|(k, _)| *k == key) {
                Some(idx) => idx,
                None => {
                    let lines = if blocks.is_empty() {
                        std::mem::take(&mut preamble)
                    } else {
                        Vec::new()
                    };
                    blocks.push((key, lines));
                    blocks.len() - 1
                }
            });
            continue;
        }
        match current {
            Some(idx) => blocks[idx].1.push(line),
            None => preamble.push(line),
        }
    }

    let mut merged = String::new();
    for (number, (_, lines)) in blocks.iter().enumerate() {
        merged.push_str(&format!("{} {}\n", MODEL_MARKER, number + 1));
        for line in lines {
            merged.push_str(line);
            merged.push('\n');
        }
        merged.push_str(ENDMDL_MARKER);
        merged.push('\n');
    }
    merged
}

/// Drop flexible residues saved along with a ligand pose.
///
/// A pose exported together with its residues carries more than one
/// `TORSDOF` record; everything after the first one is cut. `None` when the
/// file holds the ligand alone.
pub fn strip_ligand_flexres(text: &str) -> Option<String> {
    let count = text
        .lines()
        .filter(|line| line.contains(TORSDOF_MARKER))
        .count();
    if count <= 1 {
        return None;
    }

    let mut ligand = String::new();
    for line in text.lines() {
        ligand.push_str(line);
        ligand.push('\n');
        if line.contains(TORSDOF_MARKER) {
            break;
        }
    }
    Some(ligand)
}

/// The body of pose `model` in a multi-model output, without its
/// `MODEL`/`ENDMDL` lines. `None` if the model is absent.
pub fn extract_model(text: &str, model: u32) -> Option<String> {
    let mut body: Option<String> = None;
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if is_model_line(line) {
            if body.is_some() {
                break;
            }
            if model_number(line, idx).ok() == Some(model) {
                body = Some(String::new());
            }
            continue;
        }
        if let Some(body) = body.as_mut() {
            if trimmed.starts_with(ENDMDL_MARKER) {
                break;
            }
            body.push_str(line);
            body.push('\n');
        }
    }
    body
}
