//! Input/output for the line-oriented configuration files and result exports

use log::{debug, warn};
use nalgebra::Vector3;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::geometry::{BoxError, BoxSpec};
use crate::paths::{PathError, PathStyle};

/// Keys every box configuration file must carry, in write order
pub const BOX_CONFIG_KEYS: [&str; 6] = [
    "center_x", "center_y", "center_z", "size_x", "size_y", "size_z",
];

/// File name of the plugin settings file
pub const SETTINGS_FILE_NAME: &str = "smina_plugin.conf";

/// Errors that can occur during file I/O operations
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required key: {0}")]
    MissingKey(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Geometry(#[from] BoxError),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Read `key = value` lines.
///
/// Blank lines and lines starting with `#` are skipped, as are lines without
/// an `=`. Only the first `=` separates key from value. Later duplicates win.
pub fn read_key_values(text: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        values.insert(key.trim().to_string(), value.trim().to_string());
    }
    values
}

fn required<'a>(
    values: &'a BTreeMap<String, String>,
    key: &'static str,
) -> Result<&'a str, IoError> {
    values
        .get(key)
        .map(String::as_str)
        .ok_or(IoError::MissingKey(key))
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, IoError> {
    value.parse::<T>().map_err(|_| IoError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Parse a `<receptor>_config.txt` box configuration
pub fn parse_box_config(text: &str) -> Result<BoxSpec, IoError> {
    let values = read_key_values(text);

    let mut numbers = [0.0f64; 3];
    for (slot, key) in numbers.iter_mut().zip(BOX_CONFIG_KEYS[..3].iter().copied()) {
        *slot = parse_value(key, required(&values, key)?)?;
    }

    let mut sizes = [0i32; 3];
    for (slot, key) in sizes.iter_mut().zip(BOX_CONFIG_KEYS[3..].iter().copied()) {
        *slot = parse_value(key, required(&values, key)?)?;
    }

    let spec = BoxSpec::new(
        Vector3::new(numbers[0], numbers[1], numbers[2]),
        Vector3::new(sizes[0], sizes[1], sizes[2]),
    )?;
    Ok(spec)
}

/// Format a box configuration, one key per line
pub fn format_box_config(spec: &BoxSpec) -> String {
    format!(
        "center_x = {:.3}\ncenter_y = {:.3}\ncenter_z = {:.3}\nsize_x = {}\nsize_y = {}\nsize_z = {}\n",
        spec.center.x, spec.center.y, spec.center.z, spec.size.x, spec.size.y, spec.size.z
    )
}

/// Read a box configuration file
pub fn read_box_config<P: AsRef<Path>>(path: P) -> Result<BoxSpec, IoError> {
    let text = fs::read_to_string(path.as_ref())?;
    debug!("Read box configuration {}", path.as_ref().display());
    parse_box_config(&text)
}

/// Write a box configuration file, replacing any existing one
pub fn write_box_config<P: AsRef<Path>>(path: P, spec: &BoxSpec) -> Result<(), IoError> {
    spec.bounds()?;
    fs::write(path.as_ref(), format_box_config(spec))?;
    debug!("Wrote box configuration {}", path.as_ref().display());
    Ok(())
}

/// Locations of the external executables and data directories
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PluginSettings {
    pub smina_exe: String,
    pub openbabel_exe: String,
    pub ligand_dir_path: String,
    pub scoring_table_dir_path: String,
    pub path_style: PathStyle,

    /// Keys this version does not interpret, kept so they survive a rewrite
    pub extra: BTreeMap<String, String>,
}

impl PluginSettings {
    /// Parse the settings file format
    pub fn parse(text: &str) -> Result<Self, IoError> {
        let mut values = read_key_values(text);
        let mut take = |key: &str| values.remove(key).unwrap_or_default();

        let smina_exe = take("smina_exe");
        let openbabel_exe = take("openbabel_exe");
        let ligand_dir_path = take("ligand_dir_path");
        let scoring_table_dir_path = take("scoring_table_dir_path");
        let path_style = match take("path_style").as_str() {
            "" => PathStyle::default(),
            style => style.parse()?,
        };

        Ok(Self {
            smina_exe,
            openbabel_exe,
            ligand_dir_path,
            scoring_table_dir_path,
            path_style,
            extra: values,
        })
    }

    /// Format the settings for writing
    pub fn format(&self) -> String {
        let mut text = String::from("#========================================\n");
        text.push_str("# Smina Plugin configuration file\n");
        text.push_str(&format!("smina_exe = {}\n", self.smina_exe));
        text.push_str(&format!("openbabel_exe = {}\n", self.openbabel_exe));
        text.push_str(&format!("ligand_dir_path = {}\n", self.ligand_dir_path));
        text.push_str(&format!(
            "scoring_table_dir_path = {}\n",
            self.scoring_table_dir_path
        ));
        text.push_str(&format!("path_style = {}\n", self.path_style));
        for (key, value) in &self.extra {
            text.push_str(&format!("{} = {}\n", key, value));
        }
        text
    }

    /// Load settings from `path`, falling back to defaults when the file is absent
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        let path = path.as_ref();
        if !path.is_file() {
            warn!("Plugin configuration file not found: {}", path.display());
            return Ok(Self::default());
        }

        debug!("Reading configuration file: {}", path.display());
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Write settings to `path`, creating its directory if needed
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), IoError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.format())?;
        debug!("Wrote plugin configuration file {}", path.display());
        Ok(())
    }

    /// Set a value by key, as accepted on the command line
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), IoError> {
        let value = value.trim().to_string();
        match key.trim() {
            "smina_exe" => self.smina_exe = value,
            "openbabel_exe" => self.openbabel_exe = value,
            "ligand_dir_path" => self.ligand_dir_path = value,
            "scoring_table_dir_path" => self.scoring_table_dir_path = value,
            "path_style" => self.path_style = value.parse()?,
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
        Ok(())
    }
}

/// Default location of the settings file: `~/.smina_plugin/smina_plugin.conf`
pub fn default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".smina_plugin")
        .join(SETTINGS_FILE_NAME)
}

/// Write `model,Affinity` rows in the order given
pub fn write_affinity_csv<W, L>(writer: W, rows: &[(L, f64)]) -> Result<(), IoError>
where
    W: Write,
    L: AsRef<str>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["model", "Affinity"])?;
    for (label, affinity) in rows {
        let affinity = affinity.to_string();
        csv_writer.write_record([label.as_ref(), affinity.as_str()])?;
    }
    csv_writer.flush()?;
    Ok(())
}
