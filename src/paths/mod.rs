//! Translation between host file paths and the paths seen by the docking process
//!
//! smina ships as a Linux binary. On a Windows host it runs inside WSL, where
//! a drive-rooted path such as `C:\work\rec.pdbqt` is visible as
//! `/mnt/c/work/rec.pdbqt`. The conversion is purely syntactic: nothing is
//! checked on disk and `..` segments are left alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Mount point under which WSL exposes host drives
pub const WSL_MOUNT_PREFIX: &str = "/mnt/";

/// Errors that can occur while translating paths
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Unknown path style: {0}")]
    UnknownStyle(String),
}

impl PathError {
    fn invalid(path: &str, reason: &'static str) -> Self {
        PathError::InvalidPath {
            path: path.to_string(),
            reason,
        }
    }
}

/// Convert a drive-rooted host path into its WSL mount form.
///
/// `C:\a\b\c` becomes `/mnt/c/a/b/c`. Forward slashes in the host path are
/// accepted as separators too.
pub fn to_subprocess_path(host_path: &str) -> Result<String, PathError> {
    let mut chars = host_path.chars();
    let drive = match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => letter.to_ascii_lowercase(),
        _ => return Err(PathError::invalid(host_path, "no drive letter prefix")),
    };

    let rest = &host_path[2..];
    if !rest.is_empty() && !rest.starts_with(['\\', '/']) {
        return Err(PathError::invalid(host_path, "drive-relative paths are not supported"));
    }

    Ok(format!(
        "{}{}{}",
        WSL_MOUNT_PREFIX,
        drive,
        rest.replace('\\', "/")
    ))
}

/// Convert a WSL mount path back into a drive-rooted host path.
///
/// `/mnt/c/a/b/c` becomes `C:\a\b\c`. The drive letter is upper-cased.
pub fn to_host_path(subprocess_path: &str) -> Result<String, PathError> {
    let rest = subprocess_path
        .strip_prefix(WSL_MOUNT_PREFIX)
        .ok_or_else(|| PathError::invalid(subprocess_path, "not under the WSL drive mount"))?;

    let mut chars = rest.chars();
    let drive = match chars.next() {
        Some(letter) if letter.is_ascii_alphabetic() => letter.to_ascii_uppercase(),
        _ => return Err(PathError::invalid(subprocess_path, "no drive letter after mount prefix")),
    };

    let tail = &rest[1..];
    if !tail.is_empty() && !tail.starts_with('/') {
        return Err(PathError::invalid(subprocess_path, "no drive letter after mount prefix"));
    }

    Ok(format!("{}:{}", drive, tail.replace('/', "\\")))
}

/// How paths must be presented to the docking executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    /// Host is Windows, smina runs under WSL
    Wsl,
    /// smina runs on the host itself
    Native,
}

impl Default for PathStyle {
    fn default() -> Self {
        if cfg!(windows) {
            PathStyle::Wsl
        } else {
            PathStyle::Native
        }
    }
}

impl fmt::Display for PathStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStyle::Wsl => write!(f, "wsl"),
            PathStyle::Native => write!(f, "native"),
        }
    }
}

impl FromStr for PathStyle {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wsl" => Ok(PathStyle::Wsl),
            "native" => Ok(PathStyle::Native),
            other => Err(PathError::UnknownStyle(other.to_string())),
        }
    }
}

/// Applies one [`PathStyle`] to every path handed to the docking executable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathTranslator {
    pub style: PathStyle,
}

impl PathTranslator {
    pub fn new(style: PathStyle) -> Self {
        Self { style }
    }

    /// Translate a host path for use on the docking command line
    pub fn translate(&self, path: &Path) -> Result<String, PathError> {
        let text = path
            .to_str()
            .ok_or_else(|| PathError::invalid(&path.to_string_lossy(), "not valid UTF-8"))?;

        match self.style {
            PathStyle::Wsl => to_subprocess_path(text),
            PathStyle::Native => Ok(text.to_string()),
        }
    }

    /// Program that has to wrap the docking executable, if any
    pub fn launcher(&self) -> Option<&'static str> {
        match self.style {
            PathStyle::Wsl => Some("wsl"),
            PathStyle::Native => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_path_to_mount() {
        assert_eq!(
            to_subprocess_path(r"C:\Users\lab\rec.pdbqt").unwrap(),
            "/mnt/c/Users/lab/rec.pdbqt"
        );
        assert_eq!(to_subprocess_path("D:/data/lig").unwrap(), "/mnt/d/data/lig");
        assert_eq!(to_subprocess_path("E:").unwrap(), "/mnt/e");
    }

    #[test]
    fn test_missing_drive_letter_is_rejected() {
        for bad in ["/home/lab/rec.pdbqt", r"\\server\share", "rec.pdbqt", "1:\\x", ""] {
            assert!(
                matches!(to_subprocess_path(bad), Err(PathError::InvalidPath { .. })),
                "{bad:?} should be rejected"
            );
        }
        assert!(to_subprocess_path("C:rec.pdbqt").is_err());
    }

    #[test]
    fn test_mount_path_to_host() {
        assert_eq!(
            to_host_path("/mnt/c/Users/lab/rec.pdbqt").unwrap(),
            r"C:\Users\lab\rec.pdbqt"
        );
        assert!(to_host_path("/home/lab").is_err());
        assert!(to_host_path("/mnt/").is_err());
        assert!(to_host_path("/mnt/cc/x").is_err());
    }

    #[test]
    fn test_round_trip() {
        for p in [r"C:\a\b\c", r"Z:\Program Files\smina.static", r"D:\", "F:"] {
            assert_eq!(to_host_path(&to_subprocess_path(p).unwrap()).unwrap(), p);
        }
    }

    #[test]
    fn test_native_translation_is_identity() {
        let translator = PathTranslator::new(PathStyle::Native);
        assert_eq!(
            translator.translate(Path::new("/tmp/work/rec.pdbqt")).unwrap(),
            "/tmp/work/rec.pdbqt"
        );
        assert_eq!(translator.launcher(), None);
        assert_eq!(PathTranslator::new(PathStyle::Wsl).launcher(), Some("wsl"));
    }

    #[test]
    fn test_style_parsing() {
        assert_eq!("WSL".parse::<PathStyle>().unwrap(), PathStyle::Wsl);
        assert_eq!(" native ".parse::<PathStyle>().unwrap(), PathStyle::Native);
        assert!("posix".parse::<PathStyle>().is_err());
    }
}
