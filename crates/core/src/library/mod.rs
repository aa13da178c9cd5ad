use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ClickTrackError, Result};

const EXPECTED_NAMES: &str =
    "mouseDownHard.mp3, mouseDownSoft.mp3, mouseUp.mp3 (numbered variations such as mouseDownHard1.mp3 are welcome)";

/// Role a sound plays in the mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoundRole {
    HardPress,
    SoftPress,
    Release,
}

impl SoundRole {
    /// Infers a role from a file name. Hard presses win over soft presses,
    /// which win over releases.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.contains("mousedownhard") {
            Some(Self::HardPress)
        } else if name.contains("mousedownsoft") {
            Some(Self::SoftPress)
        } else if name.contains("mouseup") {
            Some(Self::Release)
        } else {
            None
        }
    }
}

/// Sound assets grouped by role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoundLibrary {
    hard_press: Vec<PathBuf>,
    soft_press: Vec<PathBuf>,
    release: Vec<PathBuf>,
}

impl SoundLibrary {
    /// Builds a library, rejecting one that cannot represent a press.
    pub fn new(
        hard_press: Vec<PathBuf>,
        soft_press: Vec<PathBuf>,
        release: Vec<PathBuf>,
    ) -> Result<Self> {
        if hard_press.is_empty() && soft_press.is_empty() {
            return Err(ClickTrackError::EmptyLibrary(format!(
                "no mouse click sounds found. Expected files: {EXPECTED_NAMES}"
            )));
        }

        Ok(Self {
            hard_press,
            soft_press,
            release,
        })
    }

    /// Classifies the files of a flat sound directory.
    pub fn scan(dir: impl AsRef<Path>, extensions: &[String]) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ClickTrackError::SourceNotFound {
                what: "sounds folder",
                path: dir.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let recognised = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
                .unwrap_or(false);
            if recognised {
                files.push(path);
            }
        }
        files.sort();

        let (mut hard_press, mut soft_press, mut release) = (Vec::new(), Vec::new(), Vec::new());
        for path in files {
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some(role) = SoundRole::from_file_name(name) else {
                tracing::debug!(file = name, "skipping unrecognised sound file");
                continue;
            };
            tracing::debug!(file = name, ?role, "loaded sound");
            match role {
                SoundRole::HardPress => hard_press.push(path),
                SoundRole::SoftPress => soft_press.push(path),
                SoundRole::Release => release.push(path),
            }
        }

        let library = Self::new(hard_press, soft_press, release)?;
        tracing::info!(
            dir = %dir.display(),
            hard = library.hard_press.len(),
            soft = library.soft_press.len(),
            release = library.release.len(),
            "loaded {} sound variations",
            library.total()
        );
        Ok(library)
    }

    pub fn sounds(&self, role: SoundRole) -> &[PathBuf] {
        match role {
            SoundRole::HardPress => &self.hard_press,
            SoundRole::SoftPress => &self.soft_press,
            SoundRole::Release => &self.release,
        }
    }

    pub fn total(&self) -> usize {
        self.hard_press.len() + self.soft_press.len() + self.release.len()
    }
}
