//! Script directory listing.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use log::debug;

use crate::script::count_lines;

/// Scripts listed from one directory.
pub const MAX_SCRIPT_FILES: usize = 64;

/// Extension a file needs to be listed.
pub const SCRIPT_EXTENSION: &str = "ds";

/// Name, size and line count of a script file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub lines: usize,
}

impl ScriptInfo {
    pub fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let size = fs::metadata(&path)?.len();
        let lines = count_lines(BufReader::new(File::open(&path)?))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, path, size, lines })
    }
}

/// List up to [`MAX_SCRIPT_FILES`] `.ds` files in `dir`, sorted by name.
///
/// The directory is created if it does not exist.  Subdirectories are not
/// searched.
pub fn scan(dir: &Path) -> io::Result<Vec<ScriptInfo>> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path.extension().is_some_and(|e| e == SCRIPT_EXTENSION)
        {
            paths.push(path);
        }
    }
    paths.sort();
    paths.truncate(MAX_SCRIPT_FILES);
    debug!("{} scripts in {}", paths.len(), dir.display());

    paths.into_iter().map(ScriptInfo::from_path).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
