//! Asset path building and whole-file reads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reporter::{report, Problem, Reporter};
use tracing::debug;

pub const SHADER_DIR: &str = "Shaders";
pub const VERTEX_FILE: &str = "vertex.vs";
pub const FRAGMENT_FILE: &str = "fragment.fs";

#[derive(Debug, Clone)]
pub struct Files {
    reporter: Arc<Reporter>,
    asset_root: PathBuf,
}

impl Files {
    pub fn new(reporter: Arc<Reporter>, asset_root: impl Into<PathBuf>) -> Self {
        Self {
            reporter,
            asset_root: asset_root.into(),
        }
    }

    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    /// `<asset root>/Shaders/<name>/<file>`
    pub fn shader_path(&self, name: &str, file: &str) -> PathBuf {
        self.asset_root.join(SHADER_DIR).join(name).join(file)
    }

    /// Reads a whole file. Failures are reported as `file_read` warnings.
    pub fn read_all(&self, path: &Path) -> Option<Vec<u8>> {
        match fs::read(path) {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes = bytes.len(), "read asset");
                Some(bytes)
            }
            Err(err) => {
                debug!(path = %path.display(), %err, "asset read failed");
                report!(self.reporter, Problem::FileRead);
                None
            }
        }
    }

    /// Reads a whole UTF-8 file. Invalid text is a `string_error` warning.
    pub fn read_to_string(&self, path: &Path) -> Option<String> {
        let bytes = self.read_all(path)?;
        match String::from_utf8(bytes) {
            Ok(text) => Some(text),
            Err(_) => {
                report!(self.reporter, Problem::StringError);
                None
            }
        }
    }
}
