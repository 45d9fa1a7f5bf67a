#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Creates (if needed) and returns a subdirectory of the workspace.
    pub fn dir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::create_dir_all(&path).expect("create workspace subdirectory");
        path
    }

    /// Writes `contents` into `<dir>/<name>` under the workspace and returns the path.
    pub fn write(&self, dir: &str, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(dir, name, contents.as_bytes())
    }

    pub fn write_bytes(&self, dir: &str, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir(dir).join(name);
        fs::write(&path, contents).expect("write temp file contents");
        path
    }
}

/// Reads a tab-delimited file into its header and rows.
pub fn read_tsv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .expect("open tsv");
    let headers = reader
        .headers()
        .expect("tsv headers")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| {
            record
                .expect("tsv record")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect();
    (headers, rows)
}
