//! Line-level three-way merge of single files.

use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use uvs_core::config::MergeSettings;

/// Result of merging one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMergeStatus {
    /// Output holds a clean merge.
    Clean,
    /// Output holds conflict markers.
    Conflicted,
    /// The merge could not be carried out; output is unspecified.
    Failed(String),
}

/// Strategy for merging one file given both sides and their ancestor.
pub trait FileMerger {
    fn merge_files(
        &self,
        current: &Path,
        ancestor: &Path,
        source: &Path,
        output: &Path,
    ) -> FileMergeStatus;
}

/// External `diff3`-style tool.
///
/// Invoked as `program args... current ancestor source` with stdout going
/// to the output file. Exit status 0 is a clean merge, 1 a merge with
/// conflict markers, anything else a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff3Tool {
    program: String,
    args: Vec<String>,
}

impl Default for Diff3Tool {
    fn default() -> Self {
        Self::from_settings(&MergeSettings::default())
    }
}

impl Diff3Tool {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_settings(settings: &MergeSettings) -> Self {
        Self::new(settings.program.clone(), settings.args.clone())
    }
}

impl FileMerger for Diff3Tool {
    fn merge_files(
        &self,
        current: &Path,
        ancestor: &Path,
        source: &Path,
        output: &Path,
    ) -> FileMergeStatus {
        let out = match std::fs::File::create(output) {
            Ok(f) => f,
            Err(e) => return FileMergeStatus::Failed(format!("creating {}: {e}", output.display())),
        };

        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(current)
            .arg(ancestor)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::piped())
            .output();

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(program = %self.program, "could not run merge tool: {e}");
                return FileMergeStatus::Failed(format!("running {}: {e}", self.program));
            }
        };

        match result.status.code() {
            Some(0) => FileMergeStatus::Clean,
            Some(1) => {
                debug!(output = %output.display(), "merge tool reported conflicts");
                FileMergeStatus::Conflicted
            }
            code => {
                let stderr = String::from_utf8_lossy(&result.stderr);
                FileMergeStatus::Failed(format!(
                    "{} exited with {}: {}",
                    self.program,
                    code.map_or_else(|| "a signal".to_string(), |c| c.to_string()),
                    stderr.trim()
                ))
            }
        }
    }
}
