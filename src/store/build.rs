//! External build step for source artifacts.
//!
//! Source archives carry no readable dependency metadata of their own; an
//! external command turns one into a binary artifact we can inspect. The
//! command is configuration (`[build] command` in the config file); this
//! module only runs it and finds what it produced.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::store::{SdistBuilder, StoreError};

/// Runs a configured command to build a binary artifact from a source
/// archive. The output directory and the archive path are appended to the
/// configured arguments.
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
}

impl CommandBuilder {
    /// Create a builder from a command line, program first.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(CommandBuilder {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl SdistBuilder for CommandBuilder {
    fn build(&self, sdist: &Path) -> Result<PathBuf, StoreError> {
        // The produced wheel has to outlive this call; the directory is
        // reclaimed with the rest of the temp dir at process end.
        let out_dir = tempfile::Builder::new()
            .prefix("drydock-build-")
            .tempdir()?
            .keep();

        tracing::info!("Building binary artifact from {}", sdist.display());
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&out_dir)
            .arg(sdist)
            .output()?;

        if !output.status.success() {
            tracing::warn!(
                "build command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(StoreError::BuildFailed(sdist.display().to_string()));
        }

        for entry in std::fs::read_dir(&out_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "whl") {
                return Ok(path);
            }
        }

        tracing::warn!("build command produced no binary artifact");
        Err(StoreError::BuildFailed(sdist.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_command_split() {
        let builder = CommandBuilder::new(&[
            "python".to_string(),
            "-m".to_string(),
            "pip".to_string(),
        ])
        .unwrap();
        assert_eq!(builder.program, "python");
        assert_eq!(builder.args, vec!["-m", "pip"]);

        assert!(CommandBuilder::new(&[]).is_none());
    }

    #[test]
    fn test_failing_command_is_build_failed() {
        let tmp = TempDir::new().unwrap();
        let sdist = tmp.path().join("demo-1.0.tar.gz");
        std::fs::write(&sdist, b"not really an archive").unwrap();

        // `false` ignores its arguments and exits nonzero.
        let builder = CommandBuilder::new(&["false".to_string()]).unwrap();
        let err = builder.build(&sdist).unwrap_err();
        assert!(matches!(err, StoreError::BuildFailed(_)));
    }

    #[test]
    fn test_successful_command_without_output_is_build_failed() {
        let tmp = TempDir::new().unwrap();
        let sdist = tmp.path().join("demo-1.0.tar.gz");
        std::fs::write(&sdist, b"bytes").unwrap();

        // `true` succeeds but produces nothing.
        let builder = CommandBuilder::new(&["true".to_string()]).unwrap();
        let err = builder.build(&sdist).unwrap_err();
        assert!(matches!(err, StoreError::BuildFailed(_)));
    }
}
