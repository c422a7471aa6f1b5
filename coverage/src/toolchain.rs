use std::{
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
};

use miette::Diagnostic;
use tokio::process::Command;

pub use futures::future::BoxFuture;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ToolchainError {
    #[error("failed to spawn `{program}`: {source}")]
    #[diagnostic(
        code(toolchain::spawn),
        help("make sure the go toolchain is installed and on PATH")
    )]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`covdata {subcommand}` exited with {status}: {stderr}")]
    #[diagnostic(code(toolchain::failed))]
    Failed {
        subcommand: &'static str,
        status: String,
        stderr: String,
    },
}

/// The external program that understands the binary coverage format.
///
/// `merge` combines every profile found in `input` into the directory
/// `output`. `report` renders the directory `input` into the text profile
/// `output`.
pub trait CoverageToolchain: Send + Sync {
    fn merge<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<(), ToolchainError>>;

    fn report<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<(), ToolchainError>>;
}

/// `go tool covdata`, invoked directly without a shell.
#[derive(Clone)]
pub struct GoCovdata {
    program: PathBuf,
}

impl fmt::Debug for GoCovdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoCovdata")
            .field("program", &self.program)
            .finish()
    }
}

impl Default for GoCovdata {
    fn default() -> Self {
        Self::new("go")
    }
}

impl GoCovdata {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, subcommand: &str, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("tool")
            .arg("covdata")
            .arg(subcommand)
            .arg(format!("-i={}", input.display()))
            .arg(format!("-o={}", output.display()))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn run(
        &self,
        subcommand: &'static str,
        input: &Path,
        output: &Path,
    ) -> Result<(), ToolchainError> {
        tracing::debug!(
            program = %self.program.display(),
            subcommand,
            input = %input.display(),
            output = %output.display(),
            "running covdata"
        );
        let out = self
            .command(subcommand, input, output)
            .output()
            .await
            .map_err(|source| ToolchainError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        if !out.status.success() {
            return Err(ToolchainError::Failed {
                subcommand,
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl CoverageToolchain for GoCovdata {
    fn merge<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<(), ToolchainError>> {
        Box::pin(self.run("merge", input, output))
    }

    fn report<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<(), ToolchainError>> {
        Box::pin(self.run("textfmt", input, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_are_passed_without_a_shell() {
        let tool = GoCovdata::new("/usr/local/go/bin/go");
        let cmd = tool.command("merge", Path::new("/tmp/in dir"), Path::new("/tmp/out;rm"));
        let std = cmd.as_std();
        assert_eq!(std.get_program(), "/usr/local/go/bin/go");
        let args: Vec<_> = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["tool", "covdata", "merge", "-i=/tmp/in dir", "-o=/tmp/out;rm"]
        );
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let tool = GoCovdata::new("/nonexistent/ephemera-go");
        let err = tool
            .merge(Path::new("/tmp"), Path::new("/tmp/out"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolchainError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-go");
        std::fs::write(&script, "#!/bin/sh\necho \"bad profile\" >&2\nexit 3\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = GoCovdata::new(&script)
            .report(dir.path(), &dir.path().join("cover.out"))
            .await
            .unwrap_err();
        let ToolchainError::Failed { subcommand, stderr, .. } = err else {
            panic!("expected Failed, got {err:?}");
        };
        assert_eq!(subcommand, "textfmt");
        assert_eq!(stderr, "bad profile");
    }
}
