use std::path::{Path, PathBuf};

use crate::{ConfigError, Result};

/// Kubeconfig input is either a path to a file or the document itself.
/// A value naming an existing file is read; anything else is taken as the
/// document.
pub fn resolve_kubeconfig_input(input: &str) -> Result<String> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    resolve_with_home(input, home.as_deref())
}

fn resolve_with_home(input: &str, home: Option<&Path>) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::kubeconfig("no kubeconfig given"));
    }
    if !trimmed.contains('\n') {
        let path = expand_home(trimmed, home);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "loading kubeconfig from file");
            return std::fs::read_to_string(&path).map_err(|err| {
                ConfigError::kubeconfig(format!("failed to read {}: {err}", path.display()))
            });
        }
    }
    tracing::debug!("using inline kubeconfig");
    Ok(input.to_string())
}

pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INLINE: &str = "apiVersion: v1\nkind: Config\nclusters: []\n";

    #[test]
    fn existing_files_are_read() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir(home.path().join(".kube")).unwrap();
        std::fs::write(home.path().join(".kube/config"), INLINE).unwrap();

        let raw = resolve_with_home("~/.kube/config", Some(home.path())).unwrap();
        assert_eq!(raw, INLINE);
        let absolute = home.path().join(".kube/config");
        let raw = resolve_with_home(absolute.to_str().unwrap(), None).unwrap();
        assert_eq!(raw, INLINE);
    }

    #[test]
    fn anything_else_is_inline() {
        assert_eq!(resolve_with_home(INLINE, None).unwrap(), INLINE);
        assert_eq!(
            resolve_with_home("/does/not/exist", None).unwrap(),
            "/does/not/exist"
        );
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = resolve_with_home(" \n", None).unwrap_err();
        assert!(matches!(err, ConfigError::Kubeconfig(_)));
    }

    #[test]
    fn tilde_needs_a_home() {
        assert_eq!(expand_home("~/x", None), PathBuf::from("~/x"));
        assert_eq!(
            expand_home("~/x", Some(Path::new("/home/ci"))),
            PathBuf::from("/home/ci/x")
        );
    }
}
