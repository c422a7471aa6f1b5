use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
};

use ephemera_cluster::names::random_letters;

use crate::LifecycleError;

/// Where step outputs go: the file named by `GITHUB_OUTPUT`, or stdout when
/// running outside a pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutputs {
    File(PathBuf),
    Stdout,
}

impl StepOutputs {
    pub fn new(github_output: Option<PathBuf>) -> Self {
        match github_output {
            Some(path) if !path.as_os_str().is_empty() => Self::File(path),
            _ => Self::Stdout,
        }
    }

    pub fn emit(&self, key: &str, value: &str) -> Result<(), LifecycleError> {
        let line = format_output(key, value);
        match self {
            Self::File(path) => OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| file.write_all(line.as_bytes()))
                .map_err(|err| LifecycleError::io(path, err)),
            Self::Stdout => io::stdout()
                .lock()
                .write_all(line.as_bytes())
                .map_err(|err| LifecycleError::io("<stdout>", err)),
        }
    }
}

fn format_output(key: &str, value: &str) -> String {
    if !value.contains('\n') {
        return format!("{key}={value}\n");
    }
    let mut delimiter = format!("ephemera_{}", random_letters(16));
    while value.contains(&delimiter) {
        delimiter = format!("ephemera_{}", random_letters(16));
    }
    let newline = if value.ends_with('\n') { "" } else { "\n" };
    format!("{key}<<{delimiter}\n{value}{newline}{delimiter}\n")
}
