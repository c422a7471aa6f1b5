use std::fmt;

use miette::Diagnostic;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: String, message: String },
    Kubeconfig(String),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn kubeconfig(message: impl Into<String>) -> Self {
        Self::Kubeconfig(message.into())
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Invalid { message, .. } | Self::Kubeconfig(message) => message.as_str(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { key, message } => write!(f, "invalid value for {key}: {message}"),
            Self::Kubeconfig(message) => write!(f, "kubeconfig: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Diagnostic for ConfigError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self {
            Self::Invalid { .. } => "config::invalid",
            Self::Kubeconfig(_) => "config::kubeconfig",
        };
        Some(Box::new(code))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
