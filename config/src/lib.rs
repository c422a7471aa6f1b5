//! Settings read from the process environment, and the kubeconfig input
//! that may be a path or a document.

mod env;
mod error;
mod kubeconfig;

pub use env::{ENV_PREFIX, Settings, parse_bool, parse_duration, parse_list};
pub use error::{ConfigError, Result};
pub use kubeconfig::{expand_home, resolve_kubeconfig_input};
