use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use crate::{ConfigError, Result};

pub const ENV_PREFIX: &str = "EPHEMERA_";

/// Names accepted from older pipelines, mapped to the key they stand for.
/// Reading one logs a deprecation warning. Generic names such as
/// `NAMESPACE` or `URL` are left out: CI runners set them for other tools.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("STORAGE_CLASS_NAME", "STORAGE_CLASS"),
    ("PVC_ACCESS_MODE", "ACCESS_MODES"),
    ("PRIVATE_REGISTRY", "REGISTRY"),
    ("CLAIM_NAME", "CHAIN_CLAIM"),
    ("API_SERVER", "API_SERVER"),
    ("COVERFILE", "COVERFILE"),
];

/// Variables set by the platform rather than by the user.
const AMBIENT: &[(&str, &str)] = &[
    ("KUBECONFIG", "KUBECONFIG"),
    ("COVERDIR", "COVERDIR"),
    ("PORT", "PORT"),
];

/// Everything the environment can configure. Command-line flags take
/// precedence over these.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    pub state_file: Option<PathBuf>,
    /// A kubeconfig path or inline document, see
    /// [`crate::resolve_kubeconfig_input`].
    pub kubeconfig: Option<String>,
    pub api_server: Option<String>,
    pub namespace: Option<String>,
    pub tag: Option<String>,
    pub storage_class: Option<String>,
    pub storage_size: Option<String>,
    pub access_modes: Vec<String>,
    pub registry: Option<String>,
    pub image: Option<String>,
    pub chain_claim: Option<String>,
    pub harden: Option<bool>,
    pub url: Option<String>,
    pub coverfile: Option<PathBuf>,
    pub coverdir: Option<PathBuf>,
    pub port: Option<u16>,
    pub timeout: Option<Duration>,
    pub max_artifact_bytes: Option<u64>,
    pub go_binary: Option<PathBuf>,
    pub github_output: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_env_map(&std::env::vars().collect())
    }

    /// Empty values count as unset.
    pub fn from_env_map(env: &BTreeMap<String, String>) -> Result<Self> {
        let lookup = Lookup { env };
        Ok(Self {
            state_file: lookup.get("STATE_FILE").map(PathBuf::from),
            kubeconfig: lookup.get("KUBECONFIG"),
            api_server: lookup.get("API_SERVER"),
            namespace: lookup.get("NAMESPACE"),
            tag: lookup.get("TAG"),
            storage_class: lookup.get("STORAGE_CLASS"),
            storage_size: lookup.get("STORAGE_SIZE"),
            access_modes: lookup
                .get("ACCESS_MODES")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
            registry: lookup.get("REGISTRY"),
            image: lookup.get("IMAGE"),
            chain_claim: lookup.get("CHAIN_CLAIM"),
            harden: lookup.parsed("HARDEN", parse_bool)?,
            url: lookup.get("URL"),
            coverfile: lookup.get("COVERFILE").map(PathBuf::from),
            coverdir: lookup.get("COVERDIR").map(PathBuf::from),
            port: lookup.parsed("PORT", |raw| raw.parse::<u16>().ok())?,
            timeout: lookup.parsed("TIMEOUT", parse_duration)?,
            max_artifact_bytes: lookup.parsed("MAX_ARTIFACT_BYTES", |raw| raw.parse().ok())?,
            go_binary: lookup.get("GO").map(PathBuf::from),
            github_output: env
                .get("GITHUB_OUTPUT")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

struct Lookup<'a> {
    env: &'a BTreeMap<String, String>,
}

impl Lookup<'_> {
    fn value(&self, name: &str) -> Option<String> {
        self.env
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.value(&format!("{ENV_PREFIX}{key}")) {
            return Some(value);
        }
        for (legacy, target) in LEGACY_ALIASES {
            if *target == key
                && let Some(value) = self.value(legacy)
            {
                tracing::warn!(
                    "{legacy} is deprecated, set {ENV_PREFIX}{key} instead"
                );
                return Some(value);
            }
        }
        AMBIENT
            .iter()
            .filter(|(_, target)| *target == key)
            .find_map(|(name, _)| self.value(name))
    }

    fn parsed<T>(&self, key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Result<Option<T>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        parse(&raw).map(Some).ok_or_else(|| {
            ConfigError::invalid(format!("{ENV_PREFIX}{key}"), format!("cannot parse {raw:?}"))
        })
    }
}

/// Comma separated, blanks dropped.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whole seconds, optionally suffixed with `s`, `m` or `h`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let (digits, unit) = match raw.char_indices().last()? {
        (i, 's') => (&raw[..i], 1),
        (i, 'm') => (&raw[..i], 60),
        (i, 'h') => (&raw[..i], 3600),
        _ => (raw, 1),
    };
    let value: u64 = digits.trim().parse().ok()?;
    value.checked_mul(unit).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn prefixed_keys_are_read() {
        let settings = Settings::from_env_map(&env(&[
            ("EPHEMERA_NAMESPACE", "ns1"),
            ("EPHEMERA_STORAGE_CLASS", "standard"),
            ("EPHEMERA_ACCESS_MODES", "ReadWriteOnce, ReadWriteMany,"),
            ("EPHEMERA_HARDEN", "TRUE"),
            ("EPHEMERA_TIMEOUT", "3m"),
            ("EPHEMERA_MAX_ARTIFACT_BYTES", "1024"),
            ("GITHUB_OUTPUT", "/tmp/out"),
        ]))
        .unwrap();
        assert_eq!(settings.namespace.as_deref(), Some("ns1"));
        assert_eq!(settings.storage_class.as_deref(), Some("standard"));
        assert_eq!(settings.access_modes, ["ReadWriteOnce", "ReadWriteMany"]);
        assert_eq!(settings.harden, Some(true));
        assert_eq!(settings.timeout, Some(Duration::from_secs(180)));
        assert_eq!(settings.max_artifact_bytes, Some(1024));
        assert_eq!(settings.github_output, Some(PathBuf::from("/tmp/out")));
        assert_eq!(settings.url, None);
    }

    #[test]
    fn legacy_names_fill_in_but_never_override() {
        let settings = Settings::from_env_map(&env(&[
            ("STORAGE_CLASS_NAME", "legacy"),
            ("PVC_ACCESS_MODE", "ReadWriteOnce"),
            ("PRIVATE_REGISTRY", "registry.local:5000"),
            ("CLAIM_NAME", "previous"),
            ("COVERFILE", "/tmp/legacy.out"),
            ("EPHEMERA_COVERFILE", "/tmp/cover.out"),
        ]))
        .unwrap();
        assert_eq!(settings.storage_class.as_deref(), Some("legacy"));
        assert_eq!(settings.access_modes, ["ReadWriteOnce"]);
        assert_eq!(settings.registry.as_deref(), Some("registry.local:5000"));
        assert_eq!(settings.chain_claim.as_deref(), Some("previous"));
        assert_eq!(settings.coverfile, Some(PathBuf::from("/tmp/cover.out")));
    }

    #[test]
    fn generic_runner_variables_are_ignored() {
        let settings = Settings::from_env_map(&env(&[
            ("NAMESPACE", "someone-elses"),
            ("TAG", "latest"),
            ("REGISTRY", "docker.io"),
            ("SERVER", "http://10.0.0.7"),
            ("URL", "http://10.0.0.8"),
        ]))
        .unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn workload_variables_are_read_unprefixed() {
        let settings = Settings::from_env_map(&env(&[
            ("COVERDIR", "/tmp/coverdir"),
            ("PORT", "9090"),
            ("KUBECONFIG", "~/.kube/config"),
        ]))
        .unwrap();
        assert_eq!(settings.coverdir, Some(PathBuf::from("/tmp/coverdir")));
        assert_eq!(settings.port, Some(9090));
        assert_eq!(settings.kubeconfig.as_deref(), Some("~/.kube/config"));
    }

    #[test]
    fn empty_values_are_unset() {
        let settings =
            Settings::from_env_map(&env(&[("EPHEMERA_NAMESPACE", "  "), ("CLAIM_NAME", "")]))
                .unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn unparsable_values_name_the_variable() {
        let err = Settings::from_env_map(&env(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::invalid("EPHEMERA_PORT", "cannot parse \"eighty\"")
        );
        let err = Settings::from_env_map(&env(&[("EPHEMERA_HARDEN", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("EPHEMERA_HARDEN"), "{err}");
    }

    #[test]
    fn durations_accept_units() {
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("m"), None);
        assert_eq!(parse_duration(""), None);
    }
}
