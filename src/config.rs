//! Layered daemon configuration.
//!
//! Settings resolve in order: built-in defaults, then an optional
//! `vqd.toml` file, then `VQD_*` environment variables (nested keys
//! separated by `__`, e.g. `VQD_PROXY__FRONTEND`). The file splits into
//! a `[proxy]` section for the broker and a `[worker]` section for the
//! worker manager.

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Broker endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Management-plane bind endpoint.
    pub mgmt: String,
    /// Client-facing bind endpoint.
    pub frontend: String,
    /// Worker-facing bind endpoint.
    pub backend: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            mgmt: "tcp://0.0.0.0:9999".to_owned(),
            frontend: "tcp://0.0.0.0:10123".to_owned(),
            backend: "tcp://0.0.0.0:10124".to_owned(),
        }
    }
}

/// Worker-manager settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Management-plane bind endpoint.
    pub mgmt: String,
    /// Broker endpoint workers connect to.
    pub proxy: String,
    /// Path to the credential store.
    pub db: String,
    /// Comma-separated formatter names to load.
    pub helpers: Option<String>,
    /// Worker task count; defaults to the CPU count when absent.
    pub concurrency: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mgmt: "tcp://0.0.0.0:10000".to_owned(),
            proxy: "tcp://localhost:10123".to_owned(),
            db: "vqd.db".to_owned(),
            helpers: None,
            concurrency: None,
        }
    }
}

impl WorkerConfig {
    /// The configured formatter names, trimmed and de-blanked.
    #[must_use]
    pub fn helper_names(&self) -> Vec<String> {
        self.helpers
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// The effective worker count.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.filter(|&n| n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }
}

/// The full configuration surface of the `vqd` binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    /// Broker settings.
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Worker-manager settings.
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load the configuration, layering file and environment over the
    /// defaults.
    ///
    /// With an explicit `path` the file must exist; without one,
    /// `vqd.toml` in the working directory is used when present.
    ///
    /// # Errors
    /// Returns an error when the file is missing (explicit path only),
    /// unreadable, or fails to deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match path {
            Some(path) => figment.merge(Toml::file_exact(path)),
            None => figment.merge(Toml::file("vqd.toml")),
        };
        figment
            .merge(Env::prefixed("VQD_").split("__"))
            .extract()
    }
}
