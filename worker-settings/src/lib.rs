//! Process-wide configuration.
//!
//! Six fields are a fixed external contract (see the module docs on
//! [`Settings::from_env`]) and are read directly from the literal environment
//! variable names the control plane and model-server tooling expect. Everything
//! else is an internal tuning knob, merged the way `syncserver-settings` merges
//! its own internal knobs: through the `config` crate with a `WORKER_` prefix.
#[macro_use]
extern crate slog_scope;

use std::env::{self, VarError};

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

static PREFIX: &str = "worker";

/// Internal tuning knobs, merged from the environment with the `WORKER_` prefix.
///
/// These are distinct from the six mandatory boundary-contract variables read
/// directly by [`Settings::from_env`]: their names are ours to choose, so they
/// follow this lineage's usual `config`-crate convention instead.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
struct InternalSettings {
    human_logs: bool,
    model_server_host: String,
    benchmark_indicator_path: String,
}

impl Default for InternalSettings {
    fn default() -> Self {
        Self {
            human_logs: false,
            model_server_host: "127.0.0.1".to_owned(),
            benchmark_indicator_path: ".has_benchmark".to_owned(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),
    #[error("environment variable {0} was not valid unicode")]
    NotUnicode(String),
    #[error("{0} must be an integer, got {1:?}")]
    InvalidInt(&'static str, String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

fn require_var(name: &str) -> Result<String, SettingsError> {
    match env::var(name) {
        Ok(val) => Ok(val),
        Err(VarError::NotPresent) => Err(SettingsError::MissingVar(name.to_owned())),
        Err(VarError::NotUnicode(_)) => Err(SettingsError::NotUnicode(name.to_owned())),
    }
}

/// Process-wide configuration, assembled once at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    /// `VAST_TCP_PORT_$WORKER_PORT`, the numeric port this worker listens on.
    pub port: u16,
    /// `PUBLIC_IPADDR`, the advertised host.
    pub public_ipaddr: String,
    /// `USE_SSL == "true"`.
    pub use_ssl: bool,
    /// `CONTAINER_ID`, the integer node id sent to the autoscaler.
    pub container_id: i64,
    /// `REPORT_ADDR`, the base URL of the autoscaler.
    pub report_addr: String,
    /// `MODEL_LOG`, the path of the model server's log file to tail.
    pub model_log: String,

    /// TLS certificate path, fixed by convention when `use_ssl` is set.
    pub tls_cert_path: String,
    /// TLS key path, fixed by convention when `use_ssl` is set.
    pub tls_key_path: String,

    pub human_logs: bool,
    pub model_server_host: String,
    pub benchmark_indicator_path: String,
}

impl Settings {
    /// Assemble `Settings` from the environment.
    ///
    /// The six mandatory variables (`WORKER_PORT`, `PUBLIC_IPADDR`, `USE_SSL`,
    /// `CONTAINER_ID`, `REPORT_ADDR`, `MODEL_LOG`) are a fixed wire/ops
    /// contract with the control plane, so they're read with `std::env::var`
    /// rather than reshaped through a configurable prefix. Internal knobs are
    /// merged with `WORKER_` through the `config` crate, same as every other
    /// settings struct in this lineage.
    pub fn from_env() -> Result<Self, SettingsError> {
        let worker_port_name = require_var("WORKER_PORT")?;
        let tcp_port_var = format!("VAST_TCP_PORT_{}", worker_port_name);
        let port_str = require_var(&tcp_port_var)?;
        let port = port_str
            .parse::<u16>()
            .map_err(|_| SettingsError::InvalidInt("VAST_TCP_PORT_*", port_str))?;

        let public_ipaddr = require_var("PUBLIC_IPADDR")?;
        let use_ssl = require_var("USE_SSL").unwrap_or_else(|_| "false".to_owned()) == "true";
        let container_id_str = require_var("CONTAINER_ID")?;
        let container_id = container_id_str
            .parse::<i64>()
            .map_err(|_| SettingsError::InvalidInt("CONTAINER_ID", container_id_str))?;
        let report_addr = require_var("REPORT_ADDR")?;
        let model_log = require_var("MODEL_LOG")?;

        let mut c = Config::default();
        c.merge(Environment::with_prefix(&PREFIX.to_uppercase()).separator("__"))?;
        let internal: InternalSettings = match c.try_into() {
            Ok(internal) => internal,
            Err(ConfigError::Message(v)) => {
                error!("Configuration error: Value undefined {:?}", &v);
                return Err(ConfigError::NotFound(v).into());
            }
            Err(e) => {
                error!("Configuration error: Other: {:?}", &e);
                return Err(e.into());
            }
        };

        Ok(Settings {
            port,
            public_ipaddr,
            use_ssl,
            container_id,
            report_addr,
            model_log,
            tls_cert_path: "/etc/instance.crt".to_owned(),
            tls_key_path: "/etc/instance.key".to_owned(),
            human_logs: internal.human_logs,
            model_server_host: internal.model_server_host,
            benchmark_indicator_path: internal.benchmark_indicator_path,
        })
    }

    /// The URL the worker advertises to the autoscaler as its own reachable address.
    pub fn advertised_url(&self) -> String {
        format!(
            "http{}://{}:{}",
            if self.use_ssl { "s" } else { "" },
            self.public_ipaddr,
            self.port
        )
    }

    pub fn model_server_url(&self) -> String {
        format!("http://{}:5001", self.model_server_host)
    }

    pub fn banner(&self) -> String {
        format!(
            "{} (ssl: {}, model log: {})",
            self.advertised_url(),
            self.use_ssl,
            self.model_log
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// The six mandatory vars, scoped to the closure's lifetime via
    /// `temp_env` rather than set-then-manually-cleared -- avoids leaking
    /// state across tests that run in parallel in the same process.
    const REQUIRED_VARS: [(&str, Option<&str>); 7] = [
        ("WORKER_PORT", Some("main")),
        ("VAST_TCP_PORT_main", Some("18188")),
        ("PUBLIC_IPADDR", Some("1.2.3.4")),
        ("USE_SSL", Some("false")),
        ("CONTAINER_ID", Some("42")),
        ("REPORT_ADDR", Some("http://autoscaler.example")),
        ("MODEL_LOG", Some("/tmp/model.log")),
    ];

    #[test]
    fn settings_round_trip_from_env() {
        temp_env::with_vars(REQUIRED_VARS, || {
            let settings = Settings::from_env().expect("settings should load");
            assert_eq!(settings.advertised_url(), "http://1.2.3.4:18188");
            assert_eq!(settings.container_id, 42);
            assert_eq!(settings.report_addr, "http://autoscaler.example");
        });
    }

    #[test]
    fn missing_mandatory_var_fails_named() {
        let mut vars: Vec<(&str, Option<&str>)> = REQUIRED_VARS.to_vec();
        vars.retain(|(name, _)| *name != "REPORT_ADDR");
        vars.push(("REPORT_ADDR", None));
        temp_env::with_vars(vars, || {
            let err = Settings::from_env().expect_err("should fail without REPORT_ADDR");
            assert!(matches!(err, SettingsError::MissingVar(ref v) if v == "REPORT_ADDR"));
        });
    }

    #[test]
    fn use_ssl_flips_advertised_scheme() {
        let mut vars: Vec<(&str, Option<&str>)> = REQUIRED_VARS.to_vec();
        vars.retain(|(name, _)| *name != "USE_SSL");
        vars.push(("USE_SSL", Some("true")));
        temp_env::with_vars(vars, || {
            let settings = Settings::from_env().expect("settings should load");
            assert_eq!(settings.advertised_url(), "https://1.2.3.4:18188");
        });
    }
}
