use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_API_VERSION: &str = "2025-01-01-preview";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub name: String,
    pub user: String,
    pub password: String,
    pub trust_server_certificate: bool,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub deployment: String,
    pub api_key: String,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Index named in the environment. Not what the generator sends.
    pub index_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub web: WebConfig,
    pub debug: bool,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,
}

// Flat view of every source; environment keys may arrive in either case.
#[derive(Debug, Deserialize, Default)]
struct RawSettings {
    #[serde(default)]
    web: WebConfig,
    #[serde(alias = "SQLSERVER_HOST")]
    sqlserver_host: Option<String>,
    #[serde(alias = "SQLSERVER_DB")]
    sqlserver_db: Option<String>,
    #[serde(alias = "SQLSERVER_USER")]
    sqlserver_user: Option<String>,
    #[serde(alias = "SQLSERVER_PWD")]
    sqlserver_pwd: Option<String>,
    #[serde(alias = "SQLSERVER_TRUST_CERT")]
    sqlserver_trust_cert: Option<String>,
    #[serde(alias = "AZURE_OAI_ENDPOINT")]
    azure_oai_endpoint: Option<String>,
    #[serde(alias = "AZURE_OAI_MODEL")]
    azure_oai_model: Option<String>,
    #[serde(alias = "AZURE_OAI_API_KEY")]
    azure_oai_api_key: Option<String>,
    #[serde(alias = "AZURE_OAI_API_VERSION")]
    azure_oai_api_version: Option<String>,
    #[serde(alias = "AZURE_SEARCH_EP")]
    azure_search_ep: Option<String>,
    #[serde(alias = "AZURE_SEARCH_KEY")]
    azure_search_key: Option<String>,
    #[serde(alias = "AZURE_SEARCH_INDEX")]
    azure_search_index: Option<String>,
    #[serde(alias = "IS_DEBUGGING_ENABLED")]
    is_debugging_enabled: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        Self::load(args, Environment::default())
    }

    /// Builds the configuration from an optional file plus the given
    /// environment source, then applies command line overrides.
    pub fn load(args: &CliArgs, env: Environment) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = [
                "config.toml",
                "config/config.toml",
                "/etc/nl-sql-explorer/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, FileFormat::Toml));
                    break;
                }
            }
        }

        let raw: RawSettings = config_builder.add_source(env).build()?.try_deserialize()?;
        let mut config = Self::from_raw(raw)?;

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }

        Ok(config)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig {
                host: required(raw.sqlserver_host, "SQLSERVER_HOST")?,
                name: required(raw.sqlserver_db, "SQLSERVER_DB")?,
                user: required(raw.sqlserver_user, "SQLSERVER_USER")?,
                password: required(raw.sqlserver_pwd, "SQLSERVER_PWD")?,
                trust_server_certificate: raw
                    .sqlserver_trust_cert
                    .map(|v| is_true(&v))
                    .unwrap_or(true),
            },
            llm: LlmConfig {
                endpoint: required(raw.azure_oai_endpoint, "AZURE_OAI_ENDPOINT")?,
                deployment: required(raw.azure_oai_model, "AZURE_OAI_MODEL")?,
                api_key: required(raw.azure_oai_api_key, "AZURE_OAI_API_KEY")?,
                api_version: raw
                    .azure_oai_api_version
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            },
            search: SearchConfig {
                endpoint: required(raw.azure_search_ep, "AZURE_SEARCH_EP")?,
                api_key: required(raw.azure_search_key, "AZURE_SEARCH_KEY")?,
                index_name: raw.azure_search_index.filter(|v| !v.trim().is_empty()),
            },
            web: raw.web,
            debug: raw.is_debugging_enabled.is_some_and(|v| is_true(&v)),
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<String, String> {
        [
            ("SQLSERVER_HOST", "db.internal,1433"),
            ("SQLSERVER_DB", "sales"),
            ("SQLSERVER_USER", "reader"),
            ("SQLSERVER_PWD", "secret"),
            ("AZURE_OAI_ENDPOINT", "https://example.openai.azure.com/"),
            ("AZURE_OAI_MODEL", "gpt-4o"),
            ("AZURE_OAI_API_KEY", "oai-key"),
            ("AZURE_SEARCH_EP", "https://example.search.windows.net"),
            ("AZURE_SEARCH_KEY", "search-key"),
            ("AZURE_SEARCH_INDEX", "patterns"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn load(env: HashMap<String, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::load(&CliArgs::default(), Environment::default().source(Some(env)))
    }

    #[test]
    fn loads_every_setting_from_environment() {
        let config = load(full_env()).unwrap();

        assert_eq!(config.database.host, "db.internal,1433");
        assert_eq!(config.database.name, "sales");
        assert_eq!(config.database.user, "reader");
        assert_eq!(config.database.password, "secret");
        assert!(config.database.trust_server_certificate);
        assert_eq!(config.llm.deployment, "gpt-4o");
        assert_eq!(config.llm.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.search.api_key, "search-key");
        assert_eq!(config.search.index_name.as_deref(), Some("patterns"));
        assert_eq!(config.web.port, 8501);
        assert!(!config.debug);
    }

    #[test]
    fn missing_setting_is_reported_by_variable_name() {
        let mut env = full_env();
        env.remove("AZURE_OAI_API_KEY");

        match load(env) {
            Err(ConfigError::Missing(name)) => assert_eq!(name, "AZURE_OAI_API_KEY"),
            other => panic!("expected missing key error, got {:?}", other),
        }
    }

    #[test]
    fn blank_setting_counts_as_missing() {
        let mut env = full_env();
        env.insert("SQLSERVER_PWD".to_string(), "   ".to_string());

        assert!(matches!(load(env), Err(ConfigError::Missing("SQLSERVER_PWD"))));
    }

    #[test]
    fn debug_flag_is_case_insensitive() {
        for (value, expected) in [("TRUE", true), ("True", true), ("true", true), ("yes", false), ("1", false)] {
            let mut env = full_env();
            env.insert("IS_DEBUGGING_ENABLED".to_string(), value.to_string());
            assert_eq!(load(env).unwrap().debug, expected, "value {:?}", value);
        }
    }

    fn write_toml(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("nl-sql-explorer-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn load_file(path: PathBuf, env: HashMap<String, String>) -> Result<AppConfig, ConfigError> {
        let args = CliArgs {
            config: Some(path),
            ..Default::default()
        };
        AppConfig::load(&args, Environment::default().source(Some(env)))
    }

    #[test]
    fn partial_web_table_falls_back_to_defaults() {
        let path = write_toml("partial-web", "[web]\nport = 9000\n");
        let config = load_file(path.clone(), full_env()).unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(config.web.port, 9000);
        assert_eq!(config.web.host, "127.0.0.1");
    }

    #[test]
    fn example_file_settings_are_read_when_uncommented() {
        let example = include_str!("../config.example.toml");
        let uncommented: String = example
            .lines()
            .map(|line| match line.strip_prefix("# ") {
                Some(rest) if rest.contains(" = ") => rest,
                _ => line,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let path = write_toml("example", &uncommented);

        let secrets: HashMap<String, String> = [
            ("SQLSERVER_USER", "reader"),
            ("SQLSERVER_PWD", "secret"),
            ("AZURE_OAI_API_KEY", "oai-key"),
            ("AZURE_SEARCH_KEY", "search-key"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = load_file(path.clone(), secrets).unwrap();
        std::fs::remove_file(path).ok();

        assert_eq!(config.database.host, "myserver.database.windows.net,1433");
        assert_eq!(config.database.name, "sales");
        assert_eq!(config.llm.deployment, "gpt-4o");
        assert_eq!(config.search.index_name.as_deref(), Some("my-index"));
        assert_eq!(config.web.port, 8501);
    }

    #[test]
    fn command_line_overrides_bind_address() {
        let args = CliArgs {
            host: Some("0.0.0.0".to_string()),
            port: Some(9000),
            ..Default::default()
        };
        let config = AppConfig::load(&args, Environment::default().source(Some(full_env()))).unwrap();

        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.web.port, 9000);
    }
}
