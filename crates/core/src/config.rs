use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rate_limit::RateLimitPolicy;

const MAX_WINDOW_SECS: u64 = 86_400;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub salesforce: SalesforceConfig,
    pub access: AccessConfig,
    pub limits: LimitsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SalesforceConfig {
    pub instance_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub api_version: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AccessConfig {
    pub user_email: String,
    pub manager_email: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LimitsConfig {
    pub max_creates_per_window: u32,
    pub create_window_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub instance_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_email: Option<String>,
    pub manager_email: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            salesforce: SalesforceConfig {
                instance_url: String::new(),
                client_id: String::new(),
                client_secret: String::new().into(),
                api_version: "v62.0".to_string(),
                timeout_secs: 30,
            },
            access: AccessConfig { user_email: String::new(), manager_email: None },
            limits: LimitsConfig { max_creates_per_window: 5, create_window_secs: 60 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl SalesforceConfig {
    /// REST root for the configured API version, e.g. `https://x.my.salesforce.com/services/data/v62.0`.
    pub fn data_url(&self) -> String {
        format!("{}/services/data/{}", self.instance_root(), self.api_version)
    }

    pub fn token_url(&self) -> String {
        format!("{}/services/oauth2/token", self.instance_root())
    }

    fn instance_root(&self) -> &str {
        self.instance_url.trim().trim_end_matches('/')
    }
}

impl LimitsConfig {
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            max_per_window: self.max_creates_per_window as usize,
            window: Duration::seconds(self.create_window_secs.min(MAX_WINDOW_SECS) as i64),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("impltrack.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(salesforce) = patch.salesforce {
            if let Some(instance_url) = salesforce.instance_url {
                self.salesforce.instance_url = instance_url;
            }
            if let Some(client_id) = salesforce.client_id {
                self.salesforce.client_id = client_id;
            }
            if let Some(client_secret_value) = salesforce.client_secret {
                self.salesforce.client_secret = secret_value(client_secret_value);
            }
            if let Some(api_version) = salesforce.api_version {
                self.salesforce.api_version = api_version;
            }
            if let Some(timeout_secs) = salesforce.timeout_secs {
                self.salesforce.timeout_secs = timeout_secs;
            }
        }

        if let Some(access) = patch.access {
            if let Some(user_email) = access.user_email {
                self.access.user_email = user_email;
            }
            if let Some(manager_email) = access.manager_email {
                self.access.manager_email = Some(manager_email);
            }
        }

        if let Some(limits) = patch.limits {
            if let Some(max_creates_per_window) = limits.max_creates_per_window {
                self.limits.max_creates_per_window = max_creates_per_window;
            }
            if let Some(create_window_secs) = limits.create_window_secs {
                self.limits.create_window_secs = create_window_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SF_INSTANCE_URL") {
            self.salesforce.instance_url = value;
        }
        if let Some(value) = read_env("SF_CLIENT_ID") {
            self.salesforce.client_id = value;
        }
        if let Some(value) = read_env("SF_CLIENT_SECRET") {
            self.salesforce.client_secret = secret_value(value);
        }
        if let Some(value) = read_env("SF_API_VERSION") {
            self.salesforce.api_version = value;
        }
        if let Some(value) = read_env("SF_TIMEOUT_SECS") {
            self.salesforce.timeout_secs = parse_u64("SF_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SF_USER_EMAIL") {
            self.access.user_email = value;
        }
        if let Some(value) = read_env("SF_MANAGER_EMAIL") {
            self.access.manager_email = Some(value);
        }

        if let Some(value) = read_env("IMPLTRACK_MAX_CREATES_PER_WINDOW") {
            self.limits.max_creates_per_window =
                parse_u32("IMPLTRACK_MAX_CREATES_PER_WINDOW", &value)?;
        }
        if let Some(value) = read_env("IMPLTRACK_CREATE_WINDOW_SECS") {
            self.limits.create_window_secs = parse_u64("IMPLTRACK_CREATE_WINDOW_SECS", &value)?;
        }

        let log_level =
            read_env("IMPLTRACK_LOGGING_LEVEL").or_else(|| read_env("IMPLTRACK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("IMPLTRACK_LOGGING_FORMAT").or_else(|| read_env("IMPLTRACK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(instance_url) = overrides.instance_url {
            self.salesforce.instance_url = instance_url;
        }
        if let Some(client_id) = overrides.client_id {
            self.salesforce.client_id = client_id;
        }
        if let Some(client_secret) = overrides.client_secret {
            self.salesforce.client_secret = secret_value(client_secret);
        }
        if let Some(user_email) = overrides.user_email {
            self.access.user_email = user_email;
        }
        if let Some(manager_email) = overrides.manager_email {
            self.access.manager_email = Some(manager_email);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_salesforce(&self.salesforce)?;
        validate_access(&self.access)?;
        validate_limits(&self.limits)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("impltrack.toml"), PathBuf::from("config/impltrack.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_salesforce(salesforce: &SalesforceConfig) -> Result<(), ConfigError> {
    let instance_url = salesforce.instance_url.trim();
    if instance_url.is_empty() {
        return Err(ConfigError::Validation(
            "salesforce.instance_url is required (set SF_INSTANCE_URL)".to_string(),
        ));
    }
    if !instance_url.starts_with("http://") && !instance_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "salesforce.instance_url must start with http:// or https://".to_string(),
        ));
    }

    if salesforce.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "salesforce.client_id is required (set SF_CLIENT_ID)".to_string(),
        ));
    }
    if salesforce.client_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "salesforce.client_secret is required (set SF_CLIENT_SECRET)".to_string(),
        ));
    }

    if !salesforce.api_version.starts_with('v') {
        return Err(ConfigError::Validation(format!(
            "salesforce.api_version must look like `v62.0`, got `{}`",
            salesforce.api_version
        )));
    }

    if salesforce.timeout_secs == 0 || salesforce.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "salesforce.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_access(access: &AccessConfig) -> Result<(), ConfigError> {
    let email = access.user_email.trim();
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "access.user_email is required (set SF_USER_EMAIL)".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(ConfigError::Validation(format!(
            "access.user_email `{email}` is not an email address"
        )));
    }

    if let Some(manager_email) = &access.manager_email {
        let manager_email = manager_email.trim();
        if !manager_email.is_empty() && !manager_email.contains('@') {
            return Err(ConfigError::Validation(format!(
                "access.manager_email `{manager_email}` is not an email address"
            )));
        }
    }

    Ok(())
}

fn validate_limits(limits: &LimitsConfig) -> Result<(), ConfigError> {
    if limits.max_creates_per_window == 0 {
        return Err(ConfigError::Validation(
            "limits.max_creates_per_window must be greater than zero".to_string(),
        ));
    }
    if limits.create_window_secs == 0 || limits.create_window_secs > MAX_WINDOW_SECS {
        return Err(ConfigError::Validation(
            "limits.create_window_secs must be in range 1..=86400".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    salesforce: Option<SalesforcePatch>,
    access: Option<AccessPatch>,
    limits: Option<LimitsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SalesforcePatch {
    instance_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AccessPatch {
    user_email: Option<String>,
    manager_email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LimitsPatch {
    max_creates_per_window: Option<u32>,
    create_window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
