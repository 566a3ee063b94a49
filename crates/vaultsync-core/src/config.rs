//! Configuration module for Vaultsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, saving, environment overlay, validation, override resolution
//! and a builder pattern for programmatic use.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::{BackupTarget, CronExpr, DatabaseTarget, DomainError, Schedule, ScheduleRegistry};

/// Prefix of every environment variable read by [`Config::apply_env`].
pub const ENV_PREFIX: &str = "VAULTSYNC_";

/// Placeholder shown instead of secrets by [`Config::redacted`].
const REDACTED: &str = "********";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Vaultsync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StoreConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedules: Vec<Schedule>,
}

/// Object store credentials, bucket and key prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Key prefix for database dumps.
    pub database_prefix: String,
    /// Key prefix for mirrored directory trees.
    pub directory_prefix: String,
    /// Custom endpoint. `file://<dir>` and `memory://` select non-S3 backends.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
}

/// Per-schedule storage override. Absent or empty fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialStoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Database connection settings used by database backups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            password: String::new(),
            name: String::new(),
        }
    }
}

/// Which object store backend a [`StoreConfig`] points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Amazon S3, or an S3-compatible service when `endpoint` is set
    S3 { endpoint: Option<String> },
    /// A directory on the local filesystem
    Local(PathBuf),
    /// Process-local in-memory store
    Memory,
}

// ---------------------------------------------------------------------------
// Override resolution
// ---------------------------------------------------------------------------

/// Picks the override when it carries a non-empty value.
fn pick(base: &str, over: Option<&String>) -> String {
    match over {
        Some(value) if !value.is_empty() => value.clone(),
        _ => base.to_string(),
    }
}

impl StoreConfig {
    /// Returns the effective store configuration for an optional override.
    ///
    /// Every non-empty field of `over` wins; everything else is taken from
    /// `self`. With no override the base is returned unchanged.
    pub fn resolve(&self, over: Option<&PartialStoreConfig>) -> StoreConfig {
        let Some(over) = over else {
            return self.clone();
        };
        StoreConfig {
            region: pick(&self.region, over.region.as_ref()),
            access_key_id: pick(&self.access_key_id, over.access_key_id.as_ref()),
            secret_access_key: pick(&self.secret_access_key, over.secret_access_key.as_ref()),
            bucket: pick(&self.bucket, over.bucket.as_ref()),
            database_prefix: pick(&self.database_prefix, over.database_prefix.as_ref()),
            directory_prefix: pick(&self.directory_prefix, over.directory_prefix.as_ref()),
            endpoint: pick(&self.endpoint, over.endpoint.as_ref()),
        }
    }

    /// Backend selected by the endpoint scheme.
    pub fn backend(&self) -> StoreBackend {
        let endpoint = self.endpoint.trim();
        if let Some(dir) = endpoint.strip_prefix("file://") {
            StoreBackend::Local(PathBuf::from(dir))
        } else if endpoint.starts_with("memory://") {
            StoreBackend::Memory
        } else if endpoint.is_empty() {
            StoreBackend::S3 { endpoint: None }
        } else {
            StoreBackend::S3 {
                endpoint: Some(endpoint.to_string()),
            }
        }
    }
}

impl DatabaseConfig {
    /// Returns the effective connection settings for a database target.
    ///
    /// Uses the same inheritance rule as [`StoreConfig::resolve`]; a port of
    /// zero counts as absent.
    pub fn resolve(&self, target: Option<&DatabaseTarget>) -> DatabaseConfig {
        let Some(target) = target else {
            return self.clone();
        };
        DatabaseConfig {
            host: pick(&self.host, target.host.as_ref()),
            port: match target.port {
                Some(port) if port != 0 => port,
                _ => self.port,
            },
            user: pick(&self.user, target.user.as_ref()),
            password: pick(&self.password, target.password.as_ref()),
            name: pick(&self.name, target.name.as_ref()),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::load() / save()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path`, falling back to [`Config::default`] when the file
    /// does not exist. A file that exists but cannot be parsed is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Serialize the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
        }
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/vaultsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("vaultsync")
            .join("config.yaml")
    }

    /// Build a registry holding this configuration's schedules.
    pub fn registry(&self) -> ScheduleRegistry {
        ScheduleRegistry::from_schedules(self.schedules.iter().cloned())
    }

    /// Replace the persisted schedules with the registry's current contents.
    pub fn set_schedules(&mut self, registry: &ScheduleRegistry) {
        self.schedules = registry.list();
    }
}

// ---------------------------------------------------------------------------
// Environment overlay
// ---------------------------------------------------------------------------

impl Config {
    /// Overlay `VAULTSYNC_*` environment variables onto this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidConfig`] if `VAULTSYNC_DATABASE_PORT` is
    /// not a valid port number.
    pub fn apply_env(&mut self) -> Result<(), DomainError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay variables obtained from `lookup`. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}")).filter(|value| !value.is_empty())
        };

        let storage = &mut self.storage;
        let string_fields: [(&str, &mut String); 7] = [
            ("STORAGE_REGION", &mut storage.region),
            ("STORAGE_ACCESS_KEY_ID", &mut storage.access_key_id),
            ("STORAGE_SECRET_ACCESS_KEY", &mut storage.secret_access_key),
            ("STORAGE_BUCKET", &mut storage.bucket),
            ("STORAGE_DATABASE_PREFIX", &mut storage.database_prefix),
            ("STORAGE_DIRECTORY_PREFIX", &mut storage.directory_prefix),
            ("STORAGE_ENDPOINT", &mut storage.endpoint),
        ];
        for (suffix, field) in string_fields {
            if let Some(value) = get(suffix) {
                *field = value;
            }
        }

        let database = &mut self.database;
        let string_fields: [(&str, &mut String); 4] = [
            ("DATABASE_HOST", &mut database.host),
            ("DATABASE_USER", &mut database.user),
            ("DATABASE_PASSWORD", &mut database.password),
            ("DATABASE_NAME", &mut database.name),
        ];
        for (suffix, field) in string_fields {
            if let Some(value) = get(suffix) {
                *field = value;
            }
        }

        if let Some(port) = get("DATABASE_PORT") {
            database.port = port.trim().parse().map_err(|_| {
                DomainError::config(
                    "database.port",
                    format!("{ENV_PREFIX}DATABASE_PORT is not a valid port: {port}"),
                )
            })?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"storage.bucket"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl From<ValidationError> for DomainError {
    fn from(err: ValidationError) -> Self {
        DomainError::config(err.field, err.message)
    }
}

/// Validates the fields every S3 store needs.
fn validate_store(store: &StoreConfig, field: &str, errors: &mut Vec<ValidationError>) {
    if !matches!(store.backend(), StoreBackend::S3 { .. }) {
        return;
    }
    if store.bucket.trim().is_empty() {
        errors.push(ValidationError::new(format!("{field}.bucket"), "is required"));
    }
    if store.region.trim().is_empty() {
        errors.push(ValidationError::new(format!("{field}.region"), "is required"));
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. Schedule expressions
    /// are not checked here, see [`Config::schedule_warnings`].
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- storage ---
        validate_store(&self.storage, "storage", &mut errors);

        // --- database ---
        if self.database.port == 0 {
            errors.push(ValidationError::new("database.port", "must be greater than 0"));
        }

        // --- schedules ---
        let mut seen = HashSet::new();
        for (index, schedule) in self.schedules.iter().enumerate() {
            let field = format!("schedules[{index}]");

            if schedule.name.trim().is_empty() {
                errors.push(ValidationError::new(format!("{field}.name"), "must not be empty"));
            } else if !seen.insert(schedule.name.as_str()) {
                errors.push(ValidationError::new(
                    format!("{field}.name"),
                    format!("duplicate schedule name '{}'", schedule.name),
                ));
            }

            if let BackupTarget::Directory(dir) = &schedule.target {
                if dir.source_path.as_os_str().is_empty() {
                    errors.push(ValidationError::new(
                        format!("{field}.target.source_path"),
                        "is required for directory schedules",
                    ));
                }
            }

            if schedule.storage.is_some() {
                let resolved = self.storage.resolve(schedule.storage.as_ref());
                validate_store(&resolved, &format!("{field}.storage"), &mut errors);
            }
        }

        errors
    }

    /// Schedules whose expression does not parse.
    ///
    /// These never make the configuration invalid: the trigger engine logs
    /// and skips each one while the remaining schedules keep running.
    pub fn schedule_warnings(&self) -> Vec<ValidationError> {
        self.schedules
            .iter()
            .enumerate()
            .filter_map(|(index, schedule)| {
                CronExpr::parse(&schedule.expression).err().map(|err| {
                    ValidationError::new(
                        format!("schedules[{index}].expression"),
                        err.to_string(),
                    )
                })
            })
            .collect()
    }

    /// Copy of this configuration with every secret masked.
    pub fn redacted(&self) -> Config {
        let mask = |value: &mut String| {
            if !value.is_empty() {
                *value = REDACTED.to_string();
            }
        };

        let mut config = self.clone();
        mask(&mut config.storage.secret_access_key);
        mask(&mut config.database.password);
        for schedule in &mut config.schedules {
            if let Some(storage) = schedule.storage.as_mut() {
                if let Some(secret) = storage.secret_access_key.as_mut() {
                    mask(secret);
                }
            }
            if let BackupTarget::Database(db) = &mut schedule.target {
                if let Some(password) = db.password.as_mut() {
                    mask(password);
                }
            }
        }
        config
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use vaultsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .storage_bucket("backups")
///     .storage_region("eu-west-1")
///     .database_name("app")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- storage ---

    pub fn storage_region(mut self, region: impl Into<String>) -> Self {
        self.config.storage.region = region.into();
        self
    }

    pub fn storage_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.config.storage.access_key_id = access_key_id.into();
        self.config.storage.secret_access_key = secret_access_key.into();
        self
    }

    pub fn storage_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.storage.bucket = bucket.into();
        self
    }

    pub fn storage_database_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.storage.database_prefix = prefix.into();
        self
    }

    pub fn storage_directory_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.storage.directory_prefix = prefix.into();
        self
    }

    pub fn storage_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.storage.endpoint = endpoint.into();
        self
    }

    // --- database ---

    pub fn database_host(mut self, host: impl Into<String>) -> Self {
        self.config.database.host = host.into();
        self
    }

    pub fn database_port(mut self, port: u16) -> Self {
        self.config.database.port = port;
        self
    }

    pub fn database_user(mut self, user: impl Into<String>) -> Self {
        self.config.database.user = user.into();
        self
    }

    pub fn database_password(mut self, password: impl Into<String>) -> Self {
        self.config.database.password = password.into();
        self
    }

    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.config.database.name = name.into();
        self
    }

    // --- schedules ---

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.config.schedules.push(schedule);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
