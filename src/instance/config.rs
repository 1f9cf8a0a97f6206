//! Typed configuration for one named engine instance.

use std::collections::BTreeMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use secrecy::SecretString;

/// Instance name used when none is given.
pub const DEFAULT_INSTANCE_NAME: &str = "default";
const DEFAULT_ROLE: &str = "postgres";

/// Connection and server settings for one named instance.
///
/// The name is the only key correlating client and engine state. Settings are
/// kept sorted so the generated `-c key=value` flags are deterministic.
///
/// # Examples
///
/// ```
/// use pg0_client::InstanceConfig;
///
/// let config = InstanceConfig::builder("analytics")
///     .port(5433)
///     .database("warehouse")
///     .setting("shared_buffers", "512MB")
///     .build();
/// assert_eq!(config.name(), "analytics");
/// assert_eq!(config.port(), Some(5433));
/// assert_eq!(config.username(), "postgres");
/// ```
#[derive(Clone)]
pub struct InstanceConfig {
    name: String,
    port: Option<u16>,
    username: String,
    password: SecretString,
    database: String,
    data_dir: Option<Utf8PathBuf>,
    settings: BTreeMap<String, String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INSTANCE_NAME)
    }
}

impl fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceConfig")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("data_dir", &self.data_dir)
            .field("settings", &self.settings)
            .finish()
    }
}

impl InstanceConfig {
    /// Configuration for `name` with every other field at its default.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port: None,
            username: DEFAULT_ROLE.to_owned(),
            password: SecretString::from(DEFAULT_ROLE.to_owned()),
            database: DEFAULT_ROLE.to_owned(),
            data_dir: None,
            settings: BTreeMap::new(),
        }
    }

    /// Starts a builder for `name`.
    pub fn builder(name: impl Into<String>) -> InstanceConfigBuilder {
        InstanceConfigBuilder {
            config: Self::new(name),
        }
    }

    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested port; `None` lets the engine pick one.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Database role.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password for the role.
    #[must_use]
    pub const fn password(&self) -> &SecretString {
        &self.password
    }

    /// Database created on first start.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Custom data directory, when set.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Utf8Path> {
        self.data_dir.as_deref()
    }

    /// Server settings passed as `-c key=value`, sorted by key.
    #[must_use]
    pub const fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }
}

/// Builder for [`InstanceConfig`].
#[derive(Debug, Clone)]
#[must_use]
pub struct InstanceConfigBuilder {
    config: InstanceConfig,
}

impl InstanceConfigBuilder {
    /// Requests a fixed port.
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Sets the database role.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    /// Sets the role password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        let password: String = password.into();
        self.config.password = SecretString::from(password);
        self
    }

    /// Sets the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Places the instance data in `dir`.
    pub fn data_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    /// Adds one server setting, replacing any earlier value for `key`.
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.settings.insert(key.into(), value.into());
        self
    }

    /// Adds every setting yielded by `settings`.
    pub fn settings<K, V>(mut self, settings: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config
            .settings
            .extend(settings.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> InstanceConfig {
        self.config
    }
}
