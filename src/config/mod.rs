//! Configuration types and loading.
//!
//! Configuration comes from a TOML file with one `[server]` table and one
//! table per logical connection name. Everything is resolved once at startup
//! and immutable afterwards; credentials never leave this module in
//! `Debug`/`Display` output.

use crate::error::{ConfigError, McpError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default row limit applied when neither `[server]` nor the profile sets one.
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// Default query timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Driver family tag selecting quirk handling for a class of ODBC drivers.
///
/// Families are declared in the config rather than sniffed out of connection
/// strings, so quirk selection stays a data lookup instead of control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverFamily {
    #[default]
    Generic,
    Providex,
    Sqlite,
}

impl DriverFamily {
    /// Parse a driver family from a string, accepting common aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "generic" | "odbc" => Some(Self::Generic),
            "providex" | "pvx" | "sage100" => Some(Self::Providex),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Providex => "providex",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Global `[server]` settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub default_connection: Option<String>,
    pub max_rows: usize,
    pub timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            default_connection: None,
            max_rows: DEFAULT_MAX_ROWS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// One logical connection: everything needed to open an ODBC session.
///
/// Immutable once loaded. `readonly` defaults to true; a profile is only
/// writable when the config says so explicitly.
#[derive(Clone)]
pub struct ConnectionProfile {
    pub name: String,
    pub connection_string: Option<String>,
    pub dsn: Option<String>,
    pub driver: Option<String>,
    pub server: Option<String>,
    pub database: Option<String>,
    pub username: Option<String>,
    password: Option<String>,
    /// Driver-specific extra attributes. Order is preserved from the config
    /// file because some drivers are sensitive to attribute order.
    pub extra_attrs: Vec<(String, String)>,
    pub readonly: bool,
    pub max_rows: usize,
    pub timeout: Duration,
    pub driver_family: DriverFamily,
}

impl ConnectionProfile {
    pub fn builder(name: impl Into<String>) -> ConnectionProfileBuilder {
        ConnectionProfileBuilder::new(name)
    }

    /// Full ODBC connection string, including credentials.
    ///
    /// A `connection_string` from the config wins outright; otherwise the
    /// string is assembled from parts in DSN, Driver, Server, Database,
    /// UID, PWD order, followed by the extra attributes in file order.
    pub fn odbc_connection_string(&self) -> String {
        if let Some(s) = &self.connection_string {
            return s.clone();
        }

        let mut parts = Vec::new();
        if let Some(dsn) = &self.dsn {
            parts.push(format!("DSN={}", dsn));
        }
        if let Some(driver) = &self.driver {
            parts.push(format!("Driver={{{}}}", driver));
        }
        if let Some(server) = &self.server {
            parts.push(format!("Server={}", server));
        }
        if let Some(database) = &self.database {
            parts.push(format!("Database={}", database));
        }
        if let Some(username) = &self.username {
            parts.push(format!("UID={}", username));
        }
        if let Some(password) = &self.password {
            parts.push(format!("PWD={}", password));
        }
        for (key, value) in &self.extra_attrs {
            parts.push(format!("{}={}", key, value));
        }
        parts.join(";")
    }

    /// Look up an extra attribute such as `company` by key.
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra_attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[cfg(test)]
    pub fn password_for_tests(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

// Hand-written so the password never shows up in logs or panics.
impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("name", &self.name)
            .field("dsn", &self.dsn)
            .field("driver", &self.driver)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("readonly", &self.readonly)
            .field("max_rows", &self.max_rows)
            .field("timeout", &self.timeout)
            .field("driver_family", &self.driver_family)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionProfile`] with fluent API.
pub struct ConnectionProfileBuilder {
    profile: ConnectionProfile,
}

impl ConnectionProfileBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            profile: ConnectionProfile {
                name: name.into(),
                connection_string: None,
                dsn: None,
                driver: None,
                server: None,
                database: None,
                username: None,
                password: None,
                extra_attrs: Vec::new(),
                readonly: true,
                max_rows: DEFAULT_MAX_ROWS,
                timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
                driver_family: DriverFamily::Generic,
            },
        }
    }

    pub fn connection_string(mut self, s: impl Into<String>) -> Self {
        self.profile.connection_string = Some(s.into());
        self
    }

    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.profile.dsn = Some(dsn.into());
        self
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.profile.driver = Some(driver.into());
        self
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.profile.server = Some(server.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.profile.database = Some(database.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.profile.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.profile.password = Some(password.into());
        self
    }

    pub fn extra_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.profile.extra_attrs.push((key.into(), value.into()));
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.profile.readonly = readonly;
        self
    }

    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.profile.max_rows = max_rows;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.profile.timeout = timeout;
        self
    }

    pub fn driver_family(mut self, family: DriverFamily) -> Self {
        self.profile.driver_family = family;
        self
    }

    pub fn build(self) -> Result<ConnectionProfile> {
        let p = &self.profile;
        if p.name.is_empty() {
            return Err(ConfigError::MissingField("connection name".into()).into());
        }
        if p.connection_string.is_none() && p.dsn.is_none() && p.driver.is_none() {
            return Err(ConfigError::MissingField(
                "dsn, driver, or connection_string".into(),
            )
            .into());
        }
        Ok(self.profile)
    }
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: Cow<'static, str>,
    pub version: Cow<'static, str>,
    pub settings: ServerSettings,
    pub profiles: Vec<ConnectionProfile>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            settings: ServerSettings::default(),
            profiles: Vec::new(),
        }
    }
}

/// Keys consumed by the profile loader itself; anything else in a connection
/// table is treated as a driver-specific extra attribute.
const RESERVED_KEYS: &[&str] = &[
    "connection_string",
    "dsn",
    "driver",
    "server",
    "database",
    "username",
    "password",
    "readonly",
    "max_rows",
    "timeout",
    "driver_family",
];

impl ServerConfig {
    /// Load configuration from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let table: toml::Table = contents
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;

        // [server] first so its defaults apply to every profile regardless
        // of section order in the file.
        let mut settings = ServerSettings::default();
        for (section, value) in &table {
            if section.eq_ignore_ascii_case("server") {
                let section_table =
                    value.as_table().ok_or_else(|| ConfigError::InvalidValue {
                        field: Cow::Owned(section.clone()),
                        message: "expected a table".into(),
                    })?;
                settings = parse_server_settings(section_table)?;
            }
        }

        let mut profiles = Vec::new();
        for (section, value) in &table {
            if section.eq_ignore_ascii_case("server") {
                continue;
            }
            let section_table = value.as_table().ok_or_else(|| ConfigError::InvalidValue {
                field: Cow::Owned(section.clone()),
                message: "expected a table".into(),
            })?;
            profiles.push(parse_profile(section, section_table, &settings)?);
        }

        if let Some(default) = &settings.default_connection
            && !profiles.iter().any(|p| &p.name == default)
        {
            return Err(ConfigError::InvalidValue {
                field: "default_connection".into(),
                message: format!("'{}' is not a configured connection", default).into(),
            }
            .into());
        }

        Ok(Self {
            settings,
            profiles,
            ..Self::default()
        })
    }
}

fn parse_server_settings(table: &toml::Table) -> Result<ServerSettings> {
    let mut settings = ServerSettings::default();

    if let Some(v) = table.get("default_connection") {
        settings.default_connection = Some(string_value("default_connection", v)?);
    }
    if let Some(v) = table.get("max_rows") {
        settings.max_rows = int_value("max_rows", v)? as usize;
    }
    if let Some(v) = table.get("timeout") {
        settings.timeout = Duration::from_secs(int_value("timeout", v)? as u64);
    }
    Ok(settings)
}

fn parse_profile(
    name: &str,
    table: &toml::Table,
    settings: &ServerSettings,
) -> Result<ConnectionProfile> {
    let mut builder = ConnectionProfile::builder(name)
        .max_rows(settings.max_rows)
        .timeout(settings.timeout);

    if let Some(v) = table.get("connection_string") {
        builder = builder.connection_string(string_value("connection_string", v)?);
    }
    if let Some(v) = table.get("dsn") {
        builder = builder.dsn(string_value("dsn", v)?);
    }
    if let Some(v) = table.get("driver") {
        builder = builder.driver(string_value("driver", v)?);
    }
    if let Some(v) = table.get("server") {
        builder = builder.server(string_value("server", v)?);
    }
    if let Some(v) = table.get("database") {
        builder = builder.database(string_value("database", v)?);
    }
    if let Some(v) = table.get("username") {
        builder = builder.username(string_value("username", v)?);
    }
    if let Some(v) = table.get("password") {
        builder = builder.password(string_value("password", v)?);
    }
    if let Some(v) = table.get("readonly") {
        builder = builder.readonly(bool_value("readonly", v)?);
    }
    if let Some(v) = table.get("max_rows") {
        builder = builder.max_rows(int_value("max_rows", v)? as usize);
    }
    if let Some(v) = table.get("timeout") {
        builder = builder.timeout(Duration::from_secs(int_value("timeout", v)? as u64));
    }
    if let Some(v) = table.get("driver_family") {
        let raw = string_value("driver_family", v)?;
        let family = DriverFamily::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
            field: "driver_family".into(),
            message: format!("unknown driver family '{}'", raw).into(),
        })?;
        builder = builder.driver_family(family);
    }

    // Remaining keys pass through as driver attributes, in file order.
    for (key, value) in table {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        builder = builder.extra_attr(key, scalar_to_string(key, value)?);
    }

    builder.build()
}

fn string_value(field: &str, value: &toml::Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| invalid(field, "expected a string"))
}

fn int_value(field: &str, value: &toml::Value) -> Result<i64> {
    let n = value
        .as_integer()
        .ok_or_else(|| invalid(field, "expected an integer"))?;
    if n < 0 {
        return Err(invalid(field, "must not be negative"));
    }
    Ok(n)
}

fn bool_value(field: &str, value: &toml::Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| invalid(field, "expected a boolean"))
}

fn scalar_to_string(field: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(n) => Ok(n.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        _ => Err(invalid(field, "expected a scalar value")),
    }
}

fn invalid(field: &str, message: &'static str) -> McpError {
    ConfigError::InvalidValue {
        field: Cow::Owned(field.to_string()),
        message: message.into(),
    }
    .into()
}
