use config::{Config, ConfigError};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub registry: RegistrySettings,
    pub ldap: LdapSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Cookie domain for session cookies ("" for current host only)
    #[serde(default)]
    pub cookie_domain: String,

    /// Whether to set Secure flag on cookies (true for HTTPS, false for HTTP development)
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,

    /// Scheme reported to the upstream in `X-Forwarded-Proto` (default: "https")
    #[serde(default = "default_forwarded_proto")]
    pub forwarded_proto: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistrySettings {
    /// Base URL of the upstream registry, e.g. "http://registry:5000"
    #[serde(default)]
    pub upstream_url: String,

    /// Timeout in seconds for each introspection call to the upstream (default: 10)
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,

    /// Number of tag lists fetched concurrently when listing a catalog (default: 4)
    #[serde(default = "default_catalog_concurrency")]
    pub catalog_concurrency: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LdapSettings {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub base_dn: String,
    /// Search filter for the bound user; `%s` is replaced with the escaped bind identity
    #[serde(default = "default_user_filter")]
    pub user_filter: String,
    /// Attribute holding the user's group memberships
    #[serde(default = "default_group_attribute")]
    pub group_attribute: String,
    /// Only groups whose name starts with this prefix are considered ("" for all)
    #[serde(default = "default_group_name_prefix")]
    pub group_name_prefix: String,
    /// Domain appended to usernames without one, e.g. "example.com"
    #[serde(default)]
    pub user_mail_domain: String,
    #[serde(default)]
    pub start_tls: bool,
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default = "default_ldap_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    /// Session lifetime in seconds, measured from login (default: 1800)
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Upper bound on concurrently stored sessions (default: 10000)
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8443
}

fn default_cookie_secure() -> bool {
    true
}

fn default_forwarded_proto() -> String {
    "https".to_string()
}

fn default_registry_timeout() -> u64 {
    10
}

fn default_catalog_concurrency() -> usize {
    4
}

fn default_user_filter() -> String {
    "(uid=%s)".to_string()
}

fn default_group_attribute() -> String {
    "memberOf".to_string()
}

fn default_group_name_prefix() -> String {
    "team".to_string()
}

fn default_ldap_timeout() -> u64 {
    10
}

fn default_session_ttl() -> u64 {
    30 * 60
}

fn default_max_sessions() -> u64 {
    10_000
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            base_dn: String::new(),
            user_filter: default_user_filter(),
            group_attribute: default_group_attribute(),
            group_name_prefix: default_group_name_prefix(),
            user_mail_domain: String::new(),
            start_tls: false,
            skip_tls_verify: false,
            timeout_secs: default_ldap_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Settings {
    /// Substitute environment variables in a string value
    /// Replaces ${VAR_NAME} or ${VAR_NAME:-default} with environment variable values
    fn substitute_env_vars_in_string(s: &str) -> String {
        let Ok(re) = regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}") else {
            return s.to_string();
        };

        re.replace_all(s, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match env::var(var_name) {
                Ok(val) => val,
                Err(_) => default_value.unwrap_or("").to_string(),
            }
        })
        .to_string()
    }

    /// Convert a config::Value to a serde_json::Value, performing environment variable substitution
    fn config_value_to_json(value: &config::Value) -> serde_json::Value {
        use config::ValueKind;

        match &value.kind {
            ValueKind::Nil => serde_json::Value::Null,
            ValueKind::Boolean(b) => serde_json::Value::Bool(*b),
            ValueKind::I64(i) => serde_json::Value::Number((*i).into()),
            ValueKind::I128(i) => serde_json::Value::Number((*i as i64).into()),
            ValueKind::U64(u) => serde_json::Value::Number((*u).into()),
            ValueKind::U128(u) => serde_json::Value::Number((*u as u64).into()),
            ValueKind::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueKind::String(s) => {
                serde_json::Value::String(Self::substitute_env_vars_in_string(s))
            }
            ValueKind::Table(table) => {
                let mut map = serde_json::Map::new();
                for (k, v) in table.iter() {
                    map.insert(k.clone(), Self::config_value_to_json(v));
                }
                serde_json::Value::Object(map)
            }
            ValueKind::Array(arr) => {
                let vec: Vec<serde_json::Value> =
                    arr.iter().map(Self::config_value_to_json).collect();
                serde_json::Value::Array(vec)
            }
        }
    }

    /// Try to add a config file with multiple extension attempts (.toml, .yaml, .yml)
    /// Returns Ok(true) if a file was loaded, Ok(false) if no file found (when not required)
    fn try_add_config_file(
        builder: &mut config::ConfigBuilder<config::builder::DefaultState>,
        config_dir: &str,
        name: &str,
        required: bool,
    ) -> Result<bool, ConfigError> {
        let extensions = ["toml", "yaml", "yml"];

        for ext in extensions {
            let path = format!("{}/{}.{}", config_dir, name, ext);
            if std::path::Path::new(&path).exists() {
                tracing::info!("Loading config file: {}", path);
                *builder = builder
                    .clone()
                    .add_source(config::File::with_name(&format!("{}/{}", config_dir, name)));
                return Ok(true);
            }
        }

        if required {
            Err(ConfigError::Message(format!(
                "Required config file not found: {}/{}.{{toml,yaml,yml}}",
                config_dir, name
            )))
        } else {
            tracing::debug!(
                "Optional config file not found: {}/{}.{{toml,yaml,yml}}",
                config_dir,
                name
            );
            Ok(false)
        }
    }

    /// Load settings from the directory and run mode named by the environment
    ///
    /// `REGISTRY_GATE_CONFIG_DIR` (default "config") and
    /// `REGISTRY_GATE_CONFIG_RUN_MODE` (default "development").
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode =
            env::var("REGISTRY_GATE_CONFIG_RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = env::var("REGISTRY_GATE_CONFIG_DIR").unwrap_or_else(|_| "config".into());
        Self::load(&config_dir, &run_mode)
    }

    /// Load `default`, `<run_mode>` and `local` config files from `config_dir`, in that order
    pub fn load(config_dir: &str, run_mode: &str) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        Self::try_add_config_file(&mut builder, config_dir, "default", true)?;
        Self::try_add_config_file(&mut builder, config_dir, run_mode, false)?;
        Self::try_add_config_file(&mut builder, config_dir, "local", false)?;

        let config = builder.build()?;

        let root_value = config
            .cache
            .into_table()
            .map_err(|e| ConfigError::Message(format!("Failed to get config table: {}", e)))?;

        let mut json_map = serde_json::Map::new();
        for (k, v) in root_value.iter() {
            json_map.insert(k.clone(), Self::config_value_to_json(v));
        }
        let json_value = serde_json::Value::Object(json_map);

        let mut unused_fields = Vec::new();
        let settings: Settings = serde_ignored::deserialize(json_value, |path| {
            unused_fields.push(path.to_string());
        })
        .map_err(|e| ConfigError::Message(format!("Failed to deserialize settings: {}", e)))?;

        for field in &unused_fields {
            tracing::warn!("Unknown configuration field: {}", field);
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.upstream_url.is_empty() {
            return Err(ConfigError::Message(
                "Upstream registry not configured. Set [registry] upstream_url in config"
                    .to_string(),
            ));
        }

        match reqwest::Url::parse(&self.registry.upstream_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(ConfigError::Message(format!(
                    "Upstream registry URL must use http or https, got '{}'",
                    url.scheme()
                )))
            }
            Err(e) => {
                return Err(ConfigError::Message(format!(
                    "Invalid upstream registry URL '{}': {}",
                    self.registry.upstream_url, e
                )))
            }
        }

        if self.ldap.url.is_empty() {
            return Err(ConfigError::Message(
                "Directory not configured. Set [ldap] url in config".to_string(),
            ));
        }

        if self.registry.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "[registry] timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.registry.catalog_concurrency == 0 {
            return Err(ConfigError::Message(
                "[registry] catalog_concurrency must be at least 1".to_string(),
            ));
        }

        if self.session.ttl_secs == 0 {
            return Err(ConfigError::Message(
                "[session] ttl_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
