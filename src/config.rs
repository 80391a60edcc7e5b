use serde::Deserialize;
use std::collections::HashMap;
use std::{env, fs, path::Path, path::PathBuf};
use tracing::{error, info};

/// Deployment configuration, loaded from a JSON file.
///
/// Every field has a workable default so the service can start with no
/// config file at all: heuristic role mapping, no IAM sync, the standard
/// public paths.
#[derive(Debug, Clone, Deserialize)]
pub struct SsoConfig {
    /// Path to the JSON role mapping table. Absent means the heuristic
    /// mapping strategy.
    #[serde(default)]
    pub mapping_file: Option<String>,

    /// Tenant compound mapping targets must match to be kept.
    #[serde(default)]
    pub expected_tenant: Option<String>,

    /// Paths served without authentication.
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,

    /// Permission cache entry lifetime.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// IAM sync settings. Absent disables role propagation.
    #[serde(default)]
    pub keycloak: Option<KeycloakConfig>,
}

/// Keycloak admin-API connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct KeycloakConfig {
    pub url: String,
    pub realm: String,
    pub admin_client_id: String,
    pub admin_client_secret: String,
    /// Client whose roles are granted; also the tenant compound mapping
    /// targets are scoped to.
    pub client_id: String,
}

fn default_public_paths() -> Vec<String> {
    vec![
        "/public".to_string(),
        "/health".to_string(),
        "/error".to_string(),
    ]
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("SSO_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("launchpad-sso").join("sso.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("sso.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

/// Replace `${NAME}` references with the environment variable's value.
/// Unset variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            while let Some(c) = chars.next() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_config(mut cfg: SsoConfig) -> SsoConfig {
    if let Some(mapping_file) = cfg.mapping_file.as_mut() {
        *mapping_file = expand_env_vars(mapping_file);
    }
    if let Some(kc) = cfg.keycloak.as_mut() {
        kc.url = expand_env_vars(&kc.url);
        kc.realm = expand_env_vars(&kc.realm);
        kc.admin_client_id = expand_env_vars(&kc.admin_client_id);
        kc.admin_client_secret = expand_env_vars(&kc.admin_client_secret);
        kc.client_id = expand_env_vars(&kc.client_id);
    }
    cfg
}

/// Load the configuration from an explicit path, the resolved default
/// location, or fall back to defaults when no file exists.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<SsoConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => resolve_config_path(),
    };

    let Some(path) = path else {
        info!("no config file found, using defaults");
        return Ok(SsoConfig::default());
    };

    let raw = fs::read_to_string(&path)?;
    let cfg: SsoConfig = serde_json::from_str(&raw)?;
    info!(path = %path.display(), "loaded configuration");
    Ok(expand_config(cfg))
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            mapping_file: None,
            expected_tenant: None,
            public_paths: default_public_paths(),
            cache_ttl_secs: default_cache_ttl_secs(),
            keycloak: None,
        }
    }
}

/// Load the role mapping table from a JSON file of the form
/// `{"origin role": "target role", ...}`.
///
/// A missing or malformed file logs an error and yields an empty table
/// rather than failing startup; the table mapper then maps nothing, which
/// is visible immediately in the logs and the debug endpoint.
pub fn load_role_mapping(path: &Path) -> HashMap<String, String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            error!(path = %path.display(), error = %e, "cannot read role mapping file");
            return HashMap::new();
        }
    };

    match serde_json::from_str::<HashMap<String, String>>(&raw) {
        Ok(table) => {
            info!(path = %path.display(), entries = table.len(), "loaded role mapping table");
            table
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "role mapping file is not a JSON string map");
            HashMap::new()
        }
    }
}
