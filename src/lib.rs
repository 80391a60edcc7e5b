// Core modules
pub mod api;
pub mod auth;
pub mod config;
pub mod iam;
pub mod roles;
pub mod types;

// Re-export key types and functions
pub use auth::{AuthContext, AuthPipeline, PermissionCache, PermissionRecord, RequestIdentity};
pub use config::{KeycloakConfig, SsoConfig};
pub use iam::{IdentityProviderSync, KeycloakSync, LoggingSync};
pub use roles::{HeuristicRoleMapper, RoleMapper, TableRoleMapper};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

/// Assemble the authentication pipeline from a loaded configuration.
///
/// Strategy selection happens here: a configured mapping file yields the
/// table mapper, otherwise the heuristic one; configured Keycloak settings
/// enable role propagation, otherwise sync is a logged no-op. When no
/// tenant is set explicitly the Keycloak client id doubles as the tenant
/// for compound mapping targets.
pub fn build_pipeline(cfg: &SsoConfig) -> Arc<AuthPipeline> {
    let expected_tenant = cfg
        .expected_tenant
        .clone()
        .or_else(|| cfg.keycloak.as_ref().map(|kc| kc.client_id.clone()));

    let mapper: Arc<dyn RoleMapper> = match &cfg.mapping_file {
        Some(path) => {
            let table = config::load_role_mapping(Path::new(path));
            Arc::new(TableRoleMapper::new(table, expected_tenant))
        }
        None => Arc::new(HeuristicRoleMapper),
    };

    let sync: Arc<dyn IdentityProviderSync> = match &cfg.keycloak {
        Some(kc) => Arc::new(KeycloakSync::new(kc.clone())),
        None => Arc::new(LoggingSync),
    };

    info!(
        strategy = mapper.strategy(),
        provider = sync.provider_name(),
        ttl_secs = cfg.cache_ttl_secs,
        "authentication pipeline assembled"
    );

    let cache = PermissionCache::with_ttl(Duration::from_secs(cfg.cache_ttl_secs));
    Arc::new(AuthPipeline::new(
        cache,
        mapper,
        sync,
        cfg.public_paths.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_heuristic_pipeline() {
        let cfg = SsoConfig::default();
        let pipeline = build_pipeline(&cfg);

        assert_eq!(pipeline.mapping_strategy(), "heuristic");
        assert_eq!(pipeline.sync_provider(), "logging");
    }

    #[test]
    fn test_keycloak_config_enables_sync() {
        let cfg = SsoConfig {
            keycloak: Some(KeycloakConfig {
                url: "http://localhost:8080".to_string(),
                realm: "revvo".to_string(),
                admin_client_id: "admin-cli".to_string(),
                admin_client_secret: "secret".to_string(),
                client_id: "domicilio_certo".to_string(),
            }),
            ..SsoConfig::default()
        };

        let pipeline = build_pipeline(&cfg);
        assert_eq!(pipeline.sync_provider(), "keycloak");
    }
}
