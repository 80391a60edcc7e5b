//! The per-request authentication pipeline.
//!
//! Ties the other pieces together: resolve an identity from the request,
//! consult the permission cache, on a miss map roles and propagate them to
//! the IAM system, then install an [`AuthContext`] on the request. The
//! pipeline never rejects a request: a request it cannot authenticate
//! simply proceeds without a context, and downstream authorization decides
//! what anonymous callers may do.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::auth::cache::PermissionCache;
use crate::auth::context::AuthContext;
use crate::auth::identity::{self, RequestIdentity};
use crate::auth::permissions::{AuthOrigin, PermissionRecord};
use crate::iam::IdentityProviderSync;
use crate::roles::RoleMapper;
use crate::types::{OriginRole, Username};

/// Shared authentication state: cache, mapping strategy, IAM collaborator
/// and the paths exempt from authentication.
pub struct AuthPipeline {
    cache: PermissionCache,
    mapper: Arc<dyn RoleMapper>,
    sync: Arc<dyn IdentityProviderSync>,
    public_paths: Vec<String>,
}

impl AuthPipeline {
    pub fn new(
        cache: PermissionCache,
        mapper: Arc<dyn RoleMapper>,
        sync: Arc<dyn IdentityProviderSync>,
        public_paths: Vec<String>,
    ) -> Self {
        Self {
            cache,
            mapper,
            sync,
            public_paths,
        }
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    pub fn mapping_strategy(&self) -> &'static str {
        self.mapper.strategy()
    }

    pub fn sync_provider(&self) -> &'static str {
        self.sync.provider_name()
    }

    /// Whether a path is exempt from authentication. A configured path
    /// matches itself and everything below it.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths
            .iter()
            .any(|p| path == p || path.starts_with(&format!("{}/", p.trim_end_matches('/'))))
    }

    /// Resolve the permission record for an identity.
    ///
    /// A cache hit returns the stored record untouched; mapping and IAM
    /// sync run only on a miss. This method cannot fail: a failed IAM sync
    /// is logged and the locally mapped roles stand.
    pub async fn authenticate(&self, identity: &RequestIdentity) -> PermissionRecord {
        if let Some(record) = self.cache.get(&identity.username).await {
            debug!(user = %identity.username, "permission cache hit");
            return record;
        }

        let mapped_roles = self.mapper.map(&identity.raw_roles);
        debug!(
            user = %identity.username,
            strategy = self.mapper.strategy(),
            source = identity.raw_roles.len(),
            mapped = mapped_roles.len(),
            "mapped origin roles"
        );

        if let Err(e) = self
            .sync
            .apply_roles(identity.username.as_str(), &mapped_roles)
            .await
        {
            warn!(
                user = %identity.username,
                provider = self.sync.provider_name(),
                error = %e,
                "IAM role sync failed, proceeding with local grants"
            );
        }

        let record = PermissionRecord {
            username: identity.username.clone(),
            display_name: identity.display_name.clone(),
            email: identity.email.clone(),
            source_roles: identity.raw_roles.clone(),
            mapped_roles,
            origin: AuthOrigin::Sso,
        };

        self.cache
            .put(identity.username.clone(), record.clone())
            .await;
        record
    }

    /// Establish a session for the mock-login endpoint: map the given
    /// roles and cache the record without involving the IAM system.
    pub async fn authenticate_local(
        &self,
        username: Username,
        raw_roles: Vec<OriginRole>,
    ) -> PermissionRecord {
        let mapped_roles = self.mapper.map(&raw_roles);
        let record = PermissionRecord {
            username: username.clone(),
            display_name: None,
            email: None,
            source_roles: raw_roles,
            mapped_roles,
            origin: AuthOrigin::Local,
        };
        self.cache.put(username, record.clone()).await;
        record
    }
}

/// Axum middleware installing an [`AuthContext`] request extension.
///
/// Skips requests that already carry a context, and configured public
/// paths. Every request proceeds to the inner service, authenticated or
/// not.
pub async fn auth_middleware(
    State(pipeline): State<Arc<AuthPipeline>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<AuthContext>().is_some() {
        return next.run(request).await;
    }

    if pipeline.is_public(request.uri().path()) {
        return next.run(request).await;
    }

    if let Some(identity) = identity::resolve(request.headers()) {
        let record = pipeline.authenticate(&identity).await;
        let context = AuthContext::from_record(&record);
        debug!(
            user = %context.principal,
            authorities = context.authorities.len(),
            "request authenticated"
        );
        request.extensions_mut().insert(context);
    } else {
        debug!(path = %request.uri().path(), "no identity on request, proceeding anonymously");
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::Router;
    use axum::body::Body;
    use axum::extract::Extension;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
    use tower::ServiceExt;

    use crate::iam::SyncError;
    use crate::roles::HeuristicRoleMapper;
    use crate::types::TargetRole;

    #[derive(Default)]
    struct RecordingSync {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProviderSync for RecordingSync {
        async fn apply_roles(
            &self,
            _username: &str,
            _target_roles: &HashSet<TargetRole>,
        ) -> Result<(), SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn provider_name(&self) -> &'static str {
            "recording"
        }
    }

    struct FailingSync;

    #[async_trait]
    impl IdentityProviderSync for FailingSync {
        async fn apply_roles(
            &self,
            _username: &str,
            _target_roles: &HashSet<TargetRole>,
        ) -> Result<(), SyncError> {
            Err(SyncError::Transport("connection refused".to_string()))
        }

        fn provider_name(&self) -> &'static str {
            "failing"
        }
    }

    fn pipeline_with(sync: Arc<dyn IdentityProviderSync>) -> Arc<AuthPipeline> {
        Arc::new(AuthPipeline::new(
            PermissionCache::new(),
            Arc::new(HeuristicRoleMapper),
            sync,
            vec!["/public".to_string(), "/health".to_string()],
        ))
    }

    fn headers_from(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    fn identity_from(pairs: &[(&str, &str)]) -> RequestIdentity {
        identity::resolve(&headers_from(pairs)).unwrap()
    }

    #[tokio::test]
    async fn test_full_resolution_from_headers() {
        let pipeline = pipeline_with(Arc::new(RecordingSync::default()));
        let identity = identity_from(&[
            ("x-sap-user", "jdoe"),
            ("x-user-name", "John Doe"),
            ("x-sap-roles", "RevvoAdmin,Viewer"),
        ]);

        let record = pipeline.authenticate(&identity).await;
        let context = AuthContext::from_record(&record);

        assert_eq!(context.principal.as_str(), "jdoe");
        assert!(context.has_authority("ROLE_ADMIN"));
        assert!(context.has_authority("ROLE_USER"));
        assert!(context.has_authority("SAP_RevvoAdmin"));
        assert!(context.has_authority("SAP_Viewer"));
        assert_eq!(record.origin, AuthOrigin::Sso);
    }

    #[tokio::test]
    async fn test_resolution_from_token_only() {
        let pipeline = pipeline_with(Arc::new(RecordingSync::default()));

        let body = URL_SAFE_NO_PAD
            .encode(br#"{"preferred_username":"asmith","groups":["Developers"]}"#);
        let headers = headers_from(&[("authorization", &format!("Bearer h.{}.s", body))]);
        let identity = identity::resolve(&headers).unwrap();

        let record = pipeline.authenticate(&identity).await;
        assert_eq!(record.username.as_str(), "asmith");
        assert_eq!(record.source_roles, vec![OriginRole::new("Developers")]);
        assert!(record.has_mapped_role("USER"));
    }

    #[tokio::test]
    async fn test_malformed_token_with_username_header() {
        let pipeline = pipeline_with(Arc::new(RecordingSync::default()));
        let headers = headers_from(&[
            ("x-sap-user", "jdoe"),
            ("authorization", "Bearer garbage"),
        ]);
        let identity = identity::resolve(&headers).unwrap();

        let record = pipeline.authenticate(&identity).await;

        // No roles anywhere still yields the heuristic baseline.
        assert!(record.source_roles.is_empty());
        assert!(record.has_mapped_role("USER"));
        assert_eq!(record.mapped_roles.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_mapping_and_sync() {
        let sync = Arc::new(RecordingSync::default());
        let pipeline = pipeline_with(sync.clone());
        let identity = identity_from(&[("x-sap-user", "jdoe"), ("x-sap-roles", "Viewer")]);

        let first = pipeline.authenticate(&identity).await;
        let second = pipeline.authenticate(&identity).await;

        assert_eq!(sync.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.mapped_roles, second.mapped_roles);
    }

    #[tokio::test]
    async fn test_sync_failure_still_authenticates() {
        let pipeline = pipeline_with(Arc::new(FailingSync));
        let identity = identity_from(&[("x-sap-user", "jdoe"), ("x-sap-roles", "RevvoAdmin")]);

        let record = pipeline.authenticate(&identity).await;

        assert!(record.has_mapped_role("ADMIN"));
        assert!(pipeline.cache().get(&Username::new("jdoe")).await.is_some());
    }

    #[tokio::test]
    async fn test_nested_role_collections_end_to_end() {
        let pipeline = pipeline_with(Arc::new(RecordingSync::default()));

        let body = URL_SAFE_NO_PAD.encode(
            br#"{
                "preferred_username": "asmith",
                "xs.system.attributes": {"xs.rolecollections": ["RevvoAdmin", "Viewer"]}
            }"#,
        );
        let headers = headers_from(&[("authorization", &format!("Bearer h.{}.s", body))]);
        let identity = identity::resolve(&headers).unwrap();

        let record = pipeline.authenticate(&identity).await;
        assert_eq!(
            record.source_roles,
            vec![OriginRole::new("RevvoAdmin"), OriginRole::new("Viewer")]
        );
        assert!(record.has_mapped_role("ADMIN"));
        assert!(record.has_mapped_role("USER"));
    }

    #[tokio::test]
    async fn test_local_login_bypasses_iam() {
        let sync = Arc::new(RecordingSync::default());
        let pipeline = pipeline_with(sync.clone());

        let record = pipeline
            .authenticate_local(Username::new("tester"), vec![OriginRole::new("RevvoAdmin")])
            .await;

        assert_eq!(record.origin, AuthOrigin::Local);
        assert!(record.has_mapped_role("ADMIN"));
        assert_eq!(sync.calls.load(Ordering::SeqCst), 0);
        assert!(pipeline.cache().get(&Username::new("tester")).await.is_some());
    }

    #[test]
    fn test_public_path_matching() {
        let pipeline = pipeline_with(Arc::new(RecordingSync::default()));

        assert!(pipeline.is_public("/health"));
        assert!(pipeline.is_public("/public"));
        assert!(pipeline.is_public("/public/assets/app.js"));
        assert!(!pipeline.is_public("/publicity"));
        assert!(!pipeline.is_public("/sap/profile"));
    }

    async fn context_probe(context: Option<Extension<AuthContext>>) -> StatusCode {
        match context {
            Some(_) => StatusCode::OK,
            None => StatusCode::NO_CONTENT,
        }
    }

    fn probe_router(pipeline: Arc<AuthPipeline>) -> Router {
        Router::new()
            .route("/probe", get(context_probe))
            .route("/health", get(context_probe))
            .layer(from_fn_with_state(pipeline, auth_middleware))
    }

    #[tokio::test]
    async fn test_middleware_installs_context() {
        let pipeline = pipeline_with(Arc::new(RecordingSync::default()));
        let app = probe_router(pipeline);

        let response = app
            .oneshot(
                http::Request::builder()
                    .uri("/probe")
                    .header("x-sap-user", "jdoe")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_anonymous_request_proceeds() {
        let pipeline = pipeline_with(Arc::new(RecordingSync::default()));
        let app = probe_router(pipeline);

        let response = app
            .oneshot(
                http::Request::builder()
                    .uri("/probe")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // No identity, no context, but the request was served.
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_middleware_public_path_skips_authentication() {
        let sync = Arc::new(RecordingSync::default());
        let pipeline = pipeline_with(sync.clone());
        let app = probe_router(pipeline);

        let response = app
            .oneshot(
                http::Request::builder()
                    .uri("/health")
                    .header("x-sap-user", "jdoe")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(sync.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_middleware_existing_context_untouched() {
        let sync = Arc::new(RecordingSync::default());
        let pipeline = pipeline_with(sync.clone());
        let app = probe_router(pipeline);

        let existing = AuthContext {
            principal: Username::new("preauth"),
            authorities: HashSet::new(),
            origin: AuthOrigin::Local,
        };

        let mut request = http::Request::builder()
            .uri("/probe")
            .header("x-sap-user", "jdoe")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(existing);

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        // The pipeline never ran for this request.
        assert_eq!(sync.calls.load(Ordering::SeqCst), 0);
    }
}
