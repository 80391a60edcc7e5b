//! Identity and authorization resolution.
//!
//! The launchpad gateway in front of this service authenticates users; this
//! module turns the trust signals it forwards (identity headers, forwarded
//! tokens) into a request-scoped [`AuthContext`]. Submodules follow the
//! request's path through the pipeline:
//!
//! - [`claims`]: locate and decode a bearer token, without verification
//! - [`identity`]: ordered-fallback resolution of username, profile fields
//!   and raw roles
//! - [`permissions`]: the resolved permission record
//! - [`cache`]: per-user TTL cache of resolved permissions
//! - [`context`]: the authority set handed to downstream authorization
//! - [`pipeline`]: the axum middleware driving it all

pub mod cache;
pub mod claims;
pub mod context;
pub mod identity;
pub mod permissions;
pub mod pipeline;

pub use cache::PermissionCache;
pub use context::AuthContext;
pub use identity::RequestIdentity;
pub use permissions::{AuthOrigin, PermissionRecord};
pub use pipeline::{AuthPipeline, auth_middleware};
