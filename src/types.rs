//! NewType wrappers for strong typing throughout the SSO core.
//!
//! These types keep the two role vocabularies apart: a role asserted by the
//! launchpad environment is not interchangeable with a role this system
//! grants, and the compiler should enforce that.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Principal name resolved from the inbound request.
    ///
    /// This is whatever the launchpad environment asserts as the logged-in
    /// user: a header value or a token claim (`preferred_username`, `sub`,
    /// ...). It is the cache key for resolved permissions and the principal
    /// of the installed authentication.
    Username
);

newtype_string!(
    /// A role identifier as asserted by the upstream enterprise environment.
    ///
    /// Origin roles arrive through headers or token claims and keep their
    /// original casing for audit. They carry no authority in this system
    /// until a `RoleMapper` translates them.
    OriginRole
);

newtype_string!(
    /// A role identifier meaningful to this system, after mapping.
    ///
    /// Target roles may be compound (`"<tenant>:<role>"`) when the mapping
    /// table scopes them to an IAM client; plain names (`"ADMIN"`) come out
    /// of the heuristic mapper.
    TargetRole
);

impl TargetRole {
    /// Split a compound `"<tenant>:<role>"` identifier.
    ///
    /// Returns `None` for plain (non-compound) role names.
    pub fn split_tenant(&self) -> Option<(&str, &str)> {
        self.0.split_once(':')
    }

    /// The bare role name, with any tenant segment stripped.
    pub fn role_name(&self) -> &str {
        match self.0.split_once(':') {
            Some((_, role)) => role,
            None => &self.0,
        }
    }
}
