use std::time::Duration;

use thiserror::Error;

use crate::key::AliasToken;

/// A problem with the shape of a key or the resolution of an alias.
///
/// These are programming errors and are never stored in resource metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// An alias reached a code path that requires a concrete key.
    #[error("alias keys have to be resolved first")]
    UnsupportedKeyKind,
    /// Resolving an alias led back to an alias that was already visited.
    #[error("cyclic alias resolution through `{0}`")]
    CyclicAlias(AliasToken),
    /// No resolver is registered for the alias and it has no parent to fall back to.
    #[error("alias `{0}` is not registered")]
    UnregisteredAlias(AliasToken),
    /// A resolver is already registered for the alias.
    #[error("alias `{0}` is already registered")]
    AliasAlreadyRegistered(AliasToken),
    /// The alias lacks a parameter or parent its resolver needs.
    #[error("malformed alias `{token}`: {reason}")]
    MalformedAlias {
        token: AliasToken,
        reason: &'static str,
    },
}

/// An error that happens when loading entries through a resource loader.
///
/// Errors are shared between all callers of a coalesced load and are stored in the metadata of
/// the affected keys, so this enum is cheap to clone and carries only strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The requested entity does not exist on the server.
    #[error("not found: {0}")]
    NotFound(String),
    /// The server refused access to the requested entity.
    ///
    /// The attached string contains the server's response.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The loader did not finish within the configured load timeout.
    #[error("load timed out after {0:?}")]
    Timeout(Duration),
    /// The request failed, for example due to connection loss or a server error.
    #[error("request failed: {0}")]
    RequestFailed(String),
    /// The server responded, but the response could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The load was dropped before it produced a result.
    #[error("load interrupted")]
    Interrupted,
    /// An unexpected error within the loader or the cache itself.
    #[error("internal error")]
    InternalError,
}

impl From<std::io::Error> for LoadError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::from_std_error(err)
    }
}

impl From<serde_json::Error> for LoadError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::from_std_error(err)
    }
}

impl LoadError {
    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }
}

/// An error returned from resource operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The resource rejected the key as malformed.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// An error when wiring resources together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The dependency already depends on the resource, directly or transitively.
    #[error("syncing `{resource}` with `{dependency}` would create a cycle")]
    Cycle {
        resource: String,
        dependency: String,
    },
}
