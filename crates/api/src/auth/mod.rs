//! Credential to owner-id resolution.
//!
//! Both the HTTP bearer extractor and the realtime channel's first frame
//! go through an [`IdentityResolver`]; which implementation is used is
//! chosen by [`crate::config::IdentityConfig`].

pub mod jwt;
pub mod userinfo;

use async_trait::async_trait;
use harmonia_core::types::OwnerId;

pub use jwt::JwtResolver;
pub use userinfo::UserInfoResolver;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The credential is invalid, expired, or names no user.
    #[error("Token is invalid")]
    Rejected,

    /// The identity provider could not be reached or answered garbage.
    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// Resolves an opaque client credential to the owner it belongs to.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<OwnerId, IdentityError>;
}
