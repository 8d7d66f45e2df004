//! HS256 JWT identity resolution.
//!
//! The token's `sub` claim is the owner id; `exp` is required and checked.

use async_trait::async_trait;
use harmonia_core::types::OwnerId;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{IdentityError, IdentityResolver};

/// Claims carried by an owner token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the owner id.
    pub sub: OwnerId,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    #[serde(default)]
    pub iat: i64,
}

pub struct JwtResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Decode and validate `token`, returning its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &self.validation).map(|data| data.claims)
    }
}

#[async_trait]
impl IdentityResolver for JwtResolver {
    async fn resolve(&self, credential: &str) -> Result<OwnerId, IdentityError> {
        match self.validate(credential) {
            Ok(claims) => Ok(claims.sub),
            Err(e) => {
                tracing::debug!(error = %e, "JWT rejected");
                Err(IdentityError::Rejected)
            }
        }
    }
}

/// Issue an HS256 token for `owner_id` valid for `ttl_secs`.
///
/// Used by operators and tests to mint credentials for the `jwt` provider.
pub fn issue_token(
    owner_id: OwnerId,
    secret: &str,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: owner_id,
        exp: now + ttl_secs,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
