use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifetime of a token from a plain login.
pub const SESSION_LIFETIME: Duration = Duration::hours(1);
/// Lifetime of a token from a login with `remember_me`.
pub const REMEMBER_ME_LIFETIME: Duration = Duration::days(30);
/// Lifetime of a refreshed token.
pub const REFRESH_LIFETIME: Duration = Duration::hours(72);

/// Claims carried by every bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub account_id: i64,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// Signs and verifies HS256 bearer tokens with the process-wide secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn issue(&self, account_id: i64, lifetime: Duration) -> Result<IssuedToken> {
        let now = Utc::now();
        self.issue_at(account_id, now, now + lifetime)
    }

    pub fn issue_at(
        &self,
        account_id: i64,
        issued_at: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let claims = Claims {
            account_id,
            iat: issued_at.timestamp(),
            exp: expires.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedToken { token, expires })
    }

    pub fn validate(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => Error::TokenExpired,
                _ => Error::Token(e),
            })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_validate() {
        let issuer = TokenIssuer::new(b"secret");
        let issued = issuer.issue(7, SESSION_LIFETIME).unwrap();
        let claims = issuer.validate(&issued.token).unwrap();
        assert_eq!(claims.account_id, 7);
        assert_eq!(claims.exp, issued.expires.timestamp());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn expired_tokens_fail() {
        let issuer = TokenIssuer::new(b"secret");
        let now = Utc::now();

        let valid = issuer
            .issue_at(1, now - Duration::hours(1), now + Duration::seconds(30))
            .unwrap();
        assert!(issuer.validate(&valid.token).is_ok());

        let expired = issuer
            .issue_at(1, now - Duration::hours(2), now - Duration::seconds(1))
            .unwrap();
        assert!(matches!(
            issuer.validate(&expired.token),
            Err(Error::TokenExpired)
        ));
    }

    #[test]
    fn other_secrets_are_rejected() {
        let issued = TokenIssuer::new(b"one").issue(1, SESSION_LIFETIME).unwrap();
        let err = TokenIssuer::new(b"two").validate(&issued.token).unwrap_err();
        assert!(matches!(err, Error::Token(_)));
        assert!(TokenIssuer::new(b"one").validate("not.a.token").is_err());
    }
}
