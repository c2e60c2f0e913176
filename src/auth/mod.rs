//! Passwords, bearer tokens, proxy identities and the axum extractors that
//! tie them to requests.

mod middleware;
mod password;
mod sso;
mod token;

pub use middleware::{AuthError, MaybeAccount, RequireAdmin, RequireUser, TOKEN_COOKIE, bearer_token};
pub use password::{DEFAULT_COST, hash_password, verify_password};
pub use sso::{Cidr, SsoProxy};
pub use token::{
    Claims, IssuedToken, REFRESH_LIFETIME, REMEMBER_ME_LIFETIME, SESSION_LIFETIME, TokenIssuer,
};
