use crate::error::Result;

/// bcrypt work factor for stored passwords.
pub const DEFAULT_COST: u32 = 10;

pub fn hash_password(plain: &str) -> Result<String> {
    Ok(bcrypt::hash(plain, DEFAULT_COST)?)
}

/// Constant-time comparison of `plain` against a stored bcrypt hash. A
/// malformed hash never verifies.
#[must_use]
pub fn verify_password(plain: &str, hash: &str) -> bool {
    bcrypt::verify(plain, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_only_the_original_password() {
        let hash = hash_password("gopher").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("gopher", &hash));
        assert!(!verify_password("Gopher", &hash));
    }

    #[test]
    fn garbage_hash_is_rejected() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "not-a-hash"));
    }
}
