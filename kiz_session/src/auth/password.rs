//! Argon2id password hashing with a server-side pepper.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use std::sync::LazyLock;

use super::errors::{AuthError, AuthResult};

/// Verified against when no user matches, so unknown emails cost one Argon2 run too
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("kiz-space-no-such-user", "").unwrap_or_default());

#[cfg(test)]
thread_local! {
    static VERIFICATIONS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Argon2 verifications run on this thread
#[cfg(test)]
pub(crate) fn verifications() -> usize {
    VERIFICATIONS.with(|count| count.get())
}

/// Hash `password` for storage
pub fn hash_password(password: &str, pepper: &str) -> AuthResult<String> {
    let peppered = format!("{password}{pepper}");
    let salt = SaltString::generate(&mut OsRng);

    Ok(Argon2::default()
        .hash_password(peppered.as_bytes(), &salt)
        .map_err(|_| AuthError::HashingFailed)?
        .to_string())
}

/// Check `password` against a stored hash. An unparsable hash never matches.
pub fn verify_password(password: &str, pepper: &str, hash: &str) -> bool {
    let peppered = format!("{password}{pepper}");
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };

    #[cfg(test)]
    VERIFICATIONS.with(|count| count.set(count.get() + 1));

    Argon2::default()
        .verify_password(peppered.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Check `password` against the stored hash of the matched user, if any.
///
/// Without a user the password is checked against a dummy hash and the result
/// is always `false`, keeping the cost of both paths the same.
pub fn verify_password_or_dummy(password: &str, pepper: &str, hash: Option<&str>) -> bool {
    match hash {
        Some(hash) => verify_password(password, pepper, hash),
        None => {
            let _ = verify_password(password, pepper, &DUMMY_HASH);
            false
        }
    }
}
