use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::validator::{matches, Validator, EMAIL_RX};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(pub String);

/// An argon2 PHC string. The plaintext is never kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Password {
    hash: String,
}

impl Password {
    pub fn from_plaintext(plaintext: &str) -> Result<Self, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError(e.to_string()))?;
        Ok(Password {
            hash: hash.to_string(),
        })
    }

    /// Wraps a hash loaded from storage.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Password { hash: hash.into() }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn matches(&self, plaintext: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(&self.hash).map_err(|e| PasswordError(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}

/// A registered account. The password hash never leaves the process.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: Password) -> Self {
        User {
            id: 0,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            name: name.into(),
            email: email.into(),
            password,
            activated: false,
            version: 0,
        }
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(
        matches(email, &EMAIL_RX),
        "email",
        "must be a valid email address",
    );
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= 8,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= 72,
        "password",
        "must not be more than 72 bytes long",
    );
}

/// Checks a registration. `password` is the plaintext submitted with it.
pub fn validate_user(v: &mut Validator, user: &User, password: &str) {
    v.check(!user.name.is_empty(), "name", "must be provided");
    v.check(
        user.name.len() <= 500,
        "name",
        "must not be more than 500 bytes long",
    );
    validate_email(v, &user.email);
    validate_password_plaintext(v, password);
}
