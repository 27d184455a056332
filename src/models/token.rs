use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::validator::Validator;

/// Length of a base-32 encoded 16 byte secret without padding.
pub const PLAINTEXT_LEN: usize = 26;

/// What a token may be used for. A token only ever satisfies its own scope.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authorization,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authorization => "authorization",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activation" => Ok(Scope::Activation),
            "authorization" => Ok(Scope::Authorization),
            other => Err(format!("unknown token scope '{other}'")),
        }
    }
}

/// A freshly issued token. Only the issuer ever holds the plaintext; the wire
/// form exposes the plaintext and expiry and nothing else.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: Vec<u8>,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl Token {
    /// The persisted part of the token.
    pub fn record(&self) -> TokenRecord {
        TokenRecord {
            hash: self.hash.clone(),
            user_id: self.user_id,
            expiry: self.expiry,
            scope: self.scope,
        }
    }
}

/// What the store keeps for a token: never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub hash: Vec<u8>,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: Scope,
}

/// SHA-256 of the plaintext, used as the lookup key.
pub fn hash_plaintext(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
}
