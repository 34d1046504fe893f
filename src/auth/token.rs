use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Token;

const ARGON2_MEMORY: u32 = 64 * 1024; // 64KB
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "codepad";
const LOOKUP_LENGTH: usize = 8;
const SECRET_LENGTH: usize = 24;

/// A freshly issued credential. `raw` is shown once and never stored.
pub struct IssuedToken {
    pub token: Token,
    pub raw: String,
}

pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .expect("invalid argon2 params");

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Generates a new raw token `codepad_<lookup>_<secret>`.
    /// Returns (raw_token, lookup, hash)
    pub fn generate(&self) -> Result<(String, String, String)> {
        let lookup = random_segment(LOOKUP_LENGTH);
        let secret = random_segment(SECRET_LENGTH);
        let raw_token = format!("{TOKEN_PREFIX}_{lookup}_{secret}");
        let hash = self.hash(&raw_token)?;
        Ok((raw_token, lookup, hash))
    }

    /// Issues a token record bound to `identity_id`, or an admin token when
    /// `identity_id` is None.
    pub fn issue(
        &self,
        identity_id: Option<&str>,
        expires_in: Option<Duration>,
    ) -> Result<IssuedToken> {
        let (raw, lookup, hash) = self.generate()?;
        let now = Utc::now();

        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            is_admin: identity_id.is_none(),
            identity_id: identity_id.map(str::to_string),
            created_at: now,
            expires_at: expires_in.map(|ttl| now + ttl),
            last_used_at: None,
        };

        Ok(IssuedToken { token, raw })
    }

    /// Hashes a raw token using Argon2id
    pub fn hash(&self, token: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(token.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("failed to hash token: {e}")))?;
        Ok(hash.to_string())
    }

    /// Verifies a raw token against a stored hash
    pub fn verify(&self, token: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("invalid hash format: {e}")))?;

        match self.argon2.verify_password(token.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify token: {e}"))),
        }
    }
}

/// Lowercase alphanumeric segment; never contains the `_` separator.
fn random_segment(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Parses a token string into its components (lookup, secret)
pub fn parse_token(token: &str) -> Result<(String, String)> {
    let rest = token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|r| r.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;

    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;

    if lookup.len() != LOOKUP_LENGTH || secret.len() != SECRET_LENGTH || secret.contains('_') {
        return Err(Error::InvalidTokenFormat);
    }

    Ok((lookup.to_string(), secret.to_string()))
}
