//! Bearer-token authentication seam.
//!
//! Session issuance lives outside this service; the server only needs to map
//! a presented token to a user id. `StaticTokens` provides that mapping from
//! the config file.

use std::collections::{BTreeMap, HashMap};

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::db::Database;

pub trait Authenticator: Send + Sync {
    /// The user id a token acts as, or `None` when the token is not accepted.
    fn authenticate(&self, token: &str) -> Option<i64>;
}

fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Tokens from `[auth.tokens]`, keyed by digest so plain tokens are not kept in memory.
#[derive(Debug, Default)]
pub struct StaticTokens {
    users_by_digest: HashMap<String, i64>,
}

impl StaticTokens {
    /// Ensure every configured username exists and remember its token.
    pub fn provision(db: &Database, tokens: &BTreeMap<String, String>) -> rusqlite::Result<Self> {
        let mut users_by_digest = HashMap::with_capacity(tokens.len());
        for (token, username) in tokens {
            let digest = token_digest(token);
            let user_id = db.ensure_user(username, &digest)?;
            users_by_digest.insert(digest, user_id);
        }
        info!(tokens = users_by_digest.len(), "Provisioned bearer tokens");
        Ok(Self { users_by_digest })
    }
}

impl Authenticator for StaticTokens {
    fn authenticate(&self, token: &str) -> Option<i64> {
        self.users_by_digest.get(&token_digest(token)).copied()
    }
}

/// The token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
