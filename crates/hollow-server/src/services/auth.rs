//! Authentication service
//!
//! A single shared secret unlocks the editor. Logging in exchanges the secret
//! for an HS256 token that is then sent as the `token` cookie or as a bearer
//! header.

use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Lifetime of an issued token, also used as the cookie max-age
pub const TOKEN_TTL_DAYS: i64 = 7;

pub struct AuthService {
    secret: String,
}

impl AuthService {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn check_secret(&self, candidate: &str) -> bool {
        let a = self.secret.as_bytes();
        let b = candidate.as_bytes();
        a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }

    pub fn issue_token(&self) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: "editor".to_string(),
            exp: (now + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn validate_token(&self, token: &str) -> Result<()> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(())
    }

    /// `Set-Cookie` value carrying `token`
    pub fn cookie(token: &str) -> String {
        format!(
            "token={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            token,
            TOKEN_TTL_DAYS * 24 * 3600
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
}
