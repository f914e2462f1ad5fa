use std::{fmt::Display, str::FromStr, sync::LazyLock};

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Name of the header the token is sent in.
pub const WSSE_HEADER: &str = "X-WSSE";

const NONCE_LEN: usize = 8;
const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

static FIELD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("field pattern is valid"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenParseError {
    #[error("token does not start with UsernameToken")]
    MissingPrefix,
    #[error("token is missing the {0} field")]
    MissingField(&'static str),
}

/// The four fields of a WSSE UsernameToken header, all already encoded for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsseToken {
    pub username: String,
    pub password_digest: String,
    pub nonce: String,
    pub created: String,
}

impl WsseToken {
    /// Builds a token for `created` with the given raw nonce bytes.
    pub fn new(username: &str, password: &str, nonce: &[u8], created: DateTime<Utc>) -> Self {
        let created = created.format(CREATED_FORMAT).to_string();
        let digest = password_digest(nonce, &created, password);
        Self {
            username: username.to_owned(),
            password_digest: STANDARD.encode(digest),
            nonce: STANDARD.encode(nonce),
            created,
        }
    }

    /// Recomputes the digest from the token's own nonce and timestamp. This is what the
    /// receiving side does to authenticate a request.
    pub fn verify(&self, password: &str) -> bool {
        let Ok(nonce) = STANDARD.decode(&self.nonce) else {
            return false;
        };
        STANDARD.encode(password_digest(&nonce, &self.created, password)) == self.password_digest
    }
}

impl Display for WsseToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            r#"UsernameToken Username="{}", PasswordDigest="{}", Nonce="{}", Created="{}""#,
            self.username, self.password_digest, self.nonce, self.created
        )
    }
}

impl FromStr for WsseToken {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s
            .trim()
            .strip_prefix("UsernameToken ")
            .ok_or(TokenParseError::MissingPrefix)?;

        let field = |name: &'static str| {
            FIELD_PATTERN
                .captures_iter(fields)
                .find(|c| &c[1] == name)
                .map(|c| c[2].to_owned())
                .ok_or(TokenParseError::MissingField(name))
        };

        Ok(Self {
            username: field("Username")?,
            password_digest: field("PasswordDigest")?,
            nonce: field("Nonce")?,
            created: field("Created")?,
        })
    }
}

/// Produces a one-time header value for `username`/`password`. Nonce comes from the operating
/// system's random source and the timestamp is the current UTC second.
pub fn sign(username: &str, password: &str) -> String {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    WsseToken::new(username, password, &nonce, Utc::now()).to_string()
}

/// `SHA1(nonce || created || password)` over raw bytes, no separators.
fn password_digest(nonce: &[u8], created: &str, password: &str) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}
