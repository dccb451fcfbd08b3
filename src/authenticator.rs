use crate::request::Request;
use crate::token::{Token, TokenError};
use std::fmt;

/// Authentication type of tokens issued for a specific kite.
pub const TOKEN: &str = "token";
/// Authentication type of kite keys signed by kontrol.
pub const KITE_KEY: &str = "kiteKey";

/// A strategy that checks the credential carried by a request and returns the
/// username it proves.
pub trait Authenticator: Send + Sync {
    fn verify(&self, request: &Request) -> Result<String, AuthError>;
}

impl<F> Authenticator for F
where
    F: Fn(&Request) -> Result<String, AuthError> + Send + Sync,
{
    fn verify(&self, request: &Request) -> Result<String, AuthError> {
        self(request)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    MissingCredential,
    Token(TokenError),
    InvalidAudience(String),
    MissingSubject,
    KeyResolution(String),
    Rejected(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredential => write!(f, "No authentication information is provided"),
            AuthError::Token(err) => write!(f, "{}", err),
            AuthError::InvalidAudience(audience) => {
                write!(f, "Invalid audience in token: {}", audience)
            }
            AuthError::MissingSubject => write!(f, "Username is not present in token"),
            AuthError::KeyResolution(msg) => write!(f, "Cannot get kontrol key: {}", msg),
            AuthError::Rejected(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        AuthError::Token(err)
    }
}

/// Whether a token for `audience` may be presented to `kite`. Audiences are prefixes of
/// the kite's identity; an empty audience matches nothing.
pub fn audience_matches(kite: &str, audience: &str) -> bool {
    !audience.is_empty() && kite.starts_with(audience)
}

/// Checks tokens addressed to this kite, signed with its own token key.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAuthenticator;

impl Authenticator for TokenAuthenticator {
    fn verify(&self, request: &Request) -> Result<String, AuthError> {
        let credential = request
            .authentication
            .as_ref()
            .ok_or(AuthError::MissingCredential)?;
        let local = &request.local_kite;
        let token = Token::parse(&credential.key, |_| Ok(local.token_key()))?;

        let audience = token.claims.aud.unwrap_or_default();
        if !audience_matches(&local.kite().to_string(), &audience) {
            return Err(AuthError::InvalidAudience(audience));
        }

        token.claims.sub.ok_or(AuthError::MissingSubject)
    }
}

/// Checks kite keys, which kontrol signs for every kite it registers.
#[derive(Debug, Clone, Copy, Default)]
pub struct KiteKeyAuthenticator;

impl Authenticator for KiteKeyAuthenticator {
    fn verify(&self, request: &Request) -> Result<String, AuthError> {
        let credential = request
            .authentication
            .as_ref()
            .ok_or(AuthError::MissingCredential)?;
        let kontrol_key = request
            .local_kite
            .key_resolver()
            .kontrol_key()
            .map_err(|err| AuthError::KeyResolution(err.to_string()))?;
        let token = Token::parse(&credential.key, |_| Ok(kontrol_key))?;

        token.claims.sub.ok_or(AuthError::MissingSubject)
    }
}
