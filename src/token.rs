/*!
# Kite tokens

Bearer credentials presented in the `authentication.key` field of a call.

A token is three base64url (unpadded) segments joined by `.`:

```bytes
header      {"alg":"ES256K","typ":"JWT"}
claims      {"iss":..,"sub":..,"aud":..,"exp":..,"nbf":..,"iat":..,"jti":..}
signature   compact secp256k1 signature over sha256("<header>.<claims>")
```

Time claims are seconds since the epoch. `Token::parse` enforces `exp` and `nbf`, so
authenticators only have to look at the identity claims.
*/
use crate::crypto::{hash, verify, KitePublicKey, KiteSignature};
use crate::keypair::Keypair;
use crate::time::create_timestamp_secs;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub const ALGORITHM: &str = "ES256K";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Header {
    pub alg: String,
    pub typ: String,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            alg: String::from(ALGORITHM),
            typ: String::from("JWT"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims {
    /// Claims for `subject` addressed to `audience`, valid from now for `ttl`.
    pub fn new(issuer: &str, subject: &str, audience: &str, ttl: Duration) -> Claims {
        let now = create_timestamp_secs();
        Claims {
            iss: Some(String::from(issuer)),
            sub: Some(String::from(subject)),
            aud: Some(String::from(audience)),
            exp: Some(now.saturating_add(ttl.as_secs())),
            nbf: Some(now),
            iat: Some(now),
            jti: Some(Uuid::new_v4().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenError {
    Malformed(String),
    UnsupportedAlgorithm(String),
    KeyUnavailable(String),
    InvalidSignature,
    Expired,
    NotValidYet,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed(msg) => write!(f, "Malformed token: {}", msg),
            TokenError::UnsupportedAlgorithm(alg) => {
                write!(f, "Unsupported signing algorithm: {}", alg)
            }
            TokenError::KeyUnavailable(msg) => write!(f, "Signing key unavailable: {}", msg),
            TokenError::InvalidSignature => write!(f, "Invalid signature in token"),
            TokenError::Expired => write!(f, "Token is expired"),
            TokenError::NotValidYet => write!(f, "Token is not valid yet"),
        }
    }
}

impl std::error::Error for TokenError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub header: Header,
    pub claims: Claims,
}

impl Token {
    pub fn new(claims: Claims) -> Token {
        Token {
            header: Header::default(),
            claims,
        }
    }

    /// Serialize and sign the token with `keypair`.
    pub fn sign(&self, keypair: &Keypair) -> crate::Result<String> {
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&self.header)?);
        let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&self.claims)?);
        let signing_input = format!("{}.{}", header, claims);
        let sig = keypair.sign_hash(&hash(signing_input.as_bytes()))?;
        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(sig)))
    }

    /// Parse `token` and validate it. `key_fn` receives the decoded but not yet
    /// verified token and picks the public key the signature must match.
    pub fn parse<F>(token: &str, key_fn: F) -> Result<Token, TokenError>
    where
        F: FnOnce(&Token) -> Result<KitePublicKey, TokenError>,
    {
        let segments: Vec<&str> = token.trim().split('.').collect();
        if segments.len() != 3 {
            return Err(TokenError::Malformed(String::from(
                "token contains an invalid number of segments",
            )));
        }

        let header: Header = decode_segment(segments[0], "header")?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }
        let claims: Claims = decode_segment(segments[1], "claims")?;
        let parsed = Token { header, claims };

        let publickey = key_fn(&parsed)?;
        let sig_bytes = URL_SAFE_NO_PAD
            .decode(segments[2])
            .map_err(|err| TokenError::Malformed(format!("signature: {}", err)))?;
        if sig_bytes.len() != 64 {
            return Err(TokenError::InvalidSignature);
        }
        let mut sig: KiteSignature = [0u8; 64];
        sig.copy_from_slice(&sig_bytes);

        let signing_input_len = segments[0].len() + 1 + segments[1].len();
        let signing_input = &token.trim()[..signing_input_len];
        if !verify(&hash(signing_input.as_bytes()), &sig, &publickey) {
            return Err(TokenError::InvalidSignature);
        }

        parsed.validate_times(create_timestamp_secs())?;
        Ok(parsed)
    }

    fn validate_times(&self, now: u64) -> Result<(), TokenError> {
        if let Some(exp) = self.claims.exp {
            if now >= exp {
                return Err(TokenError::Expired);
            }
        }
        if let Some(nbf) = self.claims.nbf {
            if now < nbf {
                return Err(TokenError::NotValidYet);
            }
        }
        Ok(())
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str, name: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|err| TokenError::Malformed(format!("{}: {}", name, err)))?;
    serde_json::from_slice(&bytes).map_err(|err| TokenError::Malformed(format!("{}: {}", name, err)))
}
