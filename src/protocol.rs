/*!
# Protocol types

Plain data exchanged with remote kites. Every response callback receives a single
`Response`:

```json
{"error": {"type": "authenticationError", "message": "..."}, "result": null}
{"error": null, "result": 5}
```
*/
use crate::dnode::ArgumentError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;

pub const AUTHENTICATION_ERROR: &str = "authenticationError";
pub const ARGUMENT_ERROR: &str = "argumentError";
pub const GENERIC_ERROR: &str = "genericError";
pub const METHOD_NOT_FOUND: &str = "methodNotFound";

/// Identity of a kite on the network.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Kite {
    pub username: String,
    pub environment: String,
    pub name: String,
    pub version: String,
    pub region: String,
    pub hostname: String,
    pub id: String,
}

impl fmt::Display for Kite {
    /// The fully qualified identity. Token audiences are matched as prefixes of it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}/{}/{}/{}/{}/{}",
            self.username,
            self.environment,
            self.name,
            self.version,
            self.region,
            self.hostname,
            self.id
        )
    }
}

/// Credentials a caller attaches to a method call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Authentication {
    #[serde(rename = "type")]
    pub auth_type: String,
    pub key: String,
}

impl Authentication {
    pub fn new(auth_type: &str, key: &str) -> Authentication {
        Authentication {
            auth_type: String::from(auth_type),
            key: String::from(key),
        }
    }
}

/// The error shape sent to remote kites.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KiteError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

impl KiteError {
    pub fn new(error_type: &str, message: impl Into<String>) -> KiteError {
        KiteError {
            error_type: String::from(error_type),
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> KiteError {
        KiteError::new(AUTHENTICATION_ERROR, message)
    }

    pub fn argument(message: impl Into<String>) -> KiteError {
        KiteError::new(ARGUMENT_ERROR, message)
    }

    pub fn generic(message: impl Into<String>) -> KiteError {
        KiteError::new(GENERIC_ERROR, message)
    }

    pub fn method_not_found(method: &str) -> KiteError {
        KiteError::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    /// Normalize an error returned by a handler. Kite errors keep their type.
    pub fn from_handler_error(err: crate::Error) -> KiteError {
        let err = match err.downcast::<KiteError>() {
            Ok(kite_err) => return *kite_err,
            Err(err) => err,
        };
        match err.downcast::<ArgumentError>() {
            Ok(arg_err) => KiteError::argument(arg_err.to_string()),
            Err(err) => KiteError::generic(err.to_string()),
        }
    }

    /// Normalize the payload of a caught panic.
    pub fn from_panic(panic: Box<dyn Any + Send>) -> KiteError {
        if let Some(kite_err) = panic.downcast_ref::<KiteError>() {
            return kite_err.clone();
        }
        let message = if let Some(msg) = panic.downcast_ref::<&str>() {
            String::from(*msg)
        } else if let Some(msg) = panic.downcast_ref::<String>() {
            msg.clone()
        } else {
            String::from("unknown panic")
        };
        KiteError::generic(message)
    }
}

impl fmt::Display for KiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kite error {} - {}", self.error_type, self.message)
    }
}

impl std::error::Error for KiteError {}

/// The only argument passed to a response callback.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    pub error: Option<KiteError>,
    #[serde(default)]
    pub result: Value,
}

impl From<Result<Value, KiteError>> for Response {
    fn from(outcome: Result<Value, KiteError>) -> Self {
        match outcome {
            Ok(result) => Response {
                error: None,
                result,
            },
            Err(err) => Response {
                error: Some(err),
                result: Value::Null,
            },
        }
    }
}
