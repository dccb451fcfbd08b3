/*!
# dnode messages

Kites talk to each other with JSON messages in the dnode style:

```json
{"method": "math.add", "arguments": [{...}], "callbacks": {"12": ["0", "responseCallback"]}}
```

`method` is either the name of a registered handler or the numeric id of a callback the
receiver handed out earlier. Functions cannot be serialized, so a caller replaces every
function it passes with the placeholder string `"[Function]"` and lists its path inside
`arguments` under a fresh callback id. The receiver turns those paths back into callable
`Function` values bound to the connection's `Transport`.
*/
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const FUNCTION_PLACEHOLDER: &str = "[Function]";

pub type CallbackPaths = BTreeMap<u64, Vec<String>>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Method {
    Callback(u64),
    Name(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub method: Method,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub callbacks: CallbackPaths,
}

/// Sends messages to the remote end of a connection. Delivery is fire-and-forget.
pub trait Transport: Send + Sync {
    fn send(&self, message: Message) -> crate::Result<()>;
}

impl Transport for mpsc::UnboundedSender<Message> {
    fn send(&self, message: Message) -> crate::Result<()> {
        mpsc::UnboundedSender::send(self, message).map_err(|_| "connection is closed".into())
    }
}

/// Returned when call arguments do not have the expected shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentError {
    message: String,
}

impl ArgumentError {
    pub fn new(message: impl Into<String>) -> ArgumentError {
        ArgumentError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ArgumentError {}

impl From<serde_json::Error> for ArgumentError {
    fn from(err: serde_json::Error) -> Self {
        ArgumentError::new(err.to_string())
    }
}

/// A part of the arguments of a received message, decoded lazily.
#[derive(Clone)]
pub struct Partial {
    raw: Value,
    path: Vec<String>,
    callbacks: Arc<CallbackPaths>,
    transport: Option<Arc<dyn Transport>>,
}

impl Partial {
    pub fn new(
        raw: Value,
        callbacks: CallbackPaths,
        transport: Option<Arc<dyn Transport>>,
    ) -> Partial {
        Partial {
            raw,
            path: vec![],
            callbacks: Arc::new(callbacks),
            transport,
        }
    }

    fn child(&self, raw: Value, key: String) -> Partial {
        let mut path = self.path.clone();
        path.push(key);
        Partial {
            raw,
            path,
            callbacks: self.callbacks.clone(),
            transport: self.transport.clone(),
        }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T, ArgumentError> {
        Ok(serde_json::from_value(self.raw.clone())?)
    }

    pub fn slice(&self) -> Result<Vec<Partial>, ArgumentError> {
        match &self.raw {
            Value::Array(items) => Ok(items
                .iter()
                .enumerate()
                .map(|(idx, item)| self.child(item.clone(), idx.to_string()))
                .collect()),
            other => Err(ArgumentError::new(format!("expected an array, got {}", other))),
        }
    }

    pub fn slice_of_length(&self, length: usize) -> Result<Vec<Partial>, ArgumentError> {
        let items = self.slice()?;
        if items.len() != length {
            return Err(ArgumentError::new(format!(
                "expected {} arguments, got {}",
                length,
                items.len()
            )));
        }
        Ok(items)
    }

    /// The single element of an argument array.
    pub fn one(&self) -> Result<Partial, ArgumentError> {
        let mut items = self.slice_of_length(1)?;
        Ok(items.remove(0))
    }

    /// A field of an object argument, `None` when absent.
    pub fn get(&self, key: &str) -> Option<Partial> {
        self.raw
            .get(key)
            .map(|value| self.child(value.clone(), String::from(key)))
    }

    /// The function the sender registered at this position, if any.
    pub fn function(&self) -> Option<Function> {
        let transport = self.transport.clone()?;
        self.callbacks
            .iter()
            .find(|(_, path)| **path == self.path)
            .map(|(id, _)| Function {
                id: *id,
                transport,
            })
    }
}

impl fmt::Debug for Partial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partial")
            .field("raw", &self.raw)
            .field("path", &self.path)
            .finish()
    }
}

/// A function living on the remote side of a connection.
#[derive(Clone)]
pub struct Function {
    id: u64,
    transport: Arc<dyn Transport>,
}

impl Function {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Invoke the remote function with a single argument.
    pub fn call<T: Serialize>(&self, argument: T) -> crate::Result<()> {
        let message = Message {
            method: Method::Callback(self.id),
            arguments: Value::Array(vec![serde_json::to_value(argument)?]),
            callbacks: CallbackPaths::new(),
        };
        self.transport.send(message)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("id", &self.id).finish()
    }
}
