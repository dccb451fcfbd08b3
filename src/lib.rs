/*!
# Welcome to kite-rust

A kite is a small service that exposes named methods to other kites over a persistent
connection. Calls are JSON messages in the dnode style; every call carries the caller's
identity, an optional credential and a callback the result is delivered to.

This crate implements the receiving side of a call: parsing the call options,
authenticating the caller, running the registered handler and answering through the
callback. It also carries the calling side (`Client::tell`) and a small command line
tool for managing keys and tokens.

# Usage

```no_run
use kite_rust::{config::KiteConfig, kite::Kite, request::Request};
use serde_json::Value;

async fn add(request: Request) -> kite_rust::Result<Value> {
    let numbers: Vec<f64> = request.args.unmarshal()?;
    Ok(Value::from(numbers.iter().sum::<f64>()))
}

# fn main() -> kite_rust::Result<()> {
let mut math = Kite::new("math", "1.0.0", KiteConfig::load("kite")?)?;
math.handle_func("math.add", add);
# Ok(())
# }
```

# Contact

The Kite Developers
dev@kite.dev

*/
pub mod authenticator;
pub mod client;
pub mod config;
pub mod crypto;
pub mod dnode;
pub mod keypair;
pub mod kite;
pub mod kitekey;
pub mod protocol;
pub mod request;
pub mod time;
pub mod token;

#[cfg(test)]
pub mod test_utilities;

mod test_setup;

/// Error returned by most functions.
///
/// Handlers return it too; a `protocol::KiteError` keeps its type when it is sent back to
/// the caller, anything else is reported as a `genericError`.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for kite operations.
pub type Result<T> = std::result::Result<T, Error>;
