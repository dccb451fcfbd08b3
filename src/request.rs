/*!
# Request dispatch

Every method call received from a remote kite goes through the same pipeline:

```text
Received -> Parsed -> {AuthSkipped | AuthOK | AuthFailed} -> Handler -> {Succeeded | Failed}
         -> Responded | NoResponseExpected
```

The pipeline is a chain of `Result<_, KiteError>`; argument errors, authentication
failures, handler errors and handler panics all end up as a single `KiteError`. If the
caller passed a `responseCallback` it receives exactly one `Response`, otherwise the
failure is only logged.
*/
use crate::client::Client;
use crate::dnode::{Function, Partial};
use crate::kite::Kite;
use crate::protocol::{self, Authentication, KiteError, Response};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A registered method handler. The returned value must serialize to JSON.
pub type HandlerFunc = Arc<dyn Fn(Request) -> BoxFuture<'static, crate::Result<Value>> + Send + Sync>;

/// A callback this kite passed to a remote kite, invoked when the remote calls it back.
pub type Callback = Box<dyn FnOnce(Partial) + Send>;

/// An incoming method call.
#[derive(Clone)]
pub struct Request {
    pub method: String,
    /// the `withArgs` part of the call
    pub args: Partial,
    pub local_kite: Arc<Kite>,
    pub client: Arc<Client>,
    /// set once authentication succeeded or was skipped
    pub username: Option<String>,
    pub authentication: Option<Authentication>,
}

/// The single argument of every method call.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct CallOptions {
    #[serde(default)]
    kite: protocol::Kite,
    #[serde(default)]
    authentication: Option<Authentication>,
    #[serde(default)]
    with_args: Value,
}

impl Request {
    /// Check the caller's credential and return the username it belongs to.
    ///
    /// Calls arriving on a connection this kite opened are trusted. On success the
    /// username is pinned on the connection, so one connection cannot speak for two
    /// different users.
    pub async fn authenticate(&self) -> Result<String, KiteError> {
        if !self.client.is_inbound() {
            return Ok(self.client.remote_kite().await.username);
        }

        let authentication = match &self.authentication {
            Some(authentication) => authentication,
            None => {
                return Err(KiteError::authentication(
                    "No authentication information is provided",
                ))
            }
        };

        let authenticator = self
            .local_kite
            .authenticator(&authentication.auth_type)
            .ok_or_else(|| {
                KiteError::authentication(format!(
                    "Unknown authentication type: {}",
                    authentication.auth_type
                ))
            })?;

        let username = authenticator
            .verify(self)
            .map_err(|err| KiteError::authentication(err.to_string()))?;

        self.client.pin_username(&username).await?;
        debug!("authenticated {} as {}", self.client.remote_addr(), username);
        Ok(username)
    }
}

impl Client {
    /// Handle a method call received from the remote kite. Never panics; the outcome is
    /// delivered through the caller's response callback when there is one.
    pub async fn run_method(self: &Arc<Self>, method: &str, handler: HandlerFunc, args: Partial) {
        let callback = response_callback(&args);

        let outcome = AssertUnwindSafe(self.dispatch(method, handler, args))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(KiteError::from_panic(panic)));

        if let Err(err) = &outcome {
            warn!("Error in received message {}: {}", method, err);
        }

        let callback = match callback {
            Some(callback) => callback,
            None => return,
        };
        if let Err(err) = callback.call(Response::from(outcome)) {
            error!("cannot send response for {}: {}", method, err);
        }
    }

    async fn dispatch(
        self: &Arc<Self>,
        method: &str,
        handler: HandlerFunc,
        args: Partial,
    ) -> Result<Value, KiteError> {
        let mut request = self.new_request(method, &args).await?;

        let username = if self.local_kite().config.disable_authentication {
            self.remote_kite().await.username
        } else {
            request.authenticate().await?
        };
        request.username = Some(username);

        handler(request).await.map_err(KiteError::from_handler_error)
    }

    /// Parse the call options out of `args`: `[{kite, authentication, withArgs, responseCallback}]`.
    pub async fn new_request(
        self: &Arc<Self>,
        method: &str,
        args: &Partial,
    ) -> Result<Request, KiteError> {
        let options = args
            .one()
            .map_err(|err| KiteError::argument(err.to_string()))?;
        let call_options: CallOptions = options
            .unmarshal()
            .map_err(|err| KiteError::argument(err.to_string()))?;

        if self.is_inbound() {
            self.notify_first_request(&call_options.kite).await;
        }

        let with_args = options
            .get("withArgs")
            .unwrap_or_else(|| Partial::new(Value::Null, Default::default(), None));

        Ok(Request {
            method: String::from(method),
            args: with_args,
            local_kite: self.local_kite().clone(),
            client: self.clone(),
            username: None,
            authentication: call_options.authentication,
        })
    }

    /// Invoke a callback the remote kite called back. Failures are logged and dropped;
    /// nothing is sent back for a callback.
    pub fn run_callback(&self, callback: Callback, args: Partial) {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(move || callback(args)));
        if let Err(panic) = outcome {
            warn!("Error in callback: {}", KiteError::from_panic(panic));
        }
    }
}

fn response_callback(args: &Partial) -> Option<Function> {
    args.one().ok()?.get("responseCallback")?.function()
}
