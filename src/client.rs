use crate::dnode::{CallbackPaths, Message, Method, Partial, Transport, FUNCTION_PLACEHOLDER};
use crate::kite::Kite;
use crate::protocol::{self, Authentication, KiteError, Response};
use crate::request::{Callback, HandlerFunc, Request};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
struct RemoteState {
    kite: protocol::Kite,
    verified_username: Option<String>,
}

/// One connection to a remote kite.
///
/// A client either dialed out from this kite (`remote_addr` is empty) or was accepted
/// from a remote caller. Calls arriving on accepted connections must authenticate.
pub struct Client {
    local: Arc<Kite>,
    remote_addr: String,
    remote: Mutex<RemoteState>,
    first_request_notified: Mutex<bool>,
    authentication: Option<Authentication>,
    transport: Arc<dyn Transport>,
    callbacks: Mutex<HashMap<u64, Callback>>,
    next_callback_id: AtomicU64,
}

impl Client {
    pub fn new(local: Arc<Kite>, remote_addr: &str, transport: Arc<dyn Transport>) -> Client {
        Client {
            local,
            remote_addr: String::from(remote_addr),
            remote: Mutex::new(RemoteState::default()),
            first_request_notified: Mutex::new(false),
            authentication: None,
            transport,
            callbacks: Mutex::new(HashMap::new()),
            next_callback_id: AtomicU64::new(1),
        }
    }

    /// The identity of a kite we dialed ourselves.
    pub fn with_remote_kite(self, kite: protocol::Kite) -> Client {
        Client {
            remote: Mutex::new(RemoteState {
                kite,
                verified_username: None,
            }),
            ..self
        }
    }

    /// Credentials attached to every call made with `tell`.
    pub fn with_authentication(self, authentication: Authentication) -> Client {
        Client {
            authentication: Some(authentication),
            ..self
        }
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Whether the remote end opened this connection.
    pub fn is_inbound(&self) -> bool {
        !self.remote_addr.is_empty()
    }

    pub fn local_kite(&self) -> &Arc<Kite> {
        &self.local
    }

    /// The remote identity: as declared on the first request, with the username replaced
    /// by the verified one once a caller authenticated.
    pub async fn remote_kite(&self) -> protocol::Kite {
        self.remote.lock().await.kite.clone()
    }

    /// Record the identity the remote declared and run the first-request hooks. Only the
    /// first request on a connection gets here, however many arrive concurrently.
    pub(crate) async fn notify_first_request(&self, declared: &protocol::Kite) {
        let mut notified = self.first_request_notified.lock().await;
        if *notified {
            return;
        }
        *notified = true;

        self.remote.lock().await.kite = declared.clone();
        info!("first request from {} ({})", declared, self.remote_addr);
        self.local.call_on_first_request_handlers(self);
    }

    /// Pin the connection to `username`. A different username cannot be verified later
    /// on the same connection.
    pub(crate) async fn pin_username(&self, username: &str) -> Result<(), KiteError> {
        let mut remote = self.remote.lock().await;
        if let Some(pinned) = &remote.verified_username {
            if pinned != username {
                return Err(KiteError::authentication(format!(
                    "Connection is already authenticated as {}",
                    pinned
                )));
            }
        }
        remote.verified_username = Some(String::from(username));
        remote.kite.username = String::from(username);
        Ok(())
    }

    /// Handle one message received on this connection.
    pub async fn process_message(self: &Arc<Self>, message: Message) {
        let args = Partial::new(
            message.arguments,
            message.callbacks,
            Some(self.transport.clone()),
        );

        match message.method {
            Method::Callback(id) => {
                let callback = self.callbacks.lock().await.remove(&id);
                match callback {
                    Some(callback) => self.run_callback(callback, args),
                    None => warn!("callback {} from {} is not registered", id, self.remote_addr),
                }
            }
            Method::Name(method) => {
                let handler = self
                    .local
                    .handler(&method)
                    .unwrap_or_else(|| method_not_found(&method));
                self.run_method(&method, handler, args).await;
            }
        }
    }

    /// Read messages until the remote side hangs up. Each message is handled on its own
    /// task, so a slow handler does not hold up the connection.
    pub async fn run(self: Arc<Self>, mut incoming: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = incoming.recv().await {
            let client = self.clone();
            tokio::spawn(async move {
                client.process_message(message).await;
            });
        }
        debug!("connection {} closed", self.remote_addr);
    }

    /// Call `method` on the remote kite and wait for its response.
    pub async fn tell(self: &Arc<Self>, method: &str, args: Vec<Value>) -> crate::Result<Value> {
        let (sender, receiver) = oneshot::channel();
        let id = self.next_callback_id.fetch_add(1, Ordering::SeqCst);
        let callback: Callback = Box::new(move |reply: Partial| {
            let _ = sender.send(reply);
        });
        self.callbacks.lock().await.insert(id, callback);

        let mut callbacks = CallbackPaths::new();
        callbacks.insert(id, vec![String::from("0"), String::from("responseCallback")]);
        let message = Message {
            method: Method::Name(String::from(method)),
            arguments: json!([{
                "kite": self.local.kite(),
                "authentication": self.authentication,
                "withArgs": args,
                "responseCallback": FUNCTION_PLACEHOLDER,
            }]),
            callbacks,
        };
        if let Err(err) = self.transport.send(message) {
            self.callbacks.lock().await.remove(&id);
            return Err(err);
        }

        let timeout = Duration::from_millis(self.local.config.tell_timeout_ms);
        let reply = match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(format!("response to {} was dropped", method).into()),
            Err(_) => {
                self.callbacks.lock().await.remove(&id);
                return Err(format!(
                    "no response to {} within {}ms",
                    method, self.local.config.tell_timeout_ms
                )
                .into());
            }
        };

        let response: Response = reply.one()?.unmarshal()?;
        match response.error {
            Some(err) => Err(Box::new(err)),
            None => Ok(response.result),
        }
    }
}

fn method_not_found(method: &str) -> HandlerFunc {
    let err = KiteError::method_not_found(method);
    Arc::new(move |_request: Request| -> BoxFuture<'static, crate::Result<Value>> {
        let err = err.clone();
        Box::pin(async move { Err(Box::new(err) as crate::Error) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::TOKEN;
    use crate::config::KiteConfig;
    use crate::protocol::{AUTHENTICATION_ERROR, METHOD_NOT_FOUND};
    use crate::test_utilities::{call_message, connect, make_kite_with, RecordingTransport};
    use std::sync::atomic::AtomicUsize;

    async fn add(request: Request) -> crate::Result<Value> {
        let numbers: Vec<f64> = request.args.unmarshal()?;
        Ok(json!(numbers.iter().sum::<f64>()))
    }

    async fn whoami(request: Request) -> crate::Result<Value> {
        Ok(json!(request.username))
    }

    fn math_kite(config: KiteConfig) -> Arc<Kite> {
        make_kite_with(config, |local| {
            local.handle_func("math.add", add);
            local.handle_func("whoami", whoami);
        })
    }

    #[tokio::test]
    async fn test_tell_with_token() {
        let server = math_kite(KiteConfig::default());
        let caller = make_kite_with(KiteConfig::default(), |_| {});
        let token = server
            .issue_token("alice", &server.kite().to_string(), Duration::from_secs(60))
            .unwrap();

        let (client, _accepted) = connect(&caller, &server, Some(Authentication::new(TOKEN, &token)));

        let sum = client.tell("math.add", vec![json!(2), json!(3)]).await.unwrap();
        assert_eq!(sum, json!(5.0));
        let username = client.tell("whoami", vec![]).await.unwrap();
        assert_eq!(username, json!("alice"));
    }

    #[tokio::test]
    async fn test_tell_returns_remote_errors() {
        let server = math_kite(KiteConfig::default());
        let caller = make_kite_with(KiteConfig::default(), |_| {});

        let (client, _accepted) = connect(&caller, &server, None);
        let err = client.tell("math.add", vec![json!(2), json!(3)]).await.unwrap_err();
        let err = err.downcast::<KiteError>().unwrap();
        assert_eq!(err.error_type, AUTHENTICATION_ERROR);
        assert_eq!(err.message, "No authentication information is provided");
    }

    #[tokio::test]
    async fn test_method_not_found_and_ping() {
        let server = math_kite(KiteConfig {
            disable_authentication: true,
            ..KiteConfig::default()
        });
        let caller = make_kite_with(KiteConfig::default(), |_| {});
        let (client, _accepted) = connect(&caller, &server, None);

        let err = client.tell("math.sqrt", vec![]).await.unwrap_err();
        let err = err.downcast::<KiteError>().unwrap();
        assert_eq!(*err, KiteError::new(METHOD_NOT_FOUND, "Method not found: math.sqrt"));

        assert_eq!(client.tell("kite.ping", vec![]).await.unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn test_tell_times_out() {
        let caller = make_kite_with(
            KiteConfig {
                tell_timeout_ms: 50,
                ..KiteConfig::default()
            },
            |_| {},
        );
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(Client::new(caller, "", transport.clone()));

        let err = client.tell("math.add", vec![json!([1])]).await.unwrap_err();
        assert_eq!(err.to_string(), "no response to math.add within 50ms");
        assert_eq!(transport.messages().len(), 1);
        assert!(client.callbacks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_first_request_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let server = make_kite_with(
            KiteConfig {
                disable_authentication: true,
                ..KiteConfig::default()
            },
            move |local| {
                local.handle_func("math.add", add);
                let counter = counter.clone();
                local.on_first_request(move |_client: &Client| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            },
        );
        let caller = make_kite_with(KiteConfig::default(), |_| {});
        let (client, accepted) = connect(&caller, &server, None);

        let calls = (0..16).map(|i| {
            let client = client.clone();
            async move { client.tell("math.add", vec![json!(i), json!(1)]).await }
        });
        for result in futures::future::join_all(calls).await {
            assert!(result.is_ok());
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(accepted.remote_kite().await, *caller.kite());
    }

    #[tokio::test]
    async fn test_connection_pins_first_verified_username() {
        let server = math_kite(KiteConfig::default());
        let audience = server.kite().to_string();
        let alice = server.issue_token("alice", &audience, Duration::from_secs(60)).unwrap();
        let bob = server.issue_token("bob", &audience, Duration::from_secs(60)).unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let accepted = Arc::new(Client::new(server, "10.0.0.7:41000", transport.clone()));

        for token in vec![&alice, &bob, &alice] {
            let message = call_message("whoami", json!([]), Some(Authentication::new(TOKEN, token)), true);
            accepted.process_message(message).await;
        }

        let responses: Vec<Response> = transport
            .messages()
            .into_iter()
            .map(|message| serde_json::from_value(message.arguments[0].clone()).unwrap())
            .collect();
        assert_eq!(responses[0], Response::from(Ok(json!("alice"))));
        assert_eq!(
            responses[1],
            Response::from(Err(KiteError::authentication(
                "Connection is already authenticated as alice"
            )))
        );
        assert_eq!(responses[2], Response::from(Ok(json!("alice"))));
        assert_eq!(accepted.remote_kite().await.username, "alice");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_logins_pin_one_username() {
        let server = math_kite(KiteConfig::default());
        let audience = server.kite().to_string();
        let alice = server.issue_token("alice", &audience, Duration::from_secs(60)).unwrap();
        let bob = server.issue_token("bob", &audience, Duration::from_secs(60)).unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let accepted = Arc::new(Client::new(server, "10.0.0.7:41000", transport.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let token = if i % 2 == 0 { alice.clone() } else { bob.clone() };
                let accepted = accepted.clone();
                tokio::spawn(async move {
                    let message =
                        call_message("whoami", json!([]), Some(Authentication::new(TOKEN, &token)), true);
                    accepted.process_message(message).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let pinned = accepted.remote_kite().await.username;
        assert!(pinned == "alice" || pinned == "bob");
        let responses: Vec<Response> = transport
            .messages()
            .into_iter()
            .map(|message| serde_json::from_value(message.arguments[0].clone()).unwrap())
            .collect();
        assert_eq!(responses.len(), 8);

        let succeeded: Vec<&Response> = responses.iter().filter(|r| r.error.is_none()).collect();
        assert_eq!(succeeded.len(), 4);
        for response in succeeded {
            assert_eq!(response.result, json!(pinned));
        }
        for response in responses.iter().filter(|r| r.error.is_some()) {
            assert_eq!(
                response.error,
                Some(KiteError::authentication(format!(
                    "Connection is already authenticated as {}",
                    pinned
                )))
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_callback_is_ignored() {
        let local = math_kite(KiteConfig::default());
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(Client::new(local, "10.0.0.7:41000", transport.clone()));

        client
            .process_message(Message {
                method: Method::Callback(99),
                arguments: json!([{"error": null, "result": 1}]),
                callbacks: CallbackPaths::new(),
            })
            .await;
        assert!(transport.messages().is_empty());
    }
}
