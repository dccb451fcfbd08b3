use crate::client::Client;
use crate::config::KiteConfig;
use crate::dnode::{CallbackPaths, Message, Method, Partial, Transport, FUNCTION_PLACEHOLDER};
use crate::kite::Kite;
use crate::protocol::{self, Authentication};
use crate::request::Request;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Keeps every message sent through it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Message>>,
}

impl RecordingTransport {
    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, message: Message) -> crate::Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

pub fn make_kite(name: &str, config: KiteConfig) -> Arc<Kite> {
    Arc::new(Kite::new(name, "1.0.0", config).unwrap())
}

pub fn make_kite_with<F>(config: KiteConfig, setup: F) -> Arc<Kite>
where
    F: FnOnce(&mut Kite),
{
    let mut local = Kite::new("math", "1.0.0", config).unwrap();
    setup(&mut local);
    Arc::new(local)
}

/// A request received on an accepted connection, before authentication.
pub fn make_request(local: Arc<Kite>, authentication: Option<Authentication>) -> Request {
    let transport = Arc::new(RecordingTransport::default());
    let client = Arc::new(Client::new(local.clone(), "127.0.0.1:54321", transport.clone()));
    Request {
        method: String::from("math.add"),
        args: Partial::new(Value::Null, CallbackPaths::new(), Some(transport)),
        local_kite: local,
        client,
        username: None,
        authentication,
    }
}

pub fn caller_identity() -> protocol::Kite {
    protocol::Kite {
        username: String::from("caller"),
        environment: String::from("test"),
        name: String::from("caller"),
        version: String::from("1.0.0"),
        region: String::from("local"),
        hostname: String::from("localhost"),
        id: String::from("caller-1"),
    }
}

/// A call as a remote kite would send it. The response callback, if any, has id 1.
pub fn call_message(
    method: &str,
    with_args: Value,
    authentication: Option<Authentication>,
    response_callback: bool,
) -> Message {
    let mut options = json!({
        "kite": caller_identity(),
        "withArgs": with_args,
    });
    if let Some(authentication) = authentication {
        options["authentication"] = json!(authentication);
    }
    let mut callbacks = CallbackPaths::new();
    if response_callback {
        options["responseCallback"] = json!(FUNCTION_PLACEHOLDER);
        callbacks.insert(1, vec![String::from("0"), String::from("responseCallback")]);
    }
    Message {
        method: Method::Name(String::from(method)),
        arguments: json!([options]),
        callbacks,
    }
}

/// The arguments of `call_message`, answering through `transport`.
pub fn call_args(
    transport: &Arc<RecordingTransport>,
    with_args: Value,
    authentication: Option<Authentication>,
    response_callback: bool,
) -> Partial {
    let message = call_message("math.add", with_args, authentication, response_callback);
    let transport: Arc<dyn Transport> = transport.clone();
    Partial::new(message.arguments, message.callbacks, Some(transport))
}

/// Connect `caller` to `server` over in-memory channels. Returns the caller's side of the
/// connection and the side `server` accepted.
pub fn connect(
    caller: &Arc<Kite>,
    server: &Arc<Kite>,
    authentication: Option<Authentication>,
) -> (Arc<Client>, Arc<Client>) {
    let (to_server, server_incoming) = mpsc::unbounded_channel::<Message>();
    let (to_caller, caller_incoming) = mpsc::unbounded_channel::<Message>();

    let mut outgoing = Client::new(caller.clone(), "", Arc::new(to_server))
        .with_remote_kite(server.kite().clone());
    if let Some(authentication) = authentication {
        outgoing = outgoing.with_authentication(authentication);
    }
    let outgoing = Arc::new(outgoing);
    let accepted = Arc::new(Client::new(server.clone(), "127.0.0.1:54321", Arc::new(to_caller)));

    tokio::spawn(outgoing.clone().run(caller_incoming));
    tokio::spawn(accepted.clone().run(server_incoming));
    (outgoing, accepted)
}
