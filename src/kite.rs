use crate::authenticator::{Authenticator, KiteKeyAuthenticator, TokenAuthenticator, KITE_KEY, TOKEN};
use crate::client::Client;
use crate::config::KiteConfig;
use crate::crypto::KitePublicKey;
use crate::keypair::Keypair;
use crate::kitekey::{KeyResolver, NoKontrolKey, StaticKey};
use crate::protocol;
use crate::request::{HandlerFunc, Request};
use crate::token::{Claims, Token};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub type FirstRequestHandler = Arc<dyn Fn(&Client) + Send + Sync>;

/// The hosting service. Handlers, authenticators and hooks are registered while the
/// kite is being set up; once it is shared behind an `Arc` it is read-only.
pub struct Kite {
    pub config: KiteConfig,
    kite: protocol::Kite,
    keypair: Keypair,
    key_resolver: Arc<dyn KeyResolver>,
    handlers: HashMap<String, HandlerFunc>,
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
    first_request_handlers: Vec<FirstRequestHandler>,
}

impl Kite {
    /// Returns a Kite
    /// # Arguments
    ///
    /// * `name` - name of the service, part of its identity
    /// * `version` - semantic version of the service
    /// * `config` - see `KiteConfig::load`
    pub fn new(name: &str, version: &str, config: KiteConfig) -> crate::Result<Kite> {
        let keypair = match &config.private_key {
            Some(private_key) => Keypair::from_secret_hex(private_key)?,
            None => Keypair::new(),
        };
        let key_resolver: Arc<dyn KeyResolver> = match &config.kontrol_key {
            Some(kontrol_key) => Arc::new(StaticKey::from_hex(kontrol_key)?),
            None => Arc::new(NoKontrolKey),
        };
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("localhost"));
        let kite = protocol::Kite {
            username: config.username.clone(),
            environment: config.environment.clone(),
            name: String::from(name),
            version: String::from(version),
            region: config.region.clone(),
            hostname,
            id: config.id.clone(),
        };

        let mut local = Kite {
            config,
            kite,
            keypair,
            key_resolver,
            handlers: HashMap::new(),
            authenticators: HashMap::new(),
            first_request_handlers: vec![],
        };
        local.set_authenticator(TOKEN, TokenAuthenticator);
        local.set_authenticator(KITE_KEY, KiteKeyAuthenticator);
        local.handle_func("kite.ping", ping);
        Ok(local)
    }

    /// Register a handler to run when a method call is received from a kite.
    pub fn handle_func<F, Fut>(&mut self, method: &str, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::Result<Value>> + Send + 'static,
    {
        let handler: HandlerFunc =
            Arc::new(move |request: Request| -> BoxFuture<'static, crate::Result<Value>> {
                Box::pin(handler(request))
            });
        self.handlers.insert(String::from(method), handler);
    }

    pub fn handler(&self, method: &str) -> Option<HandlerFunc> {
        self.handlers.get(method).cloned()
    }

    /// Register the verification strategy selected by `authentication.type == auth_type`.
    pub fn set_authenticator<A>(&mut self, auth_type: &str, authenticator: A)
    where
        A: Authenticator + 'static,
    {
        self.authenticators
            .insert(String::from(auth_type), Arc::new(authenticator));
    }

    pub fn authenticator(&self, auth_type: &str) -> Option<&Arc<dyn Authenticator>> {
        self.authenticators.get(auth_type)
    }

    /// Register a function to run once per connection, when its first request arrives.
    ///
    /// Hooks run on the runtime while the connection's first-request gate is held. They
    /// must not block, and must not lock or call back into the `Client` they are given.
    pub fn on_first_request<F>(&mut self, handler: F)
    where
        F: Fn(&Client) + Send + Sync + 'static,
    {
        self.first_request_handlers.push(Arc::new(handler));
    }

    pub(crate) fn call_on_first_request_handlers(&self, client: &Client) {
        for handler in &self.first_request_handlers {
            handler(client);
        }
    }

    pub fn set_key_resolver<R>(&mut self, key_resolver: R)
    where
        R: KeyResolver + 'static,
    {
        self.key_resolver = Arc::new(key_resolver);
    }

    pub fn key_resolver(&self) -> &dyn KeyResolver {
        self.key_resolver.as_ref()
    }

    /// Identity of this kite.
    pub fn kite(&self) -> &protocol::Kite {
        &self.kite
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Public key that tokens addressed to this kite must be signed with.
    pub fn token_key(&self) -> KitePublicKey {
        self.keypair.publickey()
    }

    /// Sign a token for `subject`, valid against kites whose identity starts with `audience`.
    pub fn issue_token(&self, subject: &str, audience: &str, ttl: Duration) -> crate::Result<String> {
        debug!("issuing token for {} to {}", subject, audience);
        let claims = Claims::new(&self.kite.to_string(), subject, audience, ttl);
        Token::new(claims).sign(&self.keypair)
    }
}

async fn ping(_request: Request) -> crate::Result<Value> {
    Ok(Value::from("pong"))
}
