use crate::crypto::{publickey_from_hex, KitePublicKey};

/// Resolves the public key of the trust root ("kontrol") that signs kite keys.
pub trait KeyResolver: Send + Sync {
    fn kontrol_key(&self) -> crate::Result<KitePublicKey>;
}

/// A kontrol key known up front, e.g. read from config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticKey(pub KitePublicKey);

impl StaticKey {
    pub fn from_hex(publickey_hex: &str) -> crate::Result<StaticKey> {
        Ok(StaticKey(publickey_from_hex(publickey_hex)?))
    }
}

impl KeyResolver for StaticKey {
    fn kontrol_key(&self) -> crate::Result<KitePublicKey> {
        Ok(self.0)
    }
}

/// Used when no kontrol key is configured; every kite key is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKontrolKey;

impl KeyResolver for NoKontrolKey {
    fn kontrol_key(&self) -> crate::Result<KitePublicKey> {
        Err("kontrol key is not configured".into())
    }
}

impl<F> KeyResolver for F
where
    F: Fn() -> crate::Result<KitePublicKey> + Send + Sync,
{
    fn kontrol_key(&self) -> crate::Result<KitePublicKey> {
        self()
    }
}
