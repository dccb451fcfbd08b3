use crate::crypto::{KiteHash, KitePrivateKey, KitePublicKey, KiteSignature};
use base58::ToBase58;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use std::fmt;

/// An secp256k1 keypair for signing and verifying kite tokens
#[derive(Debug, Clone, PartialEq)]
pub struct Keypair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl Keypair {
    /// Create and return a keypair with a randomly generated private key.
    pub fn new() -> Keypair {
        let (secret_key, public_key) =
            SECP256K1.generate_keypair(&mut secp256k1::rand::thread_rng());
        Keypair {
            secret_key,
            public_key,
        }
    }

    /// Create and return a keypair with the given u8 slice as the private key
    pub fn from_secret_slice(slice: &[u8]) -> Result<Keypair, secp256k1::Error> {
        let secret_key = SecretKey::from_slice(slice)?;
        let public_key = PublicKey::from_secret_key(&SECP256K1, &secret_key);

        Ok(Keypair {
            secret_key,
            public_key,
        })
    }

    /// Create and return a keypair with the given hex string as the private key
    pub fn from_secret_hex(secret_hex: &str) -> crate::Result<Keypair> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(secret_hex.trim(), &mut bytes as &mut [u8])?;
        Ok(Keypair::from_secret_slice(&bytes)?)
    }

    /// Get the public key of the keypair in base58(i.e. address) format
    pub fn address(&self) -> String {
        self.public_key.serialize().to_base58()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Compressed public key bytes, the form carried in config and key files
    pub fn publickey(&self) -> KitePublicKey {
        self.public_key.serialize()
    }

    pub fn privatekey(&self) -> KitePrivateKey {
        let mut privatekey = [0u8; 32];
        privatekey.copy_from_slice(&self.secret_key[..]);
        privatekey
    }

    /// Sign a 32 byte message hash, returning the compact signature
    pub fn sign_hash(&self, message_hash: &KiteHash) -> crate::Result<KiteSignature> {
        let msg = Message::from_slice(message_hash)?;
        Ok(SECP256K1.sign(&msg, &self.secret_key).serialize_compact())
    }
}

impl Default for Keypair {
    fn default() -> Self {
        Keypair::new()
    }
}

impl fmt::Display for Keypair {
    /// formats a Keypair for println!
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pubkey:{}", hex::encode(self.publickey()))
    }
}
