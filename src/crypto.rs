use secp256k1::{Message, PublicKey, Signature, SECP256K1};
use sha2::{Digest, Sha256};

pub type KiteHash = [u8; 32];
pub type KitePublicKey = [u8; 33];
pub type KitePrivateKey = [u8; 32];
pub type KiteSignature = [u8; 64];

pub fn hash(data: &[u8]) -> KiteHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut output = [0u8; 32];
    output.copy_from_slice(hasher.finalize().as_slice());
    output
}

/// Verify a compact secp256k1 signature over a 32 byte message hash.
pub fn verify(message_hash: &KiteHash, sig: &KiteSignature, publickey: &KitePublicKey) -> bool {
    let msg = match Message::from_slice(message_hash) {
        Ok(msg) => msg,
        Err(_) => return false,
    };
    let sig = match Signature::from_compact(sig) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    let publickey = match PublicKey::from_slice(publickey) {
        Ok(publickey) => publickey,
        Err(_) => return false,
    };
    SECP256K1.verify(&msg, &sig, &publickey).is_ok()
}

/// Decode a hex encoded compressed public key, rejecting points not on the curve.
pub fn publickey_from_hex(publickey_hex: &str) -> crate::Result<KitePublicKey> {
    let mut publickey = [0u8; 33];
    hex::decode_to_slice(publickey_hex.trim(), &mut publickey as &mut [u8])?;
    PublicKey::from_slice(&publickey)?;
    Ok(publickey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::Keypair;

    #[test]
    fn hash_is_sha256() {
        assert_eq!(
            hex::encode(hash(b"hello world")),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn verify_accepts_only_matching_key() {
        let keypair = Keypair::new();
        let other = Keypair::new();
        let message_hash = hash(b"kite");
        let sig = keypair.sign_hash(&message_hash).unwrap();

        assert!(verify(&message_hash, &sig, &keypair.publickey()));
        assert!(!verify(&message_hash, &sig, &other.publickey()));
        assert!(!verify(&hash(b"other"), &sig, &keypair.publickey()));
    }

    #[test]
    fn publickey_from_hex_test() {
        let keypair = Keypair::new();
        let publickey_hex = hex::encode(keypair.publickey());
        assert_eq!(publickey_from_hex(&publickey_hex).unwrap(), keypair.publickey());

        assert!(publickey_from_hex("randomtext").is_err());
        assert!(publickey_from_hex(&hex::encode([7u8; 33])).is_err());
    }
}
