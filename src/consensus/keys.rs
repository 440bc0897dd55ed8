use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::EncodePublicKey;

/// A node's ECDSA-P256 signing identity. `verify` is an associated function
/// rather than a method since it checks a signature against a *peer's*
/// public key, not this node's own.
pub struct KeyManager {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyManager {
    /// Generate a fresh secp256r1 keypair.
    pub fn new() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let verifying_key = *signing_key.verifying_key();
        KeyManager {
            signing_key,
            verifying_key,
        }
    }

    /// ECDSA-P256 signature over SHA-256 of `bytes`, DER-encoded.
    pub fn sign(&self, bytes: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(bytes);
        signature.to_der().as_bytes().to_vec()
    }

    /// Verify a DER-encoded signature. Any cryptographic or decoding error
    /// is reported as `false`, never as a panic or an `Err` that could leak
    /// past the node's message-handling boundary.
    pub fn verify(public_key: &VerifyingKey, signature: &[u8], bytes: &[u8]) -> bool {
        match Signature::from_der(signature) {
            Ok(signature) => public_key.verify(bytes, &signature).is_ok(),
            Err(_) => false,
        }
    }

    /// This node's public key, as stored in the shared registry.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    /// DER SubjectPublicKeyInfo encoding, for callers that need a stable
    /// bytewise identity rather than the typed key handle.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.verifying_key
            .to_public_key_der()
            .expect("a valid P-256 public key always encodes to DER")
            .as_bytes()
            .to_vec()
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let km = KeyManager::new();
        let msg = b"hello";
        let signature = km.sign(msg);
        assert!(KeyManager::verify(&km.verifying_key(), &signature, msg));
        assert!(!KeyManager::verify(&km.verifying_key(), &signature, b"tamper"));
    }

    #[test]
    fn verify_rejects_garbage_signature_bytes() {
        let km = KeyManager::new();
        assert!(!KeyManager::verify(&km.verifying_key(), &[1, 2, 3], b"hello"));
    }

    #[test]
    fn different_keys_do_not_cross_verify() {
        let a = KeyManager::new();
        let b = KeyManager::new();
        let signature = a.sign(b"hello");
        assert!(!KeyManager::verify(&b.verifying_key(), &signature, b"hello"));
    }

    #[test]
    fn public_key_bytes_are_stable_der() {
        let km = KeyManager::new();
        assert_eq!(km.public_key_bytes(), km.public_key_bytes());
    }
}
