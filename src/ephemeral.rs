//! Secure random values and freshly generated keys.

use rand::RngCore;

use crate::algorithms::{ec, okp, rsa};
use crate::algorithms::jwe::ContentEncryption;
use crate::common::SecretBytes;
use crate::error::*;
use crate::jwa::{Algorithm, KeyType};
use crate::keys::{PrivateKey, PublicKey};

/// `len` bytes from the thread-local CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// A random content encryption key for `enc`.
pub fn content_encryption_key(enc: ContentEncryption) -> SecretBytes {
    SecretBytes::new(enc.generate_cek())
}

/// A random secret sized for `alg`: the hash size for HMAC, the key
/// encryption key size for AES key wrapping.
pub fn secret(alg: Algorithm, enc: Option<ContentEncryption>) -> Result<SecretBytes, Error> {
    let len = match (alg, enc) {
        (Algorithm::Dir, Some(enc)) => enc.key_size(),
        (Algorithm::Dir, None) => {
            bail!(JoseError::illegal_argument(
                "Content encryption algorithm is required"
            ))
        }
        (alg, _) if alg.key_types() == [KeyType::Raw] && alg.size() > 0 => alg.size() / 8,
        (alg, _) => bail!(JoseError::illegal_argument(format!(
            "Illegal type {} for algorithm {}",
            KeyType::Raw,
            alg
        ))),
    };
    Ok(SecretBytes::new(random_bytes(len)))
}

/// Generates a key pair. RSA keys use a 2048-bit modulus.
///
/// The public key is `None` only for curves without a backend
/// implementation, which are rejected before that point.
pub fn key_pair(key_type: KeyType) -> Result<(PrivateKey, Option<PublicKey>), Error> {
    let private_key = match key_type {
        KeyType::Rsa | KeyType::RsaPss => rsa::generate(rsa::DEFAULT_MODULUS_BITS)?,
        KeyType::EcP256 | KeyType::EcP384 | KeyType::EcP521 => ec::generate(key_type)?,
        KeyType::Ed25519 | KeyType::X25519 => okp::generate(key_type)?,
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    };
    let public_key = private_key.public_key()?;
    Ok((private_key, public_key))
}

/// Generates an RSA key pair with a custom modulus size.
pub fn rsa_key_pair(modulus_bits: u32) -> Result<(PrivateKey, PublicKey), Error> {
    let private_key = rsa::generate(modulus_bits)?;
    let public_key = private_key
        .public_key()?
        .ok_or(JoseError::InvalidKeyPair)?;
    Ok((private_key, public_key))
}
