//! Octet key pairs: Ed25519 signatures and X25519 key agreement.
//!
//! Ed448 and X448 keys can be represented, but no operation is available
//! for them.

use ed25519_compact::x25519;
use p256::pkcs8::der::asn1::{BitStringRef, OctetStringRef};
use p256::pkcs8::der::{Decode, Encode};
use p256::pkcs8::{PrivateKeyInfo, SubjectPublicKeyInfoRef};

use crate::error::*;
use crate::jwa::KeyType;
use crate::keys::{self, PrivateKey, PublicKey};

fn seed_of(private_key: &PrivateKey, expected: KeyType) -> Result<&[u8], Error> {
    match private_key {
        PrivateKey::Okp { curve, d } if *curve == expected => Ok(d.as_bytes()),
        other => bail!(JoseError::UnsupportedKeyType(other.key_type().to_string())),
    }
}

fn ed25519_key_pair(seed: &[u8]) -> Result<ed25519_compact::KeyPair, Error> {
    let seed = ed25519_compact::Seed::from_slice(seed).map_err(|_| JoseError::InvalidKeyPair)?;
    Ok(ed25519_compact::KeyPair::from_seed(seed))
}

pub(crate) fn public_key(curve: KeyType, d: &[u8]) -> Result<Option<PublicKey>, Error> {
    match curve {
        KeyType::Ed25519 => {
            let kp = ed25519_key_pair(d)?;
            Ok(Some(PublicKey::okp(curve, &kp.pk[..])?))
        }
        KeyType::X25519 => {
            let sk = x25519::SecretKey::from_slice(d).map_err(|_| JoseError::InvalidKeyPair)?;
            let pk = sk
                .recover_public_key()
                .map_err(|_| JoseError::InvalidKeyPair)?;
            Ok(Some(PublicKey::okp(curve, &pk[..])?))
        }
        KeyType::Ed448 | KeyType::X448 => Ok(None),
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

/// Parses a `SubjectPublicKeyInfo` already known to hold a key on `curve`.
pub(crate) fn public_key_from_der(curve: KeyType, spki: &[u8]) -> Result<PublicKey, Error> {
    match curve {
        KeyType::Ed25519 => {
            let pk = ed25519_compact::PublicKey::from_der(spki)
                .map_err(|_| JoseError::InvalidPublicKey)?;
            PublicKey::okp(curve, &pk[..])
        }
        KeyType::X25519 => {
            let pk = x25519::PublicKey::from_der(spki).map_err(|_| JoseError::InvalidPublicKey)?;
            PublicKey::okp(curve, &pk[..])
        }
        KeyType::Ed448 | KeyType::X448 => {
            let info = SubjectPublicKeyInfoRef::try_from(spki)
                .map_err(|_| JoseError::InvalidPublicKey)?;
            let x = info
                .subject_public_key
                .as_bytes()
                .ok_or(JoseError::InvalidPublicKey)?;
            PublicKey::okp(curve, x)
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

pub(crate) fn public_key_to_der(public_key: &PublicKey) -> Result<Vec<u8>, Error> {
    let (curve, x) = match public_key {
        PublicKey::Okp { curve, x } => (*curve, x),
        other => bail!(JoseError::UnsupportedKeyType(other.key_type().to_string())),
    };
    match curve {
        KeyType::Ed25519 => Ok(ed25519_compact::PublicKey::from_slice(x)
            .map_err(|_| JoseError::InvalidPublicKey)?
            .to_der()),
        KeyType::X25519 => Ok(x25519::PublicKey::from_slice(x)
            .map_err(|_| JoseError::InvalidPublicKey)?
            .to_der()),
        _ => {
            let info = SubjectPublicKeyInfoRef {
                algorithm: keys::algorithm_identifier(curve)?,
                subject_public_key: BitStringRef::from_bytes(x)
                    .map_err(|_| JoseError::InvalidPublicKey)?,
            };
            Ok(info.to_der().map_err(|_| JoseError::InvalidPublicKey)?)
        }
    }
}

/// Parses a PKCS#8 `PrivateKeyInfo` already known to hold a key on `curve`.
pub(crate) fn private_key_from_der(curve: KeyType, pkcs8: &[u8]) -> Result<PrivateKey, Error> {
    match curve {
        KeyType::Ed25519 => {
            let kp = ed25519_compact::KeyPair::from_der(pkcs8)
                .map_err(|_| JoseError::InvalidKeyPair)?;
            PrivateKey::okp(curve, &kp.sk.seed()[..])
        }
        KeyType::X25519 => {
            let sk = x25519::SecretKey::from_der(pkcs8).map_err(|_| JoseError::InvalidKeyPair)?;
            PrivateKey::okp(curve, &sk[..])
        }
        KeyType::Ed448 | KeyType::X448 => {
            let info = PrivateKeyInfo::try_from(pkcs8).map_err(|_| JoseError::InvalidKeyPair)?;
            let d = OctetStringRef::from_der(info.private_key)
                .map_err(|_| JoseError::InvalidKeyPair)?;
            PrivateKey::okp(curve, d.as_bytes())
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

pub(crate) fn private_key_to_der(private_key: &PrivateKey) -> Result<Vec<u8>, Error> {
    let curve = private_key.key_type();
    match curve {
        KeyType::Ed25519 => Ok(ed25519_key_pair(seed_of(private_key, curve)?)?.sk.to_der()),
        KeyType::X25519 => Ok(x25519::SecretKey::from_slice(seed_of(private_key, curve)?)
            .map_err(|_| JoseError::InvalidKeyPair)?
            .to_der()),
        KeyType::Ed448 | KeyType::X448 => {
            let d = OctetStringRef::new(seed_of(private_key, curve)?)
                .and_then(|d| d.to_der())
                .map_err(|_| JoseError::InvalidKeyPair)?;
            let info = PrivateKeyInfo::new(keys::algorithm_identifier(curve)?, &d);
            Ok(info.to_der().map_err(|_| JoseError::InvalidKeyPair)?)
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

/// Signs with Ed25519. Signatures are deterministic.
pub(crate) fn sign(private_key: &PrivateKey, authenticated: &[u8]) -> Result<Vec<u8>, Error> {
    let kp = ed25519_key_pair(seed_of(private_key, KeyType::Ed25519)?)?;
    Ok(kp.sk.sign(authenticated, None).to_vec())
}

pub(crate) fn verify(
    public_key: &PublicKey,
    authenticated: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    let x = match public_key {
        PublicKey::Okp {
            curve: KeyType::Ed25519,
            x,
        } => x,
        other => bail!(JoseError::UnsupportedKeyType(other.key_type().to_string())),
    };
    let pk = ed25519_compact::PublicKey::from_slice(x).map_err(|_| JoseError::InvalidPublicKey)?;
    let signature =
        ed25519_compact::Signature::from_slice(signature).map_err(|_| JoseError::InvalidSignature)?;
    pk.verify(authenticated, &signature)
        .map_err(|_| JoseError::InvalidSignature)?;
    Ok(())
}

/// X25519 shared secret between a private key and a peer public key.
pub(crate) fn agree(private_key: &PrivateKey, public_key: &PublicKey) -> Result<Vec<u8>, Error> {
    ensure!(
        public_key.key_type() == private_key.key_type(),
        JoseError::illegal_argument("parameter spec mismatch")
    );
    let sk = x25519::SecretKey::from_slice(seed_of(private_key, KeyType::X25519)?)
        .map_err(|_| JoseError::InvalidKeyPair)?;
    let x = match public_key {
        PublicKey::Okp { x, .. } => x,
        _ => bail!(JoseError::InvalidPublicKey),
    };
    let pk = x25519::PublicKey::from_slice(x).map_err(|_| JoseError::InvalidPublicKey)?;
    let shared = pk.dh(&sk).map_err(|_| JoseError::WeakKey)?;
    Ok(shared.to_vec())
}

pub(crate) fn generate(curve: KeyType) -> Result<PrivateKey, Error> {
    match curve {
        KeyType::Ed25519 => {
            let kp = ed25519_compact::KeyPair::generate();
            PrivateKey::okp(curve, &kp.sk.seed()[..])
        }
        KeyType::X25519 => {
            let kp = x25519::KeyPair::generate();
            PrivateKey::okp(curve, &kp.sk[..])
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}
