//! NIST curves: ECDSA signatures and ECDH key agreement.
//!
//! P-256 and P-384 use the RustCrypto curve crates; P-521 goes through
//! BoringSSL.

use std::convert::TryFrom;

use boring::bn::{BigNum, BigNumContext};
use boring::derive::Deriver;
use boring::ec::{EcGroup, EcGroupRef, EcKey, EcPoint, EcPointRef};
use boring::ecdsa::EcdsaSig;
use boring::hash::{hash, MessageDigest};
use boring::nid::Nid;
use boring::pkey::{PKey, Private, Public};
use p256::ecdsa::signature::{DigestVerifier as _, RandomizedDigestSigner as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};

use crate::encoding::to_fixed_width;
use crate::error::*;
use crate::jwa::KeyType;
use crate::keys::{PrivateKey, PublicKey};

fn invalid_signature<E>(_: E) -> Error {
    JoseError::InvalidSignature.into()
}

fn invalid_public_key<E>(_: E) -> Error {
    JoseError::InvalidPublicKey.into()
}

fn invalid_key_pair<E>(_: E) -> Error {
    JoseError::InvalidKeyPair.into()
}

fn curve_of(private_key: &PrivateKey) -> Result<(KeyType, &[u8]), Error> {
    match private_key {
        PrivateKey::Ec { curve, d } => Ok((*curve, d.as_bytes())),
        other => bail!(JoseError::UnsupportedKeyType(other.key_type().to_string())),
    }
}

fn coordinates(curve: KeyType, point: &[u8]) -> Result<PublicKey, Error> {
    PublicKey::from_sec1(curve, point)
}

fn p521_group() -> Result<EcGroup, Error> {
    Ok(EcGroup::from_curve_name(Nid::SECP521R1)?)
}

fn p521_public_point(group: &EcGroup, d: &BigNum) -> Result<EcPoint, Error> {
    let ctx = BigNumContext::new()?;
    let mut point = EcPoint::new(group)?;
    point.mul_generator(group, d, &ctx)?;
    Ok(point)
}

fn p521_private(d: &[u8]) -> Result<EcKey<Private>, Error> {
    let group = p521_group()?;
    let d = BigNum::from_slice(d)?;
    let point = p521_public_point(&group, &d)?;
    let key = EcKey::from_private_components(&group, &d, &point)?;
    key.check_key()?;
    Ok(key)
}

fn p521_public(public_key: &PublicKey) -> Result<EcKey<Public>, Error> {
    match public_key {
        PublicKey::Ec { x, y, .. } => {
            let group = p521_group()?;
            let key = EcKey::from_public_key_affine_coordinates(
                &group,
                &BigNum::from_slice(x)?,
                &BigNum::from_slice(y)?,
            )
            .map_err(invalid_public_key)?;
            Ok(key)
        }
        _ => bail!(JoseError::InvalidPublicKey),
    }
}

fn p521_coordinates(group: &EcGroupRef, point: &EcPointRef) -> Result<PublicKey, Error> {
    let mut ctx = BigNumContext::new()?;
    let mut x = BigNum::new()?;
    let mut y = BigNum::new()?;
    point.affine_coordinates_gfp(group, &mut x, &mut y, &mut ctx)?;
    PublicKey::ec(
        KeyType::EcP521,
        &to_fixed_width(&x.to_vec(), 66)?,
        &to_fixed_width(&y.to_vec(), 66)?,
    )
}

fn is_p521(group: &EcGroupRef) -> bool {
    group.curve_name() == Some(Nid::SECP521R1)
}

/// Computes the public point for a private scalar.
pub(crate) fn public_key(curve: KeyType, d: &[u8]) -> Result<PublicKey, Error> {
    match curve {
        KeyType::EcP256 => {
            let sk = p256::SecretKey::from_slice(d).map_err(invalid_key_pair)?;
            coordinates(curve, sk.public_key().to_encoded_point(false).as_bytes())
        }
        KeyType::EcP384 => {
            let sk = p384::SecretKey::from_slice(d).map_err(invalid_key_pair)?;
            coordinates(curve, sk.public_key().to_encoded_point(false).as_bytes())
        }
        KeyType::EcP521 => {
            let group = p521_group()?;
            let point = p521_public_point(&group, &BigNum::from_slice(d)?)?;
            p521_coordinates(&group, &point)
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

/// Parses a `SubjectPublicKeyInfo` already known to hold a key on `curve`.
pub(crate) fn public_key_from_der(curve: KeyType, spki: &[u8]) -> Result<PublicKey, Error> {
    match curve {
        KeyType::EcP256 => {
            let pk = p256::PublicKey::from_public_key_der(spki).map_err(invalid_public_key)?;
            coordinates(curve, pk.to_encoded_point(false).as_bytes())
        }
        KeyType::EcP384 => {
            let pk = p384::PublicKey::from_public_key_der(spki).map_err(invalid_public_key)?;
            coordinates(curve, pk.to_encoded_point(false).as_bytes())
        }
        KeyType::EcP521 => {
            let key = PKey::public_key_from_der(spki)
                .and_then(|pkey| pkey.ec_key())
                .map_err(invalid_public_key)?;
            ensure!(is_p521(key.group()), JoseError::InvalidPublicKey);
            p521_coordinates(key.group(), key.public_key())
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

pub(crate) fn public_key_to_der(public_key: &PublicKey) -> Result<Vec<u8>, Error> {
    let point = public_key.sec1_uncompressed()?;
    match public_key.key_type() {
        KeyType::EcP256 => {
            let pk = p256::PublicKey::from_sec1_bytes(&point).map_err(invalid_public_key)?;
            Ok(pk.to_public_key_der().map_err(invalid_public_key)?.into_vec())
        }
        KeyType::EcP384 => {
            let pk = p384::PublicKey::from_sec1_bytes(&point).map_err(invalid_public_key)?;
            Ok(pk.to_public_key_der().map_err(invalid_public_key)?.into_vec())
        }
        KeyType::EcP521 => Ok(PKey::from_ec_key(p521_public(public_key)?)?.public_key_to_der()?),
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

/// Parses a PKCS#8 `PrivateKeyInfo` already known to hold a key on `curve`.
pub(crate) fn private_key_from_der(curve: KeyType, pkcs8: &[u8]) -> Result<PrivateKey, Error> {
    match curve {
        KeyType::EcP256 => {
            let sk = p256::SecretKey::from_pkcs8_der(pkcs8).map_err(invalid_key_pair)?;
            PrivateKey::ec(curve, &sk.to_bytes())
        }
        KeyType::EcP384 => {
            let sk = p384::SecretKey::from_pkcs8_der(pkcs8).map_err(invalid_key_pair)?;
            PrivateKey::ec(curve, &sk.to_bytes())
        }
        KeyType::EcP521 => {
            let key = PKey::private_key_from_pkcs8(pkcs8)
                .and_then(|pkey| pkey.ec_key())
                .map_err(invalid_key_pair)?;
            ensure!(is_p521(key.group()), JoseError::InvalidKeyPair);
            PrivateKey::ec(curve, &to_fixed_width(&key.private_key().to_vec(), 66)?)
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

/// PKCS#8 encoding, including the public point.
pub(crate) fn private_key_to_der(private_key: &PrivateKey) -> Result<Vec<u8>, Error> {
    let (curve, d) = curve_of(private_key)?;
    match curve {
        KeyType::EcP256 => {
            let sk = p256::SecretKey::from_slice(d).map_err(invalid_key_pair)?;
            Ok(sk.to_pkcs8_der().map_err(invalid_key_pair)?.as_bytes().to_vec())
        }
        KeyType::EcP384 => {
            let sk = p384::SecretKey::from_slice(d).map_err(invalid_key_pair)?;
            Ok(sk.to_pkcs8_der().map_err(invalid_key_pair)?.as_bytes().to_vec())
        }
        KeyType::EcP521 => Ok(PKey::from_ec_key(p521_private(d)?)?.private_key_to_der_pkcs8()?),
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

/// Produces a JWS ECDSA signature: `R || S`, each left-padded to the curve size.
pub(crate) fn sign(private_key: &PrivateKey, authenticated: &[u8]) -> Result<Vec<u8>, Error> {
    let (curve, d) = curve_of(private_key)?;
    let mut rng = rand::thread_rng();
    match curve {
        KeyType::EcP256 => {
            let sk = p256::ecdsa::SigningKey::from_slice(d).map_err(invalid_key_pair)?;
            let mut digest = hmac_sha256::Hash::new();
            digest.update(authenticated);
            let signature: p256::ecdsa::Signature = sk.sign_digest_with_rng(&mut rng, digest);
            Ok(signature.to_vec())
        }
        KeyType::EcP384 => {
            let sk = p384::ecdsa::SigningKey::from_slice(d).map_err(invalid_key_pair)?;
            let mut digest = hmac_sha512::sha384::Hash::new();
            digest.update(authenticated);
            let signature: p384::ecdsa::Signature = sk.sign_digest_with_rng(&mut rng, digest);
            Ok(signature.to_vec())
        }
        KeyType::EcP521 => {
            let key = p521_private(d)?;
            let digest = hash(MessageDigest::sha512(), authenticated)?;
            let signature = EcdsaSig::sign(&digest, &key)?;
            let mut raw = to_fixed_width(&signature.r().to_vec(), 66)?;
            raw.extend(to_fixed_width(&signature.s().to_vec(), 66)?);
            Ok(raw)
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

pub(crate) fn verify(
    public_key: &PublicKey,
    authenticated: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    let curve = public_key.key_type();
    match curve {
        KeyType::EcP256 => {
            let pk = p256::ecdsa::VerifyingKey::from_sec1_bytes(&public_key.sec1_uncompressed()?)
                .map_err(invalid_public_key)?;
            let signature =
                p256::ecdsa::Signature::try_from(signature).map_err(invalid_signature)?;
            let mut digest = hmac_sha256::Hash::new();
            digest.update(authenticated);
            pk.verify_digest(digest, &signature)
                .map_err(invalid_signature)
        }
        KeyType::EcP384 => {
            let pk = p384::ecdsa::VerifyingKey::from_sec1_bytes(&public_key.sec1_uncompressed()?)
                .map_err(invalid_public_key)?;
            let signature =
                p384::ecdsa::Signature::try_from(signature).map_err(invalid_signature)?;
            let mut digest = hmac_sha512::sha384::Hash::new();
            digest.update(authenticated);
            pk.verify_digest(digest, &signature)
                .map_err(invalid_signature)
        }
        KeyType::EcP521 => {
            ensure!(signature.len() == 132, JoseError::InvalidSignature);
            let key = p521_public(public_key)?;
            let signature = EcdsaSig::from_private_components(
                BigNum::from_slice(&signature[..66])?,
                BigNum::from_slice(&signature[66..])?,
            )?;
            let digest = hash(MessageDigest::sha512(), authenticated)?;
            ensure!(
                signature.verify(&digest, &key).unwrap_or(false),
                JoseError::InvalidSignature
            );
            Ok(())
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

/// ECDH shared secret `Z` between a private key and a peer public key on the same curve.
pub(crate) fn agree(private_key: &PrivateKey, public_key: &PublicKey) -> Result<Vec<u8>, Error> {
    let (curve, d) = curve_of(private_key)?;
    ensure!(
        public_key.key_type() == curve,
        JoseError::illegal_argument("parameter spec mismatch")
    );
    let point = public_key.sec1_uncompressed()?;
    match curve {
        KeyType::EcP256 => {
            let sk = p256::SecretKey::from_slice(d).map_err(invalid_key_pair)?;
            let pk = p256::PublicKey::from_sec1_bytes(&point).map_err(invalid_public_key)?;
            let shared = p256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
            Ok(shared.raw_secret_bytes().to_vec())
        }
        KeyType::EcP384 => {
            let sk = p384::SecretKey::from_slice(d).map_err(invalid_key_pair)?;
            let pk = p384::PublicKey::from_sec1_bytes(&point).map_err(invalid_public_key)?;
            let shared = p384::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
            Ok(shared.raw_secret_bytes().to_vec())
        }
        KeyType::EcP521 => {
            let sk = PKey::from_ec_key(p521_private(d)?)?;
            let pk = PKey::from_ec_key(p521_public(public_key)?)?;
            let mut deriver = Deriver::new(&sk)?;
            deriver.set_peer(&pk)?;
            Ok(to_fixed_width(&deriver.derive_to_vec()?, 66)?)
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

pub(crate) fn generate(curve: KeyType) -> Result<PrivateKey, Error> {
    let mut rng = rand::thread_rng();
    match curve {
        KeyType::EcP256 => PrivateKey::ec(curve, &p256::SecretKey::random(&mut rng).to_bytes()),
        KeyType::EcP384 => PrivateKey::ec(curve, &p384::SecretKey::random(&mut rng).to_bytes()),
        KeyType::EcP521 => {
            let key = EcKey::generate(&p521_group()?)?;
            PrivateKey::ec(curve, &to_fixed_width(&key.private_key().to_vec(), 66)?)
        }
        other => bail!(JoseError::UnsupportedKeyType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_per_curve() {
        for (curve, len) in [
            (KeyType::EcP256, 64),
            (KeyType::EcP384, 96),
            (KeyType::EcP521, 132),
        ] {
            let private_key = generate(curve).unwrap();
            let public_key = private_key.public_key().unwrap().unwrap();
            let signature = sign(&private_key, b"payload").unwrap();
            assert_eq!(signature.len(), len);
            verify(&public_key, b"payload", &signature).unwrap();
            assert!(verify(&public_key, b"payloae", &signature).is_err());
        }
    }

    #[test]
    fn agreement_is_symmetric() {
        for curve in [KeyType::EcP256, KeyType::EcP384, KeyType::EcP521] {
            let a = generate(curve).unwrap();
            let b = generate(curve).unwrap();
            let a_pub = a.public_key().unwrap().unwrap();
            let b_pub = b.public_key().unwrap().unwrap();
            assert_eq!(agree(&a, &b_pub).unwrap(), agree(&b, &a_pub).unwrap());
        }
    }

    #[test]
    fn agreement_rejects_curve_mismatch() {
        let a = generate(KeyType::EcP256).unwrap();
        let b = generate(KeyType::EcP384).unwrap();
        let err = agree(&a, &b.public_key().unwrap().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "parameter spec mismatch");
    }
}
