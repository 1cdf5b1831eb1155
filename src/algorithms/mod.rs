//! Cryptographic operations, dispatched by algorithm family.

pub(crate) mod ec;
pub(crate) mod hmac;
pub mod jwe;
pub(crate) mod okp;
pub(crate) mod rsa;

use crate::error::*;
use crate::jwa::{Algorithm, AlgorithmFamily};
use crate::jwk::Jwk;

fn require_signature(alg: Algorithm) -> Result<(), Error> {
    ensure!(
        alg.is_signature(),
        JoseError::illegal_argument("Not a signature algorithm")
    );
    Ok(())
}

pub(crate) fn check_key_type(alg: Algorithm, key: &Jwk) -> Result<(), Error> {
    ensure!(
        alg.key_types().contains(&key.key_type()),
        JoseError::illegal_argument(format!(
            "Illegal type {} for algorithm {}",
            key.key_type(),
            alg
        ))
    );
    Ok(())
}

/// Signs `authenticated` with the private or secret material of `key`.
pub(crate) fn sign(alg: Algorithm, key: &Jwk, authenticated: &[u8]) -> Result<Vec<u8>, Error> {
    require_signature(alg)?;
    check_key_type(alg, key)?;
    if alg.family() == AlgorithmFamily::Hmac {
        let secret = key
            .secret()
            .ok_or_else(|| JoseError::illegal_state("Secret key required for signing"))?;
        return hmac::authentication_tag(alg, secret, authenticated);
    }
    let private_key = key
        .private_key()
        .ok_or_else(|| JoseError::illegal_state("Private key required for signing"))?;
    match alg.family() {
        AlgorithmFamily::RsaPkcs1 | AlgorithmFamily::RsaPss => {
            rsa::sign(alg, private_key, authenticated)
        }
        AlgorithmFamily::Ecdsa => ec::sign(private_key, authenticated),
        AlgorithmFamily::EdDsa => okp::sign(private_key, authenticated),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    }
}

/// Verifies a signature with the public or secret material of `key`.
pub(crate) fn verify(
    alg: Algorithm,
    key: &Jwk,
    authenticated: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    require_signature(alg)?;
    check_key_type(alg, key)?;
    if alg.family() == AlgorithmFamily::Hmac {
        let secret = key
            .secret()
            .ok_or_else(|| JoseError::illegal_state("Secret key required for verification"))?;
        return hmac::verify(alg, secret, authenticated, signature);
    }
    let public_key = key
        .public_key()
        .ok_or_else(|| JoseError::illegal_state("Public key required for verification"))?;
    match alg.family() {
        AlgorithmFamily::RsaPkcs1 | AlgorithmFamily::RsaPss => {
            rsa::verify(alg, public_key, authenticated, signature)
        }
        AlgorithmFamily::Ecdsa => ec::verify(public_key, authenticated, signature),
        AlgorithmFamily::EdDsa => okp::verify(public_key, authenticated, signature),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    }
}
