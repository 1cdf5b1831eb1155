use boring::bn::{BigNum, BigNumContext, BigNumRef};
use boring::hash::MessageDigest;
use boring::pkey::PKey;
use boring::rsa::{Padding, Rsa};
use boring::sign::{RsaPssSaltlen, Signer, Verifier};

use crate::error::*;
use crate::jwa::{Algorithm, AlgorithmFamily};
use crate::common::SecretBytes;
use crate::keys::{PrivateKey, PublicKey, RsaCrt};

pub(crate) const MIN_MODULUS_BITS: usize = 2048;
pub(crate) const DEFAULT_MODULUS_BITS: u32 = 2048;

fn digest(alg: Algorithm) -> Result<MessageDigest, Error> {
    Ok(match alg.size() {
        256 => MessageDigest::sha256(),
        384 => MessageDigest::sha384(),
        512 => MessageDigest::sha512(),
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    })
}

fn padding(alg: Algorithm) -> Result<Padding, Error> {
    Ok(match alg.family() {
        AlgorithmFamily::RsaPkcs1 => Padding::PKCS1,
        AlgorithmFamily::RsaPss => Padding::PKCS1_PSS,
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    })
}

pub(crate) fn check_modulus(modulus: &[u8]) -> Result<(), Error> {
    ensure!(modulus.len() * 8 >= MIN_MODULUS_BITS, JoseError::WeakKey);
    Ok(())
}

pub(crate) fn sign(
    alg: Algorithm,
    private_key: &PrivateKey,
    authenticated: &[u8],
) -> Result<Vec<u8>, Error> {
    let rsa = private_key.to_rsa()?;
    check_modulus(&rsa.n().to_vec())?;
    let pkey = PKey::from_rsa(rsa)?;
    let mut signer = Signer::new(digest(alg)?, &pkey)?;
    signer.set_rsa_padding(padding(alg)?)?;
    if alg.family() == AlgorithmFamily::RsaPss {
        signer.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
    }
    signer.update(authenticated)?;
    Ok(signer.sign_to_vec()?)
}

pub(crate) fn verify(
    alg: Algorithm,
    public_key: &PublicKey,
    authenticated: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    let pkey = PKey::from_rsa(public_key.to_rsa()?)?;
    let mut verifier = Verifier::new(digest(alg)?, &pkey)?;
    verifier.set_rsa_padding(padding(alg)?)?;
    if alg.family() == AlgorithmFamily::RsaPss {
        verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
    }
    verifier.update(authenticated)?;
    ensure!(
        verifier.verify(signature).unwrap_or(false),
        JoseError::InvalidSignature
    );
    Ok(())
}

pub(crate) fn generate(modulus_bits: u32) -> Result<PrivateKey, Error> {
    ensure!(
        modulus_bits as usize >= MIN_MODULUS_BITS,
        JoseError::WeakKey
    );
    let rsa = Rsa::generate(modulus_bits)?;
    PrivateKey::from_rsa(&rsa)
}

pub(crate) fn public_key_from_der(spki: &[u8]) -> Result<PublicKey, Error> {
    let rsa = PKey::public_key_from_der(spki)
        .and_then(|pkey| pkey.rsa())
        .map_err(|_| JoseError::InvalidPublicKey)?;
    PublicKey::rsa(&rsa.n().to_vec(), &rsa.e().to_vec())
}

pub(crate) fn private_key_from_der(pkcs8: &[u8]) -> Result<PrivateKey, Error> {
    let rsa = PKey::private_key_from_pkcs8(pkcs8)
        .and_then(|pkey| pkey.rsa())
        .map_err(|_| JoseError::InvalidKeyPair)?;
    PrivateKey::from_rsa(&rsa)
}

/// Recovers the prime factors and CRT exponents of `n` from the private
/// exponent (RFC 8017 and NIST SP 800-56B, appendix C).
pub(crate) fn recover_crt(n: &[u8], e: &[u8], d: &[u8]) -> Result<RsaCrt, Error> {
    let mut ctx = BigNumContext::new()?;
    let (n, e, d) = (
        BigNum::from_slice(n)?,
        BigNum::from_slice(e)?,
        BigNum::from_slice(d)?,
    );
    let one = BigNum::from_u32(1)?;
    let two = BigNum::from_u32(2)?;
    let mut n_minus_one = BigNum::new()?;
    n_minus_one.checked_sub(&n, &one)?;

    // d * e - 1 = 2^t * r with r odd
    let mut de = BigNum::new()?;
    de.checked_mul(&d, &e, &mut ctx)?;
    let mut k = BigNum::new()?;
    k.checked_sub(&de, &one)?;
    ensure!(k.num_bits() > 1, JoseError::InvalidKeyPair);
    let mut t = 0;
    while !k.is_bit_set(t) {
        t += 1;
    }
    let mut r = BigNum::new()?;
    r.rshift(&k, t)?;

    for base in 2..100u32 {
        let base = BigNum::from_u32(base)?;
        let mut y = BigNum::new()?;
        y.mod_exp(&base, &r, &n, &mut ctx)?;
        if y == one || y == n_minus_one {
            continue;
        }
        for _ in 0..t {
            let mut x = BigNum::new()?;
            x.mod_exp(&y, &two, &n, &mut ctx)?;
            if x == one {
                let mut y_minus_one = BigNum::new()?;
                y_minus_one.checked_sub(&y, &one)?;
                let mut p = BigNum::new()?;
                p.gcd(&y_minus_one, &n, &mut ctx)?;
                let mut q = BigNum::new()?;
                q.checked_div(&n, &p, &mut ctx)?;
                return crt_parameters(&p, &q, &d, &mut ctx);
            }
            if x == n_minus_one {
                break;
            }
            y = x;
        }
    }
    bail!(JoseError::InvalidKeyPair)
}

fn crt_parameters(
    p: &BigNumRef,
    q: &BigNumRef,
    d: &BigNumRef,
    ctx: &mut BigNumContext,
) -> Result<RsaCrt, Error> {
    let one = BigNum::from_u32(1)?;
    let two = BigNum::from_u32(2)?;
    let exponent = |prime: &BigNumRef, ctx: &mut BigNumContext| -> Result<BigNum, Error> {
        let mut order = BigNum::new()?;
        order.checked_sub(prime, &one)?;
        let mut reduced = BigNum::new()?;
        reduced.nnmod(d, &order, ctx)?;
        Ok(reduced)
    };
    let dp = exponent(p, ctx)?;
    let dq = exponent(q, ctx)?;
    // p is prime, so q^(p-2) is the inverse of q modulo p
    let mut p_minus_two = BigNum::new()?;
    p_minus_two.checked_sub(p, &two)?;
    let mut qi = BigNum::new()?;
    qi.mod_exp(q, &p_minus_two, p, ctx)?;
    Ok(RsaCrt {
        p: SecretBytes::new(p.to_vec()),
        q: SecretBytes::new(q.to_vec()),
        dp: SecretBytes::new(dp.to_vec()),
        dq: SecretBytes::new(dq.to_vec()),
        qi: SecretBytes::new(qi.to_vec()),
    })
}
