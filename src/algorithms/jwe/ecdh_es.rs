//! ECDH-ES key agreement (RFC 7518 §4.6) over NIST curves and X25519.

use crate::algorithms::{ec, okp};
use crate::common::SecretBytes;
use crate::ephemeral;
use crate::error::*;
use crate::keys::{PrivateKey, PublicKey};

/// Derive a key using Concat KDF as specified in NIST SP 800-56A.
pub(crate) fn concat_kdf(
    shared_secret: &[u8],
    key_len: usize,
    alg: &str,
    apu: &[u8],
    apv: &[u8],
) -> SecretBytes {
    use hmac_sha256::Hash as SHA256;

    // AlgorithmID || PartyUInfo || PartyVInfo || SuppPubInfo
    let alg_bytes = alg.as_bytes();
    let alg_len = (alg_bytes.len() as u32).to_be_bytes();
    let apu_len = (apu.len() as u32).to_be_bytes();
    let apv_len = (apv.len() as u32).to_be_bytes();
    let key_bits = ((key_len * 8) as u32).to_be_bytes();

    let mut derived_key = Vec::with_capacity(key_len + 32);
    let mut counter: u32 = 1;

    while derived_key.len() < key_len {
        let mut hasher = SHA256::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(shared_secret);
        hasher.update(alg_len);
        hasher.update(alg_bytes);
        hasher.update(apu_len);
        hasher.update(apu);
        hasher.update(apv_len);
        hasher.update(apv);
        hasher.update(key_bits);
        derived_key.extend_from_slice(&hasher.finalize());
        counter += 1;
    }

    derived_key.truncate(key_len);
    SecretBytes::new(derived_key)
}

/// Raw shared secret `Z`.
pub(crate) fn agree(private_key: &PrivateKey, public_key: &PublicKey) -> Result<SecretBytes, Error> {
    let key_type = private_key.key_type();
    let z = if key_type.is_ec() {
        ec::agree(private_key, public_key)?
    } else if key_type.is_okp() {
        okp::agree(private_key, public_key)?
    } else {
        bail!(JoseError::UnsupportedKeyType(key_type.to_string()))
    };
    Ok(SecretBytes::new(z))
}

/// Parameters binding the derived key to the algorithm and the parties.
pub(crate) struct KdfInput<'a> {
    pub algorithm_id: &'a str,
    pub key_len: usize,
    pub apu: &'a [u8],
    pub apv: &'a [u8],
}

/// Sender side: generates an ephemeral key on the recipient's curve and
/// returns it with the derived key.
pub(crate) fn sender_key(
    recipient: &PublicKey,
    input: &KdfInput<'_>,
) -> Result<(PublicKey, SecretBytes), Error> {
    let (ephemeral_private, ephemeral_public) = ephemeral::key_pair(recipient.key_type())?;
    let ephemeral_public = ephemeral_public
        .ok_or_else(|| JoseError::UnsupportedKeyType(recipient.key_type().to_string()))?;
    let z = agree(&ephemeral_private, recipient)?;
    let key = concat_kdf(z.as_bytes(), input.key_len, input.algorithm_id, input.apu, input.apv);
    Ok((ephemeral_public, key))
}

/// Recipient side: derives the key from the sender's ephemeral public key.
pub(crate) fn recipient_key(
    private_key: &PrivateKey,
    epk: &PublicKey,
    input: &KdfInput<'_>,
) -> Result<SecretBytes, Error> {
    let z = agree(private_key, epk)?;
    Ok(concat_kdf(
        z.as_bytes(),
        input.key_len,
        input.algorithm_id,
        input.apu,
        input.apv,
    ))
}
