//! RSA key encryption: `RSA1_5`, `RSA-OAEP` and `RSA-OAEP-256`.
//!
//! boring does not expose the OAEP hash function, so `RSA-OAEP-256` applies
//! EME-OAEP with SHA-256 (RFC 8017 §7.1) itself and uses raw RSA.

use boring::rsa::Padding;
use hmac_sha256::Hash as SHA256;

use crate::algorithms::rsa::check_modulus;
use crate::common::timingsafe_eq;
use crate::ephemeral;
use crate::error::*;
use crate::jwa::Algorithm;
use crate::keys::{PrivateKey, PublicKey};

const HASH_LEN: usize = 32;

fn mgf1(seed: &[u8], len: usize) -> Vec<u8> {
    let mut mask = Vec::with_capacity(len + HASH_LEN);
    let mut counter: u32 = 0;
    while mask.len() < len {
        let mut hasher = SHA256::new();
        hasher.update(seed);
        hasher.update(counter.to_be_bytes());
        mask.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    mask.truncate(len);
    mask
}

fn xor_in_place(target: &mut [u8], mask: &[u8]) {
    target.iter_mut().zip(mask).for_each(|(t, m)| *t ^= m);
}

fn oaep_sha256_encode(message: &[u8], k: usize) -> Result<Vec<u8>, Error> {
    ensure!(
        k >= 2 * HASH_LEN + 2 && message.len() <= k - 2 * HASH_LEN - 2,
        JoseError::InvalidEncryptionKey
    );
    let mut db = Vec::with_capacity(k - HASH_LEN - 1);
    db.extend_from_slice(&SHA256::hash(&[]));
    db.resize(k - HASH_LEN - 1 - message.len() - 1, 0);
    db.push(0x01);
    db.extend_from_slice(message);

    let mut seed = ephemeral::random_bytes(HASH_LEN);
    xor_in_place(&mut db, &mgf1(&seed, db.len()));
    xor_in_place(&mut seed, &mgf1(&db, HASH_LEN));

    let mut em = Vec::with_capacity(k);
    em.push(0x00);
    em.extend_from_slice(&seed);
    em.extend_from_slice(&db);
    Ok(em)
}

fn oaep_sha256_decode(em: &[u8], k: usize) -> Result<Vec<u8>, Error> {
    ensure!(
        em.len() == k && k >= 2 * HASH_LEN + 2,
        JoseError::KeyUnwrapFailed
    );
    let (y, rest) = (em[0], &em[1..]);
    let (masked_seed, masked_db) = rest.split_at(HASH_LEN);
    let mut seed = masked_seed.to_vec();
    xor_in_place(&mut seed, &mgf1(masked_db, HASH_LEN));
    let mut db = masked_db.to_vec();
    xor_in_place(&mut db, &mgf1(&seed, db.len()));

    let label_ok = timingsafe_eq(&db[..HASH_LEN], &SHA256::hash(&[]));
    let separator = db[HASH_LEN..].iter().position(|&b| b != 0);
    match separator {
        Some(i) if label_ok && y == 0 && db[HASH_LEN + i] == 0x01 => {
            Ok(db[HASH_LEN + i + 1..].to_vec())
        }
        _ => bail!(JoseError::KeyUnwrapFailed),
    }
}

pub(crate) fn encrypt_key(
    alg: Algorithm,
    public_key: &PublicKey,
    cek: &[u8],
) -> Result<Vec<u8>, Error> {
    let rsa = public_key.to_rsa()?;
    check_modulus(&rsa.n().to_vec())?;
    let k = rsa.size() as usize;
    let mut encrypted = vec![0u8; k];
    let len = match alg {
        Algorithm::RSA1_5 => rsa.public_encrypt(cek, &mut encrypted, Padding::PKCS1),
        Algorithm::RSA_OAEP => rsa.public_encrypt(cek, &mut encrypted, Padding::PKCS1_OAEP),
        Algorithm::RSA_OAEP_256 => {
            let em = oaep_sha256_encode(cek, k)?;
            rsa.public_encrypt(&em, &mut encrypted, Padding::NONE)
        }
        other => bail!(JoseError::UnsupportedAlgorithm(other.to_string())),
    }
    .map_err(|_| JoseError::InvalidEncryptionKey)?;
    encrypted.truncate(len);
    Ok(encrypted)
}

pub(crate) fn decrypt_key(
    alg: Algorithm,
    private_key: &PrivateKey,
    encrypted_key: &[u8],
) -> Result<Vec<u8>, Error> {
    let rsa = private_key.to_rsa()?;
    let k = rsa.size() as usize;
    ensure!(encrypted_key.len() == k, JoseError::KeyUnwrapFailed);
    let mut decrypted = vec![0u8; k];
    let padding = match alg {
        Algorithm::RSA1_5 => Padding::PKCS1,
        Algorithm::RSA_OAEP => Padding::PKCS1_OAEP,
        Algorithm::RSA_OAEP_256 => Padding::NONE,
        other => bail!(JoseError::UnsupportedAlgorithm(other.to_string())),
    };
    let len = rsa
        .private_decrypt(encrypted_key, &mut decrypted, padding)
        .map_err(|_| JoseError::KeyUnwrapFailed)?;
    decrypted.truncate(len);
    if alg == Algorithm::RSA_OAEP_256 {
        let mut em = vec![0u8; k - decrypted.len()];
        em.extend_from_slice(&decrypted);
        return oaep_sha256_decode(&em, k);
    }
    Ok(decrypted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::rsa;

    #[test]
    fn every_padding_round_trips() {
        let private_key = rsa::generate(rsa::DEFAULT_MODULUS_BITS).unwrap();
        let public_key = private_key.public_key().unwrap().unwrap();
        for alg in [Algorithm::RSA1_5, Algorithm::RSA_OAEP, Algorithm::RSA_OAEP_256] {
            let encrypted = encrypt_key(alg, &public_key, &[42u8; 32]).unwrap();
            assert_eq!(encrypted.len(), 256);
            assert_eq!(decrypt_key(alg, &private_key, &encrypted).unwrap(), [42u8; 32]);
        }
    }

    #[test]
    fn oaep_sha256_rejects_sha1_ciphertext() {
        let private_key = rsa::generate(rsa::DEFAULT_MODULUS_BITS).unwrap();
        let public_key = private_key.public_key().unwrap().unwrap();
        let encrypted = encrypt_key(Algorithm::RSA_OAEP, &public_key, &[42u8; 32]).unwrap();
        assert!(decrypt_key(Algorithm::RSA_OAEP_256, &private_key, &encrypted).is_err());
    }

    #[test]
    fn oaep_encoding_is_invertible() {
        let em = oaep_sha256_encode(b"secret", 256).unwrap();
        assert_eq!(em.len(), 256);
        assert_eq!(oaep_sha256_decode(&em, 256).unwrap(), b"secret");
        assert!(oaep_sha256_encode(&[0u8; 200], 256).is_err());
    }
}
