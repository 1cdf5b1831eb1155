//! Key encryption with AES-GCM (`A128GCMKW`, `A192GCMKW`, `A256GCMKW`).
//!
//! The 96-bit IV and 128-bit tag travel in the `iv` and `tag` header
//! parameters.

use boring::symm::{Cipher, Crypter, Mode};

use crate::ephemeral;
use crate::error::*;

const IV_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

fn cipher(kek: &[u8]) -> Result<Cipher, Error> {
    Ok(match kek.len() {
        16 => Cipher::aes_128_gcm(),
        24 => Cipher::aes_192_gcm(),
        32 => Cipher::aes_256_gcm(),
        _ => bail!(JoseError::InvalidEncryptionKey),
    })
}

/// Wrapped key with the IV and tag that must be published alongside it.
pub(crate) struct GcmWrapped {
    pub encrypted_key: Vec<u8>,
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
}

pub(crate) fn wrap_key(kek: &[u8], cek: &[u8]) -> Result<GcmWrapped, Error> {
    wrap_key_with_iv(kek, cek, ephemeral::random_bytes(IV_SIZE))
}

fn wrap_key_with_iv(kek: &[u8], cek: &[u8], iv: Vec<u8>) -> Result<GcmWrapped, Error> {
    let cipher = cipher(kek)?;
    let mut crypter = Crypter::new(cipher, Mode::Encrypt, kek, Some(&iv))?;
    let mut encrypted_key = vec![0u8; cek.len() + cipher.block_size()];
    let mut count = crypter.update(cek, &mut encrypted_key)?;
    count += crypter.finalize(&mut encrypted_key[count..])?;
    encrypted_key.truncate(count);
    let mut tag = vec![0u8; TAG_SIZE];
    crypter.get_tag(&mut tag)?;
    Ok(GcmWrapped {
        encrypted_key,
        iv,
        tag,
    })
}

pub(crate) fn unwrap_key(
    kek: &[u8],
    encrypted_key: &[u8],
    iv: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, Error> {
    let cipher = cipher(kek)?;
    ensure!(iv.len() == IV_SIZE, JoseError::InvalidIV);
    ensure!(tag.len() == TAG_SIZE, JoseError::InvalidAuthTagLength);
    let mut crypter = Crypter::new(cipher, Mode::Decrypt, kek, Some(iv))?;
    crypter.set_tag(tag)?;
    let mut cek = vec![0u8; encrypted_key.len() + cipher.block_size()];
    let mut count = crypter.update(encrypted_key, &mut cek)?;
    count += crypter
        .finalize(&mut cek[count..])
        .map_err(|_| JoseError::KeyUnwrapFailed)?;
    cek.truncate(count);
    Ok(cek)
}
