//! AES Key Wrap (RFC 3394), used by `A*KW`, `ECDH-ES+A*KW` and `PBES2-*`.

use boring::aes::{unwrap_key as aes_unwrap, wrap_key as aes_wrap, AesKey};

use crate::error::*;

fn check_kek(kek: &[u8]) -> Result<(), Error> {
    ensure!(
        matches!(kek.len(), 16 | 24 | 32),
        JoseError::InvalidEncryptionKey
    );
    Ok(())
}

pub(crate) fn wrap_key(kek: &[u8], cek: &[u8]) -> Result<Vec<u8>, Error> {
    check_kek(kek)?;
    ensure!(
        cek.len() >= 16 && cek.len() % 8 == 0,
        JoseError::InvalidEncryptionKey
    );
    let aes_key = AesKey::new_encrypt(kek).map_err(|_| JoseError::InvalidEncryptionKey)?;

    // Output is 8 bytes larger than input (for IV)
    let mut wrapped = vec![0u8; cek.len() + 8];
    aes_wrap(&aes_key, None, &mut wrapped, cek).map_err(|_| JoseError::InvalidEncryptionKey)?;
    Ok(wrapped)
}

pub(crate) fn unwrap_key(kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>, Error> {
    check_kek(kek)?;
    ensure!(
        wrapped.len() >= 24 && wrapped.len() % 8 == 0,
        JoseError::KeyUnwrapFailed
    );
    let aes_key = AesKey::new_decrypt(kek).map_err(|_| JoseError::InvalidEncryptionKey)?;

    // Output is 8 bytes smaller than input
    let mut cek = vec![0u8; wrapped.len() - 8];
    aes_unwrap(&aes_key, None, &mut cek, wrapped).map_err(|_| JoseError::KeyUnwrapFailed)?;
    Ok(cek)
}
