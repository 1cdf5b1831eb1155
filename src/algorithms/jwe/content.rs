//! Content encryption algorithms for JWE (RFC 7518 §5).

use std::fmt;

use boring::symm::{self, Cipher, Crypter, Mode};
use hmac_sha512::sha384 as hmac_sha384;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::common::timingsafe_eq;
use crate::encoding::aad_length;
use crate::ephemeral;
use crate::error::*;

/// Content encryption algorithm identifier (`enc`).
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentEncryption {
    A128CBC_HS256,
    A192CBC_HS384,
    A256CBC_HS512,
    A128GCM,
    A192GCM,
    #[default]
    A256GCM,
}

impl ContentEncryption {
    pub const ALL: &'static [ContentEncryption] = &[
        ContentEncryption::A128CBC_HS256,
        ContentEncryption::A192CBC_HS384,
        ContentEncryption::A256CBC_HS512,
        ContentEncryption::A128GCM,
        ContentEncryption::A192GCM,
        ContentEncryption::A256GCM,
    ];

    /// The JWE `enc` header value.
    pub fn name(&self) -> &'static str {
        match self {
            ContentEncryption::A128CBC_HS256 => "A128CBC-HS256",
            ContentEncryption::A192CBC_HS384 => "A192CBC-HS384",
            ContentEncryption::A256CBC_HS512 => "A256CBC-HS512",
            ContentEncryption::A128GCM => "A128GCM",
            ContentEncryption::A192GCM => "A192GCM",
            ContentEncryption::A256GCM => "A256GCM",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, Error> {
        ContentEncryption::ALL
            .iter()
            .copied()
            .find(|enc| enc.name() == name)
            .ok_or_else(|| JoseError::UnsupportedContentEncryption(name.to_string()).into())
    }

    fn is_cbc(&self) -> bool {
        matches!(
            self,
            ContentEncryption::A128CBC_HS256
                | ContentEncryption::A192CBC_HS384
                | ContentEncryption::A256CBC_HS512
        )
    }

    /// Content encryption key size in bytes.
    ///
    /// CBC-HMAC keys hold the MAC key followed by the encryption key.
    pub fn key_size(&self) -> usize {
        match self {
            ContentEncryption::A128CBC_HS256 => 32,
            ContentEncryption::A192CBC_HS384 => 48,
            ContentEncryption::A256CBC_HS512 => 64,
            ContentEncryption::A128GCM => 16,
            ContentEncryption::A192GCM => 24,
            ContentEncryption::A256GCM => 32,
        }
    }

    pub fn iv_size(&self) -> usize {
        if self.is_cbc() {
            16
        } else {
            12
        }
    }

    pub fn tag_size(&self) -> usize {
        if self.is_cbc() {
            self.key_size() / 2
        } else {
            16
        }
    }

    pub fn generate_cek(&self) -> Vec<u8> {
        ephemeral::random_bytes(self.key_size())
    }

    pub fn generate_iv(&self) -> Vec<u8> {
        ephemeral::random_bytes(self.iv_size())
    }

    fn cipher(&self) -> Cipher {
        match self {
            ContentEncryption::A128CBC_HS256 => Cipher::aes_128_cbc(),
            ContentEncryption::A192CBC_HS384 => Cipher::aes_192_cbc(),
            ContentEncryption::A256CBC_HS512 => Cipher::aes_256_cbc(),
            ContentEncryption::A128GCM => Cipher::aes_128_gcm(),
            ContentEncryption::A192GCM => Cipher::aes_192_gcm(),
            ContentEncryption::A256GCM => Cipher::aes_256_gcm(),
        }
    }

    /// Truncated HMAC over `AAD || IV || ciphertext || AL` (RFC 7518 §5.2.2.1).
    fn cbc_tag(&self, mac_key: &[u8], iv: &[u8], aad: &[u8], ciphertext: &[u8]) -> Vec<u8> {
        let mut input = Vec::with_capacity(aad.len() + iv.len() + ciphertext.len() + 8);
        input.extend_from_slice(aad);
        input.extend_from_slice(iv);
        input.extend_from_slice(ciphertext);
        input.extend_from_slice(&aad_length(aad));
        let mut tag = match self {
            ContentEncryption::A128CBC_HS256 => hmac_sha256::HMAC::mac(&input, mac_key).to_vec(),
            ContentEncryption::A192CBC_HS384 => hmac_sha384::HMAC::mac(&input, mac_key).to_vec(),
            _ => hmac_sha512::HMAC::mac(&input, mac_key).to_vec(),
        };
        tag.truncate(self.tag_size());
        tag
    }

    /// Encrypts `plaintext`, returning `(ciphertext, tag)`.
    pub fn encrypt(
        &self,
        cek: &[u8],
        iv: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), Error> {
        ensure!(cek.len() == self.key_size(), JoseError::InvalidEncryptionKey);
        ensure!(iv.len() == self.iv_size(), JoseError::InvalidIV);

        if self.is_cbc() {
            let (mac_key, enc_key) = cek.split_at(cek.len() / 2);
            let ciphertext = symm::encrypt(self.cipher(), enc_key, Some(iv), plaintext)?;
            let tag = self.cbc_tag(mac_key, iv, aad, &ciphertext);
            return Ok((ciphertext, tag));
        }

        let cipher = self.cipher();
        let mut crypter = Crypter::new(cipher, Mode::Encrypt, cek, Some(iv))?;
        crypter.aad_update(aad)?;

        let mut ciphertext = vec![0u8; plaintext.len() + cipher.block_size()];
        let mut count = crypter.update(plaintext, &mut ciphertext)?;
        count += crypter.finalize(&mut ciphertext[count..])?;
        ciphertext.truncate(count);

        let mut tag = vec![0u8; self.tag_size()];
        crypter.get_tag(&mut tag)?;

        Ok((ciphertext, tag))
    }

    /// Authenticates and decrypts. Nothing is returned unless the tag verifies.
    pub fn decrypt(
        &self,
        cek: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, Error> {
        ensure!(cek.len() == self.key_size(), JoseError::InvalidEncryptionKey);
        ensure!(iv.len() == self.iv_size(), JoseError::InvalidIV);
        ensure!(tag.len() == self.tag_size(), JoseError::InvalidAuthTagLength);

        if self.is_cbc() {
            let (mac_key, enc_key) = cek.split_at(cek.len() / 2);
            let expected = self.cbc_tag(mac_key, iv, aad, ciphertext);
            ensure!(
                timingsafe_eq(&expected, tag),
                JoseError::InvalidAuthenticationTag
            );
            return symm::decrypt(self.cipher(), enc_key, Some(iv), ciphertext)
                .map_err(|_| JoseError::InvalidAuthenticationTag.into());
        }

        let cipher = self.cipher();
        let mut crypter = Crypter::new(cipher, Mode::Decrypt, cek, Some(iv))?;
        crypter.aad_update(aad)?;
        crypter.set_tag(tag)?;

        let mut plaintext = vec![0u8; ciphertext.len() + cipher.block_size()];
        let mut count = crypter.update(ciphertext, &mut plaintext)?;
        count += crypter
            .finalize(&mut plaintext[count..])
            .map_err(|_| JoseError::InvalidAuthenticationTag)?;
        plaintext.truncate(count);

        Ok(plaintext)
    }
}

impl fmt::Display for ContentEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ContentEncryption {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ContentEncryption {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        ContentEncryption::from_name(&name).map_err(de::Error::custom)
    }
}
