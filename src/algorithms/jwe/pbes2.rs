//! Password-based key encryption (`PBES2-HS*+A*KW`, RFC 7518 §4.8).

use boring::hash::MessageDigest;
use boring::pkcs5::pbkdf2_hmac;

use crate::common::SecretBytes;
use crate::error::*;
use crate::jwa::Algorithm;

/// Shortest accepted `p2s` value, in bytes.
pub(crate) const MIN_SALT_LEN: usize = 8;

fn digest(alg: Algorithm) -> Result<MessageDigest, Error> {
    Ok(match alg {
        Algorithm::PBES2_HS256_A128KW => MessageDigest::sha256(),
        Algorithm::PBES2_HS384_A192KW => MessageDigest::sha384(),
        Algorithm::PBES2_HS512_A256KW => MessageDigest::sha512(),
        other => bail!(JoseError::UnsupportedAlgorithm(other.to_string())),
    })
}

/// Iteration count used when encrypting: 2048, 3072 or 4096.
pub(crate) fn default_count(alg: Algorithm) -> u32 {
    (alg.size() * 16) as u32
}

/// Random `p2s` sized to the key wrap key.
pub(crate) fn generate_salt(alg: Algorithm) -> Vec<u8> {
    crate::ephemeral::random_bytes(alg.size() / 8)
}

/// Derives the key encryption key. The PBKDF2 salt is
/// `alg || 0x00 || p2s`.
pub(crate) fn derive_key(
    alg: Algorithm,
    password: &[u8],
    p2s: &[u8],
    p2c: u32,
    min_count: u32,
    max_count: u32,
) -> Result<SecretBytes, Error> {
    ensure!(
        p2s.len() >= MIN_SALT_LEN,
        JoseError::InvalidPasswordDerivedKey(format!(
            "salt must be at least {} bytes",
            MIN_SALT_LEN
        ))
    );
    ensure!(
        p2c >= min_count,
        JoseError::InvalidPasswordDerivedKey(format!(
            "iteration count must be at least {}",
            min_count
        ))
    );
    ensure!(
        p2c <= max_count,
        JoseError::InvalidPasswordDerivedKey(format!(
            "iteration count must not exceed {}",
            max_count
        ))
    );
    ensure!(
        !password.is_empty(),
        JoseError::InvalidPasswordDerivedKey("empty password".to_string())
    );

    let mut salt = Vec::with_capacity(alg.name().len() + 1 + p2s.len());
    salt.extend_from_slice(alg.name().as_bytes());
    salt.push(0);
    salt.extend_from_slice(p2s);

    let mut key = vec![0u8; alg.size() / 8];
    pbkdf2_hmac(password, &salt, p2c as usize, digest(alg)?, &mut key)?;
    Ok(SecretBytes::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_key_matches_wrap_size() {
        for alg in [
            Algorithm::PBES2_HS256_A128KW,
            Algorithm::PBES2_HS384_A192KW,
            Algorithm::PBES2_HS512_A256KW,
        ] {
            let salt = generate_salt(alg);
            let key = derive_key(alg, b"password", &salt, default_count(alg), 1000, 100_000)
                .unwrap();
            assert_eq!(key.len(), alg.size() / 8);
        }
    }

    #[test]
    fn rfc7517_appendix_c_salt() {
        // RFC 7517 C.4: p2s and p2c from the example, key is 16 bytes.
        let p2s = crate::encoding::from_base64url("2WCTcJZ1Rvd_CJuJripQ1w").unwrap();
        let key = derive_key(
            Algorithm::PBES2_HS256_A128KW,
            b"Thus from my lips, by yours, my sin is purged.",
            &p2s,
            4096,
            1000,
            100_000,
        )
        .unwrap();
        assert_eq!(
            key.as_bytes(),
            &[
                110, 171, 169, 92, 129, 92, 109, 117, 233, 242, 116, 233, 170, 14, 24, 75
            ]
        );
    }

    #[test]
    fn parameter_floor() {
        let alg = Algorithm::PBES2_HS256_A128KW;
        let err = derive_key(alg, b"password", &[1u8; 7], 2048, 1000, 100_000).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid password-derived key: salt must be at least 8 bytes"
        );
        let err = derive_key(alg, b"password", &[1u8; 8], 999, 1000, 100_000).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid password-derived key: iteration count must be at least 1000"
        );
        assert!(derive_key(alg, b"password", &[1u8; 8], 200_000, 1000, 100_000).is_err());
    }
}
