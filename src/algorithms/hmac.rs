use hmac_sha512::sha384 as hmac_sha384;

use crate::common::timingsafe_eq;
use crate::error::*;
use crate::jwa::Algorithm;

/// Minimum HMAC key length: the size of the hash output (RFC 7518 §3.2).
fn min_key_len(alg: Algorithm) -> usize {
    alg.size() / 8
}

pub(crate) fn authentication_tag(
    alg: Algorithm,
    key: &[u8],
    authenticated: &[u8],
) -> Result<Vec<u8>, Error> {
    ensure!(key.len() >= min_key_len(alg), JoseError::WeakKey);
    Ok(match alg {
        Algorithm::HS256 => hmac_sha256::HMAC::mac(authenticated, key).to_vec(),
        Algorithm::HS384 => hmac_sha384::HMAC::mac(authenticated, key).to_vec(),
        Algorithm::HS512 => hmac_sha512::HMAC::mac(authenticated, key).to_vec(),
        other => bail!(JoseError::UnsupportedAlgorithm(other.to_string())),
    })
}

pub(crate) fn verify(
    alg: Algorithm,
    key: &[u8],
    authenticated: &[u8],
    tag: &[u8],
) -> Result<(), Error> {
    let expected = authentication_tag(alg, key, authenticated)?;
    ensure!(timingsafe_eq(&expected, tag), JoseError::InvalidSignature);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_have_hash_length() {
        let key = [7u8; 64];
        for (alg, len) in [
            (Algorithm::HS256, 32),
            (Algorithm::HS384, 48),
            (Algorithm::HS512, 64),
        ] {
            let tag = authentication_tag(alg, &key, b"payload").unwrap();
            assert_eq!(tag.len(), len);
            verify(alg, &key, b"payload", &tag).unwrap();
            assert!(verify(alg, &key, b"payload!", &tag).is_err());
        }
    }

    #[test]
    fn short_keys_are_rejected() {
        assert!(authentication_tag(Algorithm::HS512, &[1u8; 32], b"x").is_err());
    }
}
