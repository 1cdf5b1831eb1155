//! X.509 certificate references (`x5u`, `x5c`, `x5t`, `x5t#S256`).
//!
//! Certificates are kept as DER and parsed with BoringSSL only to extract
//! the subject public key. No path validation is performed.

use std::fmt;

use boring::x509::X509;
use ct_codecs::{Base64, Decoder, Encoder};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::common::timingsafe_eq;
use crate::error::*;
use crate::keys::PublicKey;
use crate::resolver::Resolver;

/// A DER encoded X.509 certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate(Vec<u8>);

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        X509::from_der(der)
            .map_err(|_| JoseError::illegal_argument("Invalid X.509 certificate"))?;
        Ok(Certificate(der.to_vec()))
    }

    pub fn to_der(&self) -> &[u8] {
        &self.0
    }

    /// Subject public key.
    pub fn public_key(&self) -> Result<PublicKey, Error> {
        let spki = X509::from_der(&self.0)?.public_key()?.public_key_to_der()?;
        PublicKey::from_der(&spki)
    }

    /// SHA-1 digest of the DER encoding (`x5t`).
    pub fn sha1_thumbprint(&self) -> Vec<u8> {
        hmac_sha1_compact::Hash::hash(&self.0).to_vec()
    }

    /// SHA-256 digest of the DER encoding (`x5t#S256`).
    pub fn sha256_thumbprint(&self) -> Vec<u8> {
        hmac_sha256::Hash::hash(&self.0).to_vec()
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Certificate({} bytes)", self.0.len())
    }
}

// `x5c` entries use standard, padded base64 (RFC 7517 §4.7).
impl Serialize for Certificate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = Base64::encode_to_string(&self.0).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for Certificate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let der = Base64::decode_to_vec(&encoded, None).map_err(de::Error::custom)?;
        Certificate::from_der(&der).map_err(de::Error::custom)
    }
}

/// Anything that can reference a certificate chain: keys and headers.
pub trait CertificateReference {
    fn certificate_uri(&self) -> Option<&str>;
    fn certificate_chain(&self) -> Option<&[Certificate]>;
    fn certificate_thumbprint(&self) -> Option<&[u8]>;
    fn certificate_sha256_thumbprint(&self) -> Option<&[u8]>;
}

/// Resolves the chain a reference points to and checks it against the
/// declared thumbprints.
///
/// Without a resolver an `x5u`-only reference cannot be dereferenced and
/// yields `None`. A reference with neither `x5c` nor `x5u` also yields
/// `None`.
pub fn verify<R: CertificateReference + ?Sized>(
    reference: &R,
    resolver: Option<&Resolver>,
) -> Result<Option<Vec<Certificate>>, Error> {
    let inline = reference.certificate_chain();
    let remote = match (reference.certificate_uri(), resolver) {
        (Some(uri), Some(resolver)) => Some(resolver.certificate_chain(uri)?),
        _ => None,
    };
    let chain: Vec<Certificate> = match (inline, &remote) {
        (Some(inline), Some(remote)) => {
            ensure!(
                inline == remote.as_slice(),
                JoseError::illegal_argument("Certificate mismatch")
            );
            inline.to_vec()
        }
        (Some(inline), None) => inline.to_vec(),
        (None, Some(remote)) => remote.as_ref().clone(),
        (None, None) => return Ok(None),
    };

    let leaf = chain.first().ok_or_else(|| {
        JoseError::illegal_argument("At least one certificate is required")
    })?;
    if let Some(thumbprint) = reference.certificate_thumbprint() {
        ensure!(
            timingsafe_eq(thumbprint, &leaf.sha1_thumbprint()),
            JoseError::illegal_argument("Certificate SHA-1 thumbprint mismatch")
        );
    }
    if let Some(thumbprint) = reference.certificate_sha256_thumbprint() {
        ensure!(
            timingsafe_eq(thumbprint, &leaf.sha256_thumbprint()),
            JoseError::illegal_argument("Certificate SHA-256 thumbprint mismatch")
        );
    }
    Ok(Some(chain))
}
