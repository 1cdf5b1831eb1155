//! Public and private key material, independent of any JWK metadata.
//!
//! Keys are stored as their JWK components (big-endian unsigned integers and
//! fixed-width curve coordinates) and converted to and from DER
//! (`SubjectPublicKeyInfo` and PKCS#8) on demand.

use std::fmt;

use boring::bn::BigNum;
use boring::pkey::PKey;
use boring::rsa::Rsa;
use p256::pkcs8::{AlgorithmIdentifierRef, ObjectIdentifier, PrivateKeyInfo, SubjectPublicKeyInfoRef};

use crate::algorithms;
use crate::common::SecretBytes;
use crate::encoding::trim_leading_zeros;
use crate::error::*;
use crate::jwa::KeyType;

/// Chinese remainder theorem parameters of an RSA private key.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaCrt {
    pub p: SecretBytes,
    pub q: SecretBytes,
    pub dp: SecretBytes,
    pub dq: SecretBytes,
    pub qi: SecretBytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { curve: KeyType, x: Vec<u8>, y: Vec<u8> },
    Okp { curve: KeyType, x: Vec<u8> },
}

#[derive(Clone, PartialEq, Eq)]
pub enum PrivateKey {
    Rsa {
        n: Vec<u8>,
        e: Vec<u8>,
        d: SecretBytes,
        crt: Option<RsaCrt>,
    },
    Ec { curve: KeyType, d: SecretBytes },
    Okp { curve: KeyType, d: SecretBytes },
}

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

const KEY_ALGORITHMS: [(KeyType, ObjectIdentifier, Option<ObjectIdentifier>); 8] = [
    (KeyType::Rsa, RSA_ENCRYPTION, None),
    (
        KeyType::EcP256,
        EC_PUBLIC_KEY,
        Some(ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7")),
    ),
    (
        KeyType::EcP384,
        EC_PUBLIC_KEY,
        Some(ObjectIdentifier::new_unwrap("1.3.132.0.34")),
    ),
    (
        KeyType::EcP521,
        EC_PUBLIC_KEY,
        Some(ObjectIdentifier::new_unwrap("1.3.132.0.35")),
    ),
    (KeyType::X25519, ObjectIdentifier::new_unwrap("1.3.101.110"), None),
    (KeyType::X448, ObjectIdentifier::new_unwrap("1.3.101.111"), None),
    (KeyType::Ed25519, ObjectIdentifier::new_unwrap("1.3.101.112"), None),
    (KeyType::Ed448, ObjectIdentifier::new_unwrap("1.3.101.113"), None),
];

/// Key type named by an `AlgorithmIdentifier`. NULL parameters count as absent.
fn key_type_of(algorithm: &AlgorithmIdentifierRef<'_>) -> Result<KeyType, Error> {
    let unsupported = || JoseError::UnsupportedKeyType(algorithm.oid.to_string());
    let oids = algorithm.oids().map_err(|_| unsupported())?;
    KEY_ALGORITHMS
        .iter()
        .find(|(_, oid, parameters)| (*oid, *parameters) == oids)
        .map(|(key_type, _, _)| *key_type)
        .ok_or_else(|| unsupported().into())
}

/// Parameterless `AlgorithmIdentifier` of an octet key pair curve.
pub(crate) fn algorithm_identifier(curve: KeyType) -> Result<AlgorithmIdentifierRef<'static>, Error> {
    match KEY_ALGORITHMS.iter().find(|(key_type, _, _)| *key_type == curve) {
        Some((_, oid, None)) => Ok(AlgorithmIdentifierRef {
            oid: *oid,
            parameters: None,
        }),
        _ => bail!(JoseError::UnsupportedKeyType(curve.to_string())),
    }
}

fn check_size(curve: KeyType, value: &[u8], error: JoseError) -> Result<(), Error> {
    ensure!(Some(value.len()) == curve.coordinate_size(), error);
    Ok(())
}

impl PublicKey {
    pub fn rsa(n: &[u8], e: &[u8]) -> Result<Self, Error> {
        let (n, e) = (trim_leading_zeros(n), trim_leading_zeros(e));
        ensure!(!n.is_empty() && !e.is_empty(), JoseError::InvalidPublicKey);
        Ok(PublicKey::Rsa {
            n: n.to_vec(),
            e: e.to_vec(),
        })
    }

    pub fn ec(curve: KeyType, x: &[u8], y: &[u8]) -> Result<Self, Error> {
        ensure!(
            curve.is_ec(),
            JoseError::UnsupportedKeyType(curve.to_string())
        );
        check_size(curve, x, JoseError::InvalidPublicKey)?;
        check_size(curve, y, JoseError::InvalidPublicKey)?;
        Ok(PublicKey::Ec {
            curve,
            x: x.to_vec(),
            y: y.to_vec(),
        })
    }

    pub fn okp(curve: KeyType, x: &[u8]) -> Result<Self, Error> {
        ensure!(
            curve.is_okp(),
            JoseError::UnsupportedKeyType(curve.to_string())
        );
        check_size(curve, x, JoseError::InvalidPublicKey)?;
        Ok(PublicKey::Okp {
            curve,
            x: x.to_vec(),
        })
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            PublicKey::Rsa { .. } => KeyType::Rsa,
            PublicKey::Ec { curve, .. } | PublicKey::Okp { curve, .. } => *curve,
        }
    }

    /// Uncompressed SEC1 encoding of an EC point.
    pub(crate) fn sec1_uncompressed(&self) -> Result<Vec<u8>, Error> {
        match self {
            PublicKey::Ec { x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Ok(point)
            }
            _ => bail!(JoseError::UnsupportedKeyType(self.key_type().to_string())),
        }
    }

    pub(crate) fn from_sec1(curve: KeyType, point: &[u8]) -> Result<Self, Error> {
        let size = curve
            .coordinate_size()
            .ok_or(JoseError::InvalidPublicKey)?;
        ensure!(
            point.len() == 1 + 2 * size && point[0] == 0x04,
            JoseError::InvalidPublicKey
        );
        PublicKey::ec(curve, &point[1..=size], &point[1 + size..])
    }

    pub(crate) fn to_rsa(&self) -> Result<Rsa<boring::pkey::Public>, Error> {
        match self {
            PublicKey::Rsa { n, e } => Ok(Rsa::from_public_components(
                BigNum::from_slice(n)?,
                BigNum::from_slice(e)?,
            )?),
            _ => bail!(JoseError::UnsupportedKeyType(self.key_type().to_string())),
        }
    }

    /// Parses a DER `SubjectPublicKeyInfo`.
    pub fn from_der(spki: &[u8]) -> Result<Self, Error> {
        let info =
            SubjectPublicKeyInfoRef::try_from(spki).map_err(|_| JoseError::InvalidPublicKey)?;
        match key_type_of(&info.algorithm)? {
            KeyType::Rsa => algorithms::rsa::public_key_from_der(spki),
            curve if curve.is_ec() => algorithms::ec::public_key_from_der(curve, spki),
            curve => algorithms::okp::public_key_from_der(curve, spki),
        }
    }

    /// Encodes the key as a DER `SubjectPublicKeyInfo`.
    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        match self {
            PublicKey::Rsa { .. } => Ok(PKey::from_rsa(self.to_rsa()?)?.public_key_to_der()?),
            PublicKey::Ec { .. } => algorithms::ec::public_key_to_der(self),
            PublicKey::Okp { .. } => algorithms::okp::public_key_to_der(self),
        }
    }
}

impl PrivateKey {
    pub fn ec(curve: KeyType, d: &[u8]) -> Result<Self, Error> {
        ensure!(
            curve.is_ec(),
            JoseError::UnsupportedKeyType(curve.to_string())
        );
        check_size(curve, d, JoseError::InvalidKeyPair)?;
        Ok(PrivateKey::Ec {
            curve,
            d: SecretBytes::from_slice(d),
        })
    }

    pub fn okp(curve: KeyType, d: &[u8]) -> Result<Self, Error> {
        ensure!(
            curve.is_okp(),
            JoseError::UnsupportedKeyType(curve.to_string())
        );
        check_size(curve, d, JoseError::InvalidKeyPair)?;
        Ok(PrivateKey::Okp {
            curve,
            d: SecretBytes::from_slice(d),
        })
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            PrivateKey::Rsa { .. } => KeyType::Rsa,
            PrivateKey::Ec { curve, .. } | PrivateKey::Okp { curve, .. } => *curve,
        }
    }

    /// Public counterpart of this key, when it can be computed.
    ///
    /// Returns `None` for curves the crypto backends do not implement.
    pub fn public_key(&self) -> Result<Option<PublicKey>, Error> {
        match self {
            PrivateKey::Rsa { n, e, .. } => Ok(Some(PublicKey::rsa(n, e)?)),
            PrivateKey::Ec { curve, d } => algorithms::ec::public_key(*curve, d.as_bytes()).map(Some),
            PrivateKey::Okp { curve, d } => algorithms::okp::public_key(*curve, d.as_bytes()),
        }
    }

    pub(crate) fn from_rsa(rsa: &Rsa<boring::pkey::Private>) -> Result<Self, Error> {
        let crt = match (rsa.p(), rsa.q(), rsa.dmp1(), rsa.dmq1(), rsa.iqmp()) {
            (Some(p), Some(q), Some(dp), Some(dq), Some(qi)) => Some(RsaCrt {
                p: SecretBytes::new(p.to_vec()),
                q: SecretBytes::new(q.to_vec()),
                dp: SecretBytes::new(dp.to_vec()),
                dq: SecretBytes::new(dq.to_vec()),
                qi: SecretBytes::new(qi.to_vec()),
            }),
            _ => None,
        };
        Ok(PrivateKey::Rsa {
            n: rsa.n().to_vec(),
            e: rsa.e().to_vec(),
            d: SecretBytes::new(rsa.d().to_vec()),
            crt,
        })
    }

    /// RSA keys without CRT parameters get them recovered from `n`, `e`
    /// and `d` (RFC 7518 §6.3.2 makes them optional).
    pub(crate) fn to_rsa(&self) -> Result<Rsa<boring::pkey::Private>, Error> {
        match self {
            PrivateKey::Rsa { n, e, d, crt } => {
                let recovered;
                let crt = match crt {
                    Some(crt) => crt,
                    None => {
                        recovered = algorithms::rsa::recover_crt(n, e, d.as_bytes())?;
                        &recovered
                    }
                };
                let rsa = Rsa::from_private_components(
                    BigNum::from_slice(n)?,
                    BigNum::from_slice(e)?,
                    BigNum::from_slice(d.as_bytes())?,
                    BigNum::from_slice(crt.p.as_bytes())?,
                    BigNum::from_slice(crt.q.as_bytes())?,
                    BigNum::from_slice(crt.dp.as_bytes())?,
                    BigNum::from_slice(crt.dq.as_bytes())?,
                    BigNum::from_slice(crt.qi.as_bytes())?,
                )?;
                ensure!(rsa.check_key()?, JoseError::InvalidKeyPair);
                Ok(rsa)
            }
            _ => bail!(JoseError::UnsupportedKeyType(self.key_type().to_string())),
        }
    }

    /// Parses a DER PKCS#8 `PrivateKeyInfo`.
    pub fn from_der(pkcs8: &[u8]) -> Result<Self, Error> {
        let info = PrivateKeyInfo::try_from(pkcs8).map_err(|_| JoseError::InvalidKeyPair)?;
        match key_type_of(&info.algorithm)? {
            KeyType::Rsa => algorithms::rsa::private_key_from_der(pkcs8),
            curve if curve.is_ec() => algorithms::ec::private_key_from_der(curve, pkcs8),
            curve => algorithms::okp::private_key_from_der(curve, pkcs8),
        }
    }

    /// Encodes the key as a DER PKCS#8 `PrivateKeyInfo`.
    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        match self {
            PrivateKey::Rsa { .. } => {
                Ok(PKey::from_rsa(self.to_rsa()?)?.private_key_to_der_pkcs8()?)
            }
            PrivateKey::Ec { .. } => algorithms::ec::private_key_to_der(self),
            PrivateKey::Okp { .. } => algorithms::okp::private_key_to_der(self),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_type", &self.key_type())
            .finish_non_exhaustive()
    }
}
