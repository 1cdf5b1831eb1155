//! JSON Web Algorithms: key types, key uses, key operations and the
//! signature / key management algorithm table.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::*;
use crate::header::Param;

/// Key type, including the curve for elliptic and octet key pair keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    EcP256,
    EcP384,
    EcP521,
    Ed25519,
    Ed448,
    X25519,
    X448,
    Rsa,
    /// RSA key restricted to RSASSA-PSS; serialized with `"kty":"RSA"`.
    RsaPss,
    /// Symmetric key (`"kty":"oct"`).
    Raw,
}

impl KeyType {
    /// The JWK `kty` value.
    pub fn kty(&self) -> &'static str {
        match self {
            KeyType::EcP256 | KeyType::EcP384 | KeyType::EcP521 => "EC",
            KeyType::Ed25519 | KeyType::Ed448 | KeyType::X25519 | KeyType::X448 => "OKP",
            KeyType::Rsa | KeyType::RsaPss => "RSA",
            KeyType::Raw => "oct",
        }
    }

    /// The JWK `crv` value, for curve-based keys.
    pub fn crv(&self) -> Option<&'static str> {
        match self {
            KeyType::EcP256 => Some("P-256"),
            KeyType::EcP384 => Some("P-384"),
            KeyType::EcP521 => Some("P-521"),
            KeyType::Ed25519 => Some("Ed25519"),
            KeyType::Ed448 => Some("Ed448"),
            KeyType::X25519 => Some("X25519"),
            KeyType::X448 => Some("X448"),
            _ => None,
        }
    }

    pub fn from_kty_crv(kty: &str, crv: Option<&str>) -> Result<Self, Error> {
        match (kty, crv) {
            ("RSA", None) => Ok(KeyType::Rsa),
            ("oct", None) => Ok(KeyType::Raw),
            ("EC", Some("P-256")) => Ok(KeyType::EcP256),
            ("EC", Some("P-384")) => Ok(KeyType::EcP384),
            ("EC", Some("P-521")) => Ok(KeyType::EcP521),
            ("OKP", Some("Ed25519")) => Ok(KeyType::Ed25519),
            ("OKP", Some("Ed448")) => Ok(KeyType::Ed448),
            ("OKP", Some("X25519")) => Ok(KeyType::X25519),
            ("OKP", Some("X448")) => Ok(KeyType::X448),
            ("EC", None) | ("OKP", None) => {
                bail!(JoseError::illegal_argument("Missing algorithm parameters"))
            }
            (kty, Some(crv)) if kty == "EC" || kty == "OKP" => bail!(
                JoseError::UnsupportedKeyType(format!("{} {}", kty, crv))
            ),
            (kty, _) => bail!(JoseError::UnsupportedKeyType(kty.to_string())),
        }
    }

    pub fn is_ec(&self) -> bool {
        matches!(self, KeyType::EcP256 | KeyType::EcP384 | KeyType::EcP521)
    }

    pub fn is_okp(&self) -> bool {
        matches!(
            self,
            KeyType::Ed25519 | KeyType::Ed448 | KeyType::X25519 | KeyType::X448
        )
    }

    pub fn is_rsa(&self) -> bool {
        matches!(self, KeyType::Rsa | KeyType::RsaPss)
    }

    /// Size in bytes of a coordinate or raw key for curve-based keys.
    pub fn coordinate_size(&self) -> Option<usize> {
        match self {
            KeyType::EcP256 => Some(32),
            KeyType::EcP384 => Some(48),
            KeyType::EcP521 => Some(66),
            KeyType::Ed25519 | KeyType::X25519 => Some(32),
            KeyType::Ed448 => Some(57),
            KeyType::X448 => Some(56),
            _ => None,
        }
    }

    /// Whether keys of this type and `other` share the same underlying material format.
    pub(crate) fn same_family(&self, other: KeyType) -> bool {
        *self == other || (self.is_rsa() && other.is_rsa())
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::RsaPss => f.write_str("RSASSA-PSS"),
            other => match other.crv() {
                Some(crv) => write!(f, "{} {}", other.kty(), crv),
                None => f.write_str(other.kty()),
            },
        }
    }
}

/// Public key use (`use`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Use {
    #[serde(rename = "sig")]
    Sign,
    #[serde(rename = "enc")]
    Encrypt,
}

impl Use {
    pub fn name(&self) -> &'static str {
        match self {
            Use::Sign => "sig",
            Use::Encrypt => "enc",
        }
    }
}

impl fmt::Display for Use {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key operation (`key_ops`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "sign")]
    Sign,
    #[serde(rename = "verify")]
    Verify,
    #[serde(rename = "encrypt")]
    Encrypt,
    #[serde(rename = "decrypt")]
    Decrypt,
    #[serde(rename = "wrapKey")]
    WrapKey,
    #[serde(rename = "unwrapKey")]
    UnwrapKey,
    #[serde(rename = "deriveKey")]
    DeriveKey,
    #[serde(rename = "deriveBits")]
    DeriveBits,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Sign => "sign",
            Operation::Verify => "verify",
            Operation::Encrypt => "encrypt",
            Operation::Decrypt => "decrypt",
            Operation::WrapKey => "wrapKey",
            Operation::UnwrapKey => "unwrapKey",
            Operation::DeriveKey => "deriveKey",
            Operation::DeriveBits => "deriveBits",
        }
    }

    /// The operation an `ops` pair may combine this one with.
    pub(crate) fn complement(&self) -> Option<Operation> {
        match self {
            Operation::Sign => Some(Operation::Verify),
            Operation::Verify => Some(Operation::Sign),
            Operation::Encrypt => Some(Operation::Decrypt),
            Operation::Decrypt => Some(Operation::Encrypt),
            Operation::WrapKey => Some(Operation::UnwrapKey),
            Operation::UnwrapKey => Some(Operation::WrapKey),
            Operation::DeriveKey | Operation::DeriveBits => None,
        }
    }

    pub(crate) fn is_signature(&self) -> bool {
        matches!(self, Operation::Sign | Operation::Verify)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn format_ops(ops: &[Operation]) -> String {
    let names: Vec<&str> = ops.iter().map(Operation::name).collect();
    format!("[{}]", names.join(", "))
}

/// How an algorithm uses its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmFamily {
    Hmac,
    RsaPkcs1,
    RsaPss,
    Ecdsa,
    EdDsa,
    RsaKeyEncryption,
    AesKeyWrap,
    AesGcmKeyWrap,
    Direct,
    EcdhEs,
    EcdhEsKeyWrap,
    Pbes2,
}

/// Signature and key management algorithms (`alg`).
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
    ES512,
    EdDSA,
    RSA1_5,
    RSA_OAEP,
    RSA_OAEP_256,
    A128KW,
    A192KW,
    A256KW,
    A128GCMKW,
    A192GCMKW,
    A256GCMKW,
    Dir,
    ECDH_ES,
    ECDH_ES_A128KW,
    ECDH_ES_A192KW,
    ECDH_ES_A256KW,
    PBES2_HS256_A128KW,
    PBES2_HS384_A192KW,
    PBES2_HS512_A256KW,
}

const EC_AGREEMENT_TYPES: &[KeyType] = &[
    KeyType::EcP256,
    KeyType::EcP384,
    KeyType::EcP521,
    KeyType::X25519,
    KeyType::X448,
];

const SIGNATURE_OPS: &[Operation] = &[Operation::Sign, Operation::Verify];
const WRAP_OPS: &[Operation] = &[Operation::WrapKey, Operation::UnwrapKey];
const DIRECT_OPS: &[Operation] = &[Operation::Encrypt, Operation::Decrypt];
const DERIVE_OPS: &[Operation] = &[Operation::DeriveKey, Operation::DeriveBits];

const KEY_ENCRYPTION_PARAMS: &[Param] = &[Param::Encryption, Param::Deflate];
const GCM_KEY_WRAP_PARAMS: &[Param] = &[
    Param::Encryption,
    Param::Deflate,
    Param::InitializationVector,
    Param::Tag,
];
const AGREEMENT_PARAMS: &[Param] = &[
    Param::Encryption,
    Param::Deflate,
    Param::EphemeralPublicKey,
    Param::PartyUInfo,
    Param::PartyVInfo,
];
const PASSWORD_PARAMS: &[Param] = &[
    Param::Encryption,
    Param::Deflate,
    Param::PasswordSalt,
    Param::PasswordCount,
];

impl Algorithm {
    pub const ALL: &'static [Algorithm] = &[
        Algorithm::HS256,
        Algorithm::HS384,
        Algorithm::HS512,
        Algorithm::RS256,
        Algorithm::RS384,
        Algorithm::RS512,
        Algorithm::PS256,
        Algorithm::PS384,
        Algorithm::PS512,
        Algorithm::ES256,
        Algorithm::ES384,
        Algorithm::ES512,
        Algorithm::EdDSA,
        Algorithm::RSA1_5,
        Algorithm::RSA_OAEP,
        Algorithm::RSA_OAEP_256,
        Algorithm::A128KW,
        Algorithm::A192KW,
        Algorithm::A256KW,
        Algorithm::A128GCMKW,
        Algorithm::A192GCMKW,
        Algorithm::A256GCMKW,
        Algorithm::Dir,
        Algorithm::ECDH_ES,
        Algorithm::ECDH_ES_A128KW,
        Algorithm::ECDH_ES_A192KW,
        Algorithm::ECDH_ES_A256KW,
        Algorithm::PBES2_HS256_A128KW,
        Algorithm::PBES2_HS384_A192KW,
        Algorithm::PBES2_HS512_A256KW,
    ];

    /// The JOSE `alg` value.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::HS256 => "HS256",
            Algorithm::HS384 => "HS384",
            Algorithm::HS512 => "HS512",
            Algorithm::RS256 => "RS256",
            Algorithm::RS384 => "RS384",
            Algorithm::RS512 => "RS512",
            Algorithm::PS256 => "PS256",
            Algorithm::PS384 => "PS384",
            Algorithm::PS512 => "PS512",
            Algorithm::ES256 => "ES256",
            Algorithm::ES384 => "ES384",
            Algorithm::ES512 => "ES512",
            Algorithm::EdDSA => "EdDSA",
            Algorithm::RSA1_5 => "RSA1_5",
            Algorithm::RSA_OAEP => "RSA-OAEP",
            Algorithm::RSA_OAEP_256 => "RSA-OAEP-256",
            Algorithm::A128KW => "A128KW",
            Algorithm::A192KW => "A192KW",
            Algorithm::A256KW => "A256KW",
            Algorithm::A128GCMKW => "A128GCMKW",
            Algorithm::A192GCMKW => "A192GCMKW",
            Algorithm::A256GCMKW => "A256GCMKW",
            Algorithm::Dir => "dir",
            Algorithm::ECDH_ES => "ECDH-ES",
            Algorithm::ECDH_ES_A128KW => "ECDH-ES+A128KW",
            Algorithm::ECDH_ES_A192KW => "ECDH-ES+A192KW",
            Algorithm::ECDH_ES_A256KW => "ECDH-ES+A256KW",
            Algorithm::PBES2_HS256_A128KW => "PBES2-HS256+A128KW",
            Algorithm::PBES2_HS384_A192KW => "PBES2-HS384+A192KW",
            Algorithm::PBES2_HS512_A256KW => "PBES2-HS512+A256KW",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, Error> {
        Algorithm::ALL
            .iter()
            .copied()
            .find(|alg| alg.name() == name)
            .ok_or_else(|| JoseError::UnsupportedAlgorithm(name.to_string()).into())
    }

    pub fn family(&self) -> AlgorithmFamily {
        match self {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => AlgorithmFamily::Hmac,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => AlgorithmFamily::RsaPkcs1,
            Algorithm::PS256 | Algorithm::PS384 | Algorithm::PS512 => AlgorithmFamily::RsaPss,
            Algorithm::ES256 | Algorithm::ES384 | Algorithm::ES512 => AlgorithmFamily::Ecdsa,
            Algorithm::EdDSA => AlgorithmFamily::EdDsa,
            Algorithm::RSA1_5 | Algorithm::RSA_OAEP | Algorithm::RSA_OAEP_256 => {
                AlgorithmFamily::RsaKeyEncryption
            }
            Algorithm::A128KW | Algorithm::A192KW | Algorithm::A256KW => {
                AlgorithmFamily::AesKeyWrap
            }
            Algorithm::A128GCMKW | Algorithm::A192GCMKW | Algorithm::A256GCMKW => {
                AlgorithmFamily::AesGcmKeyWrap
            }
            Algorithm::Dir => AlgorithmFamily::Direct,
            Algorithm::ECDH_ES => AlgorithmFamily::EcdhEs,
            Algorithm::ECDH_ES_A128KW | Algorithm::ECDH_ES_A192KW | Algorithm::ECDH_ES_A256KW => {
                AlgorithmFamily::EcdhEsKeyWrap
            }
            Algorithm::PBES2_HS256_A128KW
            | Algorithm::PBES2_HS384_A192KW
            | Algorithm::PBES2_HS512_A256KW => AlgorithmFamily::Pbes2,
        }
    }

    /// Size in bits: the digest size for signatures, the key encryption
    /// key size for key wrapping, zero when the size comes from `enc`.
    pub fn size(&self) -> usize {
        match self {
            Algorithm::HS256 | Algorithm::RS256 | Algorithm::PS256 | Algorithm::ES256 => 256,
            Algorithm::HS384 | Algorithm::RS384 | Algorithm::PS384 | Algorithm::ES384 => 384,
            Algorithm::HS512 | Algorithm::RS512 | Algorithm::PS512 | Algorithm::ES512 => 512,
            Algorithm::A128KW
            | Algorithm::A128GCMKW
            | Algorithm::ECDH_ES_A128KW
            | Algorithm::PBES2_HS256_A128KW => 128,
            Algorithm::A192KW
            | Algorithm::A192GCMKW
            | Algorithm::ECDH_ES_A192KW
            | Algorithm::PBES2_HS384_A192KW => 192,
            Algorithm::A256KW
            | Algorithm::A256GCMKW
            | Algorithm::ECDH_ES_A256KW
            | Algorithm::PBES2_HS512_A256KW => 256,
            Algorithm::EdDSA
            | Algorithm::RSA1_5
            | Algorithm::RSA_OAEP
            | Algorithm::RSA_OAEP_256
            | Algorithm::Dir
            | Algorithm::ECDH_ES => 0,
        }
    }

    /// Key types this algorithm accepts.
    pub fn key_types(&self) -> &'static [KeyType] {
        match self.family() {
            AlgorithmFamily::Hmac
            | AlgorithmFamily::AesKeyWrap
            | AlgorithmFamily::AesGcmKeyWrap
            | AlgorithmFamily::Direct
            | AlgorithmFamily::Pbes2 => &[KeyType::Raw],
            AlgorithmFamily::RsaPkcs1 | AlgorithmFamily::RsaKeyEncryption => &[KeyType::Rsa],
            AlgorithmFamily::RsaPss => &[KeyType::RsaPss, KeyType::Rsa],
            AlgorithmFamily::Ecdsa => match self {
                Algorithm::ES256 => &[KeyType::EcP256],
                Algorithm::ES384 => &[KeyType::EcP384],
                _ => &[KeyType::EcP521],
            },
            AlgorithmFamily::EdDsa => &[KeyType::Ed25519, KeyType::Ed448],
            AlgorithmFamily::EcdhEs | AlgorithmFamily::EcdhEsKeyWrap => EC_AGREEMENT_TYPES,
        }
    }

    pub fn key_use(&self) -> Use {
        match self.family() {
            AlgorithmFamily::Hmac
            | AlgorithmFamily::RsaPkcs1
            | AlgorithmFamily::RsaPss
            | AlgorithmFamily::Ecdsa
            | AlgorithmFamily::EdDsa => Use::Sign,
            _ => Use::Encrypt,
        }
    }

    /// Key operations this algorithm performs.
    pub fn key_ops(&self) -> &'static [Operation] {
        match self.family() {
            AlgorithmFamily::Hmac
            | AlgorithmFamily::RsaPkcs1
            | AlgorithmFamily::RsaPss
            | AlgorithmFamily::Ecdsa
            | AlgorithmFamily::EdDsa => SIGNATURE_OPS,
            AlgorithmFamily::Direct => DIRECT_OPS,
            AlgorithmFamily::EcdhEs | AlgorithmFamily::EcdhEsKeyWrap => DERIVE_OPS,
            _ => WRAP_OPS,
        }
    }

    /// Header parameters the algorithm understands beyond the registered ones.
    pub fn encryption_params(&self) -> &'static [Param] {
        match self.family() {
            AlgorithmFamily::Hmac
            | AlgorithmFamily::RsaPkcs1
            | AlgorithmFamily::RsaPss
            | AlgorithmFamily::Ecdsa
            | AlgorithmFamily::EdDsa => &[],
            AlgorithmFamily::AesGcmKeyWrap => GCM_KEY_WRAP_PARAMS,
            AlgorithmFamily::EcdhEs | AlgorithmFamily::EcdhEsKeyWrap => AGREEMENT_PARAMS,
            AlgorithmFamily::Pbes2 => PASSWORD_PARAMS,
            _ => KEY_ENCRYPTION_PARAMS,
        }
    }

    pub fn is_signature(&self) -> bool {
        self.key_use() == Use::Sign
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Algorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Algorithm::from_name(&name).map_err(de::Error::custom)
    }
}
