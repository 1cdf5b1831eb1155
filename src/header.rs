//! JOSE headers shared by signatures and encryption (RFC 7515 §4,
//! RFC 7516 §4, RFC 7518 §4).
//!
//! A [`Jose`] is validated once, when it is built or parsed, and is
//! immutable afterwards. Registered parameters are typed fields; any other
//! member is an extended parameter kept as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::algorithms::jwe::ContentEncryption;
use crate::cert::{self, Certificate, CertificateReference};
use crate::error::*;
use crate::extension::ExtensionRegistry;
use crate::jwa::Algorithm;
use crate::jwk::{Jwk, JwkBuilder};
use crate::resolver::Resolver;
use crate::serde_additions::base64url_bytes;

/// Compression applied before content encryption (`zip`).
pub const DEFLATE: &str = "DEF";

/// Registered header parameter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    Algorithm,
    KeyId,
    KeySetUri,
    Key,
    CertificateUri,
    CertificateChain,
    CertificateThumbprint,
    CertificateSha256Thumbprint,
    Type,
    ContentType,
    CriticalParameters,
    Encryption,
    Deflate,
    EphemeralPublicKey,
    PartyUInfo,
    PartyVInfo,
    InitializationVector,
    Tag,
    PasswordSalt,
    PasswordCount,
}

impl Param {
    pub const ALL: &'static [Param] = &[
        Param::Algorithm,
        Param::KeyId,
        Param::KeySetUri,
        Param::Key,
        Param::CertificateUri,
        Param::CertificateChain,
        Param::CertificateThumbprint,
        Param::CertificateSha256Thumbprint,
        Param::Type,
        Param::ContentType,
        Param::CriticalParameters,
        Param::Encryption,
        Param::Deflate,
        Param::EphemeralPublicKey,
        Param::PartyUInfo,
        Param::PartyVInfo,
        Param::InitializationVector,
        Param::Tag,
        Param::PasswordSalt,
        Param::PasswordCount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Param::Algorithm => "alg",
            Param::KeyId => "kid",
            Param::KeySetUri => "jku",
            Param::Key => "jwk",
            Param::CertificateUri => "x5u",
            Param::CertificateChain => "x5c",
            Param::CertificateThumbprint => "x5t",
            Param::CertificateSha256Thumbprint => "x5t#S256",
            Param::Type => "typ",
            Param::ContentType => "cty",
            Param::CriticalParameters => "crit",
            Param::Encryption => "enc",
            Param::Deflate => "zip",
            Param::EphemeralPublicKey => "epk",
            Param::PartyUInfo => "apu",
            Param::PartyVInfo => "apv",
            Param::InitializationVector => "iv",
            Param::Tag => "tag",
            Param::PasswordSalt => "p2s",
            Param::PasswordCount => "p2c",
        }
    }

    pub fn from_name(name: &str) -> Option<Param> {
        Param::ALL.iter().copied().find(|param| param.name() == name)
    }

    /// Parameters that only apply to key management and content encryption.
    pub fn is_encryption_only(&self) -> bool {
        matches!(
            self,
            Param::Encryption
                | Param::Deflate
                | Param::EphemeralPublicKey
                | Param::PartyUInfo
                | Param::PartyVInfo
                | Param::InitializationVector
                | Param::Tag
                | Param::PasswordSalt
                | Param::PasswordCount
        )
    }

    /// Whether the parameter must be present when the algorithm uses it.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            Param::Algorithm
                | Param::Encryption
                | Param::EphemeralPublicKey
                | Param::InitializationVector
                | Param::Tag
                | Param::PasswordSalt
                | Param::PasswordCount
        )
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Header members as they appear on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct HeaderFields {
    /// Signature or key management algorithm
    #[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<Algorithm>,

    #[serde(rename = "enc", default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<ContentEncryption>,

    #[serde(rename = "zip", default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    #[serde(rename = "jku", default, skip_serializing_if = "Option::is_none")]
    pub key_set_uri: Option<String>,

    /// Public form of the key that signed or may decrypt
    #[serde(rename = "jwk", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Jwk>,

    #[serde(rename = "x5u", default, skip_serializing_if = "Option::is_none")]
    pub certificate_uri: Option<String>,

    #[serde(rename = "x5c", default, skip_serializing_if = "Option::is_none")]
    pub certificate_chain: Option<Vec<Certificate>>,

    #[serde(
        rename = "x5t",
        default,
        with = "base64url_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_thumbprint: Option<Vec<u8>>,

    #[serde(
        rename = "x5t#S256",
        default,
        with = "base64url_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_sha256_thumbprint: Option<Vec<u8>>,

    #[serde(rename = "typ", default, skip_serializing_if = "Option::is_none")]
    pub header_type: Option<String>,

    #[serde(rename = "cty", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(rename = "crit", default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<Vec<String>>,

    /// Ephemeral public key for ECDH-ES
    #[serde(rename = "epk", default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_public_key: Option<Jwk>,

    #[serde(
        rename = "apu",
        default,
        with = "base64url_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub party_u_info: Option<Vec<u8>>,

    #[serde(
        rename = "apv",
        default,
        with = "base64url_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub party_v_info: Option<Vec<u8>>,

    /// Key wrapping IV for AES-GCM key wrap
    #[serde(
        rename = "iv",
        default,
        with = "base64url_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub initialization_vector: Option<Vec<u8>>,

    /// Key wrapping tag for AES-GCM key wrap
    #[serde(
        rename = "tag",
        default,
        with = "base64url_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub tag: Option<Vec<u8>>,

    #[serde(
        rename = "p2s",
        default,
        with = "base64url_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub password_salt: Option<Vec<u8>>,

    #[serde(rename = "p2c", default, skip_serializing_if = "Option::is_none")]
    pub password_count: Option<u32>,

    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl HeaderFields {
    fn is_present(&self, param: Param) -> bool {
        match param {
            Param::Algorithm => self.algorithm.is_some(),
            Param::KeyId => self.key_id.is_some(),
            Param::KeySetUri => self.key_set_uri.is_some(),
            Param::Key => self.key.is_some(),
            Param::CertificateUri => self.certificate_uri.is_some(),
            Param::CertificateChain => self.certificate_chain.is_some(),
            Param::CertificateThumbprint => self.certificate_thumbprint.is_some(),
            Param::CertificateSha256Thumbprint => self.certificate_sha256_thumbprint.is_some(),
            Param::Type => self.header_type.is_some(),
            Param::ContentType => self.content_type.is_some(),
            Param::CriticalParameters => self.critical.is_some(),
            Param::Encryption => self.encryption.is_some(),
            Param::Deflate => self.compression.is_some(),
            Param::EphemeralPublicKey => self.ephemeral_public_key.is_some(),
            Param::PartyUInfo => self.party_u_info.is_some(),
            Param::PartyVInfo => self.party_v_info.is_some(),
            Param::InitializationVector => self.initialization_vector.is_some(),
            Param::Tag => self.tag.is_some(),
            Param::PasswordSalt => self.password_salt.is_some(),
            Param::PasswordCount => self.password_count.is_some(),
        }
    }

    fn to_json_object(&self) -> Result<Map<String, Value>, Error> {
        match serde_json::to_value(self)? {
            Value::Object(object) => Ok(object),
            _ => bail!(JoseError::InternalError("header is not an object".to_string())),
        }
    }

    fn from_json_object(object: Map<String, Value>) -> Result<Self, Error> {
        Ok(serde_json::from_value(Value::Object(object))?)
    }
}

/// A validated JOSE header.
#[derive(Debug, Clone, PartialEq)]
pub struct Jose {
    algorithm: Algorithm,
    fields: HeaderFields,
}

impl Jose {
    /// Parses a header from its JSON text.
    pub fn parse(json: &str, registry: &ExtensionRegistry) -> Result<Self, Error> {
        let object: Map<String, Value> = serde_json::from_str(json)?;
        Jose::from_json_object(object, registry)
    }

    pub(crate) fn from_json_object(
        object: Map<String, Value>,
        registry: &ExtensionRegistry,
    ) -> Result<Self, Error> {
        Jose::validate(HeaderFields::from_json_object(object)?, registry)
    }

    fn validate(mut fields: HeaderFields, registry: &ExtensionRegistry) -> Result<Self, Error> {
        let algorithm = fields.algorithm.ok_or_else(|| {
            JoseError::illegal_argument("Signature or key protection algorithm is required")
        })?;

        for param in Param::ALL.iter().filter(|p| p.is_encryption_only()) {
            if fields.is_present(*param) {
                ensure!(
                    algorithm.encryption_params().contains(param),
                    JoseError::illegal_argument(format!(
                        "Parameter {} not understood for {}",
                        param, algorithm
                    ))
                );
            }
        }
        if !algorithm.is_signature() {
            ensure!(
                fields.encryption.is_some(),
                JoseError::illegal_argument("Content encryption algorithm is required")
            );
            for param in algorithm.encryption_params() {
                ensure!(
                    !param.is_required() || fields.is_present(*param),
                    JoseError::illegal_argument(format!(
                        "Missing required encryption parameter {}",
                        param
                    ))
                );
            }
        }
        if let Some(compression) = &fields.compression {
            ensure!(
                compression == DEFLATE,
                JoseError::illegal_argument(format!(
                    "Unsupported compression algorithm {}",
                    compression
                ))
            );
        }

        if let Some(critical) = &fields.critical {
            for name in critical {
                match Param::from_name(name) {
                    Some(param) => ensure!(
                        fields.is_present(param),
                        JoseError::illegal_argument(format!(
                            "Missing critical registered parameter {}",
                            name
                        ))
                    ),
                    None => {
                        ensure!(
                            fields.extensions.contains_key(name),
                            JoseError::illegal_argument(format!(
                                "Missing critical extended parameter {}",
                                name
                            ))
                        );
                        registry.require(name)?;
                    }
                }
            }
        }

        if let Some(key) = fields.key.take() {
            if let (Some(kid), Some(key_kid)) = (&fields.key_id, key.key_id()) {
                ensure!(
                    kid == key_kid,
                    JoseError::illegal_argument(format!("Key ID {} doesn't match key", kid))
                );
            }
            fields.key = Some(key.well_known());
        }

        let jose = Jose { algorithm, fields };
        if let (Some(chain), Some(public_key)) = (
            cert::verify(&jose, None)?,
            jose.key().and_then(Jwk::public_key),
        ) {
            if let Some(leaf) = chain.first() {
                ensure!(
                    leaf.public_key()? == *public_key,
                    JoseError::illegal_argument("public key doesn't match X.509 certificate")
                );
            }
        }
        for name in jose.fields.extensions.keys() {
            if let Some(extension) = registry.get(name) {
                extension.verify_header(&jose)?;
            }
        }
        Ok(jose)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn encryption(&self) -> Option<ContentEncryption> {
        self.fields.encryption
    }

    /// Whether the plaintext is DEFLATE compressed (`"zip":"DEF"`).
    pub fn deflate(&self) -> bool {
        self.fields.compression.is_some()
    }

    /// The declared key id, or the id of the attached key.
    pub fn key_id(&self) -> Option<&str> {
        self.fields
            .key_id
            .as_deref()
            .or_else(|| self.key().and_then(Jwk::key_id))
    }

    pub fn key_set_uri(&self) -> Option<&str> {
        self.fields.key_set_uri.as_deref()
    }

    /// The attached key, always in its well-known form.
    pub fn key(&self) -> Option<&Jwk> {
        self.fields.key.as_ref()
    }

    pub fn header_type(&self) -> Option<&str> {
        self.fields.header_type.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.fields.content_type.as_deref()
    }

    pub fn critical_parameters(&self) -> Option<&[String]> {
        self.fields.critical.as_deref()
    }

    pub fn ephemeral_public_key(&self) -> Option<&Jwk> {
        self.fields.ephemeral_public_key.as_ref()
    }

    pub fn party_u_info(&self) -> Option<&[u8]> {
        self.fields.party_u_info.as_deref()
    }

    pub fn party_v_info(&self) -> Option<&[u8]> {
        self.fields.party_v_info.as_deref()
    }

    pub fn initialization_vector(&self) -> Option<&[u8]> {
        self.fields.initialization_vector.as_deref()
    }

    pub fn tag(&self) -> Option<&[u8]> {
        self.fields.tag.as_deref()
    }

    pub fn password_salt(&self) -> Option<&[u8]> {
        self.fields.password_salt.as_deref()
    }

    pub fn password_count(&self) -> Option<u32> {
        self.fields.password_count
    }

    /// Value of an extended (non-registered) parameter.
    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.fields.extensions.get(name)
    }

    /// JSON value of any parameter, registered or extended.
    pub fn param(&self, name: &str) -> Result<Option<Value>, Error> {
        Ok(self.to_json_object()?.remove(name))
    }

    pub fn to_json_object(&self) -> Result<Map<String, Value>, Error> {
        self.fields.to_json_object()
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&self.fields)?)
    }

    /// The key the header designates: the attached `jwk`, else the `kid`
    /// entry of the `jku` key set, else the leaf of the certificate chain.
    ///
    /// Remote references are only followed through `resolver`.
    pub fn well_known(&self, resolver: Option<&Resolver>) -> Result<Option<Jwk>, Error> {
        if let Some(key) = self.key() {
            return Ok(Some(key.clone()));
        }
        if let (Some(uri), Some(kid), Some(resolver)) = (self.key_set_uri(), self.key_id(), resolver)
        {
            let key_set = resolver.key_set(uri)?;
            let key = key_set.find(kid).ok_or_else(|| {
                JoseError::illegal_argument(format!("Key ID {} not found at {}", kid, uri))
            })?;
            return Ok(Some(key.well_known()));
        }
        let chain = match cert::verify(self, resolver)? {
            Some(chain) => chain,
            None => return Ok(None),
        };
        let public_key = match chain.first() {
            Some(leaf) => leaf.public_key()?,
            None => return Ok(None),
        };
        let key = JwkBuilder::new(public_key.key_type())
            .with_public_key(public_key)?
            .with_certificate_chain(chain)
            .build()?;
        Ok(Some(key.well_known()))
    }
}

impl CertificateReference for Jose {
    fn certificate_uri(&self) -> Option<&str> {
        self.fields.certificate_uri.as_deref()
    }

    fn certificate_chain(&self) -> Option<&[Certificate]> {
        self.fields.certificate_chain.as_deref()
    }

    fn certificate_thumbprint(&self) -> Option<&[u8]> {
        self.fields.certificate_thumbprint.as_deref()
    }

    fn certificate_sha256_thumbprint(&self) -> Option<&[u8]> {
        self.fields.certificate_sha256_thumbprint.as_deref()
    }
}

/// Mutable accumulator for a [`Jose`] header.
#[derive(Clone)]
pub struct JoseBuilder {
    fields: HeaderFields,
    registry: ExtensionRegistry,
}

impl JoseBuilder {
    pub fn new(algorithm: Algorithm) -> Self {
        JoseBuilder {
            fields: HeaderFields {
                algorithm: Some(algorithm),
                ..Default::default()
            },
            registry: ExtensionRegistry::default(),
        }
    }

    /// Extensions understood by this header.
    pub fn with_registry(mut self, registry: &ExtensionRegistry) -> Self {
        self.registry = registry.clone();
        self
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.fields.key_id = Some(key_id.into());
        self
    }

    pub fn with_key_set_uri(mut self, uri: impl Into<String>) -> Self {
        self.fields.key_set_uri = Some(uri.into());
        self
    }

    /// Attaches the well-known form of `key`.
    pub fn with_key(mut self, key: &Jwk) -> Self {
        self.fields.key = Some(key.well_known());
        self
    }

    pub fn with_certificate_uri(mut self, uri: impl Into<String>) -> Self {
        self.fields.certificate_uri = Some(uri.into());
        self
    }

    pub fn with_certificate_chain(mut self, chain: Vec<Certificate>) -> Self {
        self.fields.certificate_chain = Some(chain);
        self
    }

    pub fn with_certificate_thumbprint(mut self, sha1: impl Into<Vec<u8>>) -> Self {
        self.fields.certificate_thumbprint = Some(sha1.into());
        self
    }

    pub fn with_certificate_sha256_thumbprint(mut self, sha256: impl Into<Vec<u8>>) -> Self {
        self.fields.certificate_sha256_thumbprint = Some(sha256.into());
        self
    }

    pub fn with_type(mut self, header_type: impl Into<String>) -> Self {
        self.fields.header_type = Some(header_type.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.fields.content_type = Some(content_type.into());
        self
    }

    pub fn with_critical<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.critical = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_encryption(mut self, encryption: ContentEncryption) -> Self {
        self.fields.encryption = Some(encryption);
        self
    }

    /// Requests DEFLATE compression of the plaintext.
    pub fn with_deflate(mut self) -> Self {
        self.fields.compression = Some(DEFLATE.to_string());
        self
    }

    /// Sets any parameter by name. Setting a parameter again with a
    /// different value fails; the same value is accepted.
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Result<Self, Error> {
        let value = value.into();
        let mut object = self.fields.to_json_object()?;
        if let Some(current) = object.get(name) {
            ensure!(
                *current == value,
                JoseError::illegal_state(format!("{} already set", name))
            );
            return Ok(self);
        }
        if Param::from_name(name).is_none() {
            self.registry.require(name)?.validate(&value)?;
        }
        object.insert(name.to_string(), value);
        self.fields = HeaderFields::from_json_object(object)?;
        Ok(self)
    }

    pub(crate) fn algorithm(&self) -> Option<Algorithm> {
        self.fields.algorithm
    }

    pub(crate) fn fields_mut(&mut self) -> &mut HeaderFields {
        &mut self.fields
    }

    pub(crate) fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn build(self) -> Result<Jose, Error> {
        Jose::validate(self.fields, &self.registry)
    }
}
