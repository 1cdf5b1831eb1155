//! JSON Web Encryption (RFC 7516).
//!
//! A message carries one content encryption key (CEK) shared by every
//! recipient. Each recipient header selects how that key is protected:
//! wrapped, encrypted to a public key, agreed on with ECDH-ES, derived
//! from a password, or used directly.

use std::io::{Read, Write};

use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::algorithms;
use crate::algorithms::jwe::{
    aes_gcm_kw, aes_kw, ecdh_es, ecdh_es::KdfInput, pbes2, rsa_oaep, ContentEncryption,
};
use crate::common::SecretBytes;
use crate::encoding::{base64url, compact_join, compact_split, from_base64url};
use crate::ephemeral;
use crate::error::*;
use crate::extension::ExtensionRegistry;
use crate::header::{HeaderFields, Jose, JoseBuilder, DEFLATE};
use crate::jwa::{Algorithm, AlgorithmFamily};
use crate::jwk::{Jwk, JwkBuilder};

const MAX_HEADER_LENGTH: usize = 8192;

/// Limits applied while parsing and decrypting.
#[derive(Clone, Debug)]
pub struct DecryptionOptions {
    /// Maximum compact serialization length to accept
    pub max_compact_length: Option<usize>,
    /// Maximum encoded protected header length to accept
    pub max_header_length: Option<usize>,
    /// Lowest PBES2 iteration count (`p2c`) to accept
    pub pbes2_min_iterations: u32,
    /// Highest PBES2 iteration count (`p2c`) to accept
    pub pbes2_max_iterations: u32,
    /// Maximum size of DEFLATE compressed content once inflated
    pub max_inflated_length: Option<usize>,
}

impl Default for DecryptionOptions {
    fn default() -> Self {
        DecryptionOptions {
            max_compact_length: None,
            max_header_length: None,
            pbes2_min_iterations: 1000,
            pbes2_max_iterations: 1_000_000,
            max_inflated_length: Some(16 * 1024 * 1024),
        }
    }
}

/// One recipient: its complete header and the encrypted CEK.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    header: Jose,
    per_recipient: Option<Map<String, Value>>,
    encrypted_key: Vec<u8>,
}

impl Recipient {
    /// Protected, shared and per-recipient parameters combined.
    pub fn header(&self) -> &Jose {
        &self.header
    }

    /// Empty for `dir` and `ECDH-ES`.
    pub fn encrypted_key(&self) -> &[u8] {
        &self.encrypted_key
    }

    fn to_json(&self) -> Result<JsonRecipient, Error> {
        Ok(JsonRecipient {
            header: self.per_recipient.clone(),
            encrypted_key: encode_optional(&self.encrypted_key)?,
        })
    }

    /// Recovers the CEK with `key`, without touching the content.
    fn content_encryption_key(
        &self,
        encryption: ContentEncryption,
        key: &Jwk,
        options: &DecryptionOptions,
    ) -> Result<SecretBytes, Error> {
        if let Some(designated) = self.header.well_known(None)? {
            ensure!(
                designated.represents(key),
                JoseError::illegal_argument("Key is not valid for recipient")
            );
        }
        let alg = self.header.algorithm();
        algorithms::check_key_type(alg, key)?;

        let cek = match alg.family() {
            AlgorithmFamily::Direct => {
                self.require_empty_encrypted_key()?;
                let secret = require_secret(alg, key)?;
                ensure!(
                    secret.len() == encryption.key_size(),
                    JoseError::illegal_argument(format!("Invalid key size for {}", encryption))
                );
                secret.to_vec()
            }
            AlgorithmFamily::EcdhEs => {
                self.require_empty_encrypted_key()?;
                let input = self.kdf_input(encryption.name(), encryption.key_size());
                self.agreed_key(key, &input)?.as_bytes().to_vec()
            }
            AlgorithmFamily::EcdhEsKeyWrap => {
                let input = self.kdf_input(alg.name(), alg.size() / 8);
                let kek = self.agreed_key(key, &input)?;
                aes_kw::unwrap_key(kek.as_bytes(), &self.encrypted_key)?
            }
            AlgorithmFamily::AesKeyWrap => {
                aes_kw::unwrap_key(require_secret(alg, key)?, &self.encrypted_key)?
            }
            AlgorithmFamily::AesGcmKeyWrap => aes_gcm_kw::unwrap_key(
                require_secret(alg, key)?,
                &self.encrypted_key,
                self.header.initialization_vector().unwrap_or_default(),
                self.header.tag().unwrap_or_default(),
            )?,
            AlgorithmFamily::RsaKeyEncryption => {
                let private_key = key.private_key().ok_or_else(|| {
                    JoseError::illegal_state(format!("Private key required for {}", alg))
                })?;
                rsa_oaep::decrypt_key(alg, private_key, &self.encrypted_key)?
            }
            AlgorithmFamily::Pbes2 => {
                let kek = pbes2::derive_key(
                    alg,
                    require_secret(alg, key)?,
                    self.header.password_salt().unwrap_or_default(),
                    self.header.password_count().unwrap_or_default(),
                    options.pbes2_min_iterations,
                    options.pbes2_max_iterations,
                )?;
                aes_kw::unwrap_key(kek.as_bytes(), &self.encrypted_key)?
            }
            _ => bail!(JoseError::illegal_argument("Not an encryption algorithm")),
        };
        ensure!(
            cek.len() == encryption.key_size(),
            JoseError::InvalidEncryptionKey
        );
        Ok(SecretBytes::new(cek))
    }

    fn require_empty_encrypted_key(&self) -> Result<(), Error> {
        ensure!(
            self.encrypted_key.is_empty(),
            JoseError::illegal_argument(format!(
                "Encrypted key must be empty for {}",
                self.header.algorithm()
            ))
        );
        Ok(())
    }

    fn kdf_input<'a>(&'a self, algorithm_id: &'a str, key_len: usize) -> KdfInput<'a> {
        KdfInput {
            algorithm_id,
            key_len,
            apu: self.header.party_u_info().unwrap_or_default(),
            apv: self.header.party_v_info().unwrap_or_default(),
        }
    }

    fn agreed_key(&self, key: &Jwk, input: &KdfInput<'_>) -> Result<SecretBytes, Error> {
        let alg = self.header.algorithm();
        let epk = self
            .header
            .ephemeral_public_key()
            .and_then(Jwk::public_key)
            .ok_or_else(|| {
                JoseError::illegal_argument("Missing required encryption parameter epk")
            })?;
        let private_key = key.private_key().ok_or_else(|| {
            JoseError::illegal_state(format!("Private key required for {}", alg))
        })?;
        ecdh_es::recipient_key(private_key, epk, input)
    }
}

fn require_secret(alg: Algorithm, key: &Jwk) -> Result<&[u8], Error> {
    key.secret()
        .ok_or_else(|| JoseError::illegal_state(format!("Secret key required for {}", alg)).into())
}

/// An encrypted message.
#[derive(Debug, Clone, PartialEq)]
pub struct Jwe {
    encryption: ContentEncryption,
    deflate: bool,
    protected: Option<String>,
    unprotected: Option<Map<String, Value>>,
    recipients: Vec<Recipient>,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
    aad: Option<Vec<u8>>,
}

impl Jwe {
    pub fn encryption(&self) -> ContentEncryption {
        self.encryption
    }

    pub fn deflate(&self) -> bool {
        self.deflate
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    /// The base64url protected header, as it was authenticated.
    pub fn protected_header(&self) -> Option<&str> {
        self.protected.as_deref()
    }

    /// Parameters shared by every recipient outside the protected header.
    pub fn unprotected_header(&self) -> Option<&Map<String, Value>> {
        self.unprotected.as_ref()
    }

    pub fn initialization_vector(&self) -> &[u8] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    pub fn additional_data(&self) -> Option<&[u8]> {
        self.aad.as_deref()
    }

    /// Parses compact or JSON (general or flattened) serialization with
    /// default limits.
    pub fn parse(text: &str, registry: &ExtensionRegistry) -> Result<Self, Error> {
        Jwe::parse_with_options(text, registry, &DecryptionOptions::default())
    }

    pub fn parse_with_options(
        text: &str,
        registry: &ExtensionRegistry,
        options: &DecryptionOptions,
    ) -> Result<Self, Error> {
        let text = text.trim();
        let jwe = if text.starts_with('{') {
            Jwe::parse_json(text, registry, options)?
        } else {
            Jwe::parse_compact(text, registry, options)?
        };
        jwe.verify_extensions(registry)?;
        Ok(jwe)
    }

    fn parse_compact(
        token: &str,
        registry: &ExtensionRegistry,
        options: &DecryptionOptions,
    ) -> Result<Self, Error> {
        if let Some(max_length) = options.max_compact_length {
            ensure!(token.len() <= max_length, JoseError::TokenTooLong);
        }
        let parts = compact_split(token, 5)?;
        check_header_length(parts[0], options)?;
        let protected = decode_header(parts[0])?;
        let header = Jose::from_json_object(protected, registry)?;
        let recipient = Recipient {
            header,
            per_recipient: None,
            encrypted_key: from_base64url(parts[1])?,
        };
        Jwe::assemble(
            Some(parts[0].to_string()),
            None,
            vec![recipient],
            from_base64url(parts[2])?,
            from_base64url(parts[3])?,
            from_base64url(parts[4])?,
            None,
        )
    }

    fn parse_json(
        text: &str,
        registry: &ExtensionRegistry,
        options: &DecryptionOptions,
    ) -> Result<Self, Error> {
        let json: JsonJwe = serde_json::from_str(text)?;
        let protected = match &json.protected {
            Some(encoded) => {
                check_header_length(encoded, options)?;
                Some(decode_header(encoded)?)
            }
            None => None,
        };
        let entries = match json.recipients {
            Some(recipients) => {
                ensure!(
                    json.header.is_none() && json.encrypted_key.is_none(),
                    JoseError::illegal_argument("Must not contain both header and recipients")
                );
                recipients
            }
            None => vec![JsonRecipient {
                header: json.header,
                encrypted_key: json.encrypted_key,
            }],
        };
        ensure!(
            !entries.is_empty(),
            JoseError::illegal_argument("At least one recipient is required")
        );

        let mut recipients = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut merged = protected.clone().unwrap_or_default();
            for object in [json.unprotected.as_ref(), entry.header.as_ref()]
                .into_iter()
                .flatten()
            {
                merge_header(&mut merged, object)?;
            }
            recipients.push(Recipient {
                header: Jose::from_json_object(merged, registry)?,
                per_recipient: entry.header,
                encrypted_key: decode_optional(entry.encrypted_key.as_deref())?,
            });
        }
        Jwe::assemble(
            json.protected,
            json.unprotected,
            recipients,
            decode_optional(json.iv.as_deref())?,
            from_base64url(&json.ciphertext)?,
            decode_optional(json.tag.as_deref())?,
            json.aad.as_deref().map(from_base64url).transpose()?,
        )
    }

    fn assemble(
        protected: Option<String>,
        unprotected: Option<Map<String, Value>>,
        recipients: Vec<Recipient>,
        iv: Vec<u8>,
        ciphertext: Vec<u8>,
        tag: Vec<u8>,
        aad: Option<Vec<u8>>,
    ) -> Result<Self, Error> {
        let first = recipients
            .first()
            .map(Recipient::header)
            .ok_or_else(|| JoseError::illegal_argument("At least one recipient is required"))?;
        let encryption = first.encryption().ok_or_else(|| {
            JoseError::illegal_argument("Content encryption algorithm is required")
        })?;
        let deflate = first.deflate();
        for recipient in &recipients {
            let header = recipient.header();
            ensure!(
                !header.algorithm().is_signature(),
                JoseError::illegal_argument("Not an encryption algorithm")
            );
            ensure!(
                header.encryption() == Some(encryption) && header.deflate() == deflate,
                JoseError::illegal_argument("Recipients must agree on enc and zip")
            );
        }
        Ok(Jwe {
            encryption,
            deflate,
            protected,
            unprotected,
            recipients,
            iv,
            ciphertext,
            tag,
            aad,
        })
    }

    fn verify_extensions(&self, registry: &ExtensionRegistry) -> Result<(), Error> {
        for recipient in &self.recipients {
            for name in recipient.header.to_json_object()?.keys() {
                if let Some(extension) = registry.get(name) {
                    extension.verify_recipient(self, recipient)?;
                }
            }
        }
        Ok(())
    }

    /// `ASCII(b64(protected))`, followed by `.b64(aad)` when additional
    /// data is present.
    fn authenticated_data(protected: Option<&str>, aad: Option<&[u8]>) -> Result<Vec<u8>, Error> {
        let mut authenticated = protected.unwrap_or_default().to_string();
        if let Some(aad) = aad {
            authenticated.push('.');
            authenticated.push_str(&base64url(aad)?);
        }
        Ok(authenticated.into_bytes())
    }

    /// Decrypts with `key`.
    ///
    /// Every recipient is tried in turn. When none yields a CEK a random
    /// one is used, so a wrong key surfaces as an authentication failure
    /// like any other tampering.
    pub fn decrypt(&self, key: &Jwk, options: &DecryptionOptions) -> Result<Vec<u8>, Error> {
        let mut cek = None;
        for recipient in &self.recipients {
            let alg = recipient.header.algorithm();
            match recipient.content_encryption_key(self.encryption, key, options) {
                Ok(recovered) => {
                    tracing::debug!(%alg, key_id = ?key.key_id(), "content encryption key recovered");
                    cek = Some(recovered);
                    break;
                }
                Err(err) => {
                    tracing::debug!(%alg, error = %err, "recipient did not yield a content encryption key");
                }
            }
        }
        let cek = cek.unwrap_or_else(|| ephemeral::content_encryption_key(self.encryption));

        let authenticated = Jwe::authenticated_data(self.protected_header(), self.additional_data())?;
        let content = self.encryption.decrypt(
            cek.as_bytes(),
            &self.iv,
            &authenticated,
            &self.ciphertext,
            &self.tag,
        )?;
        if !self.deflate {
            return Ok(content);
        }
        inflate(&content, options.max_inflated_length)
    }

    /// `protected.encrypted_key.iv.ciphertext.tag`, for a single recipient
    /// with every parameter protected and no additional data.
    pub fn to_compact(&self) -> Result<String, Error> {
        match self.recipients.as_slice() {
            [recipient]
                if self.unprotected.is_none()
                    && recipient.per_recipient.is_none()
                    && self.aad.is_none() =>
            {
                Ok(format!(
                    "{}.{}",
                    self.protected.as_deref().unwrap_or_default(),
                    compact_join(&[
                        &recipient.encrypted_key[..],
                        &self.iv,
                        &self.ciphertext,
                        &self.tag,
                    ])?
                ))
            }
            _ => bail!(JoseError::illegal_state(
                "Must have exactly one recipient with no unprotected header parameters, and no additional authentication data to use JWE compact serialization"
            )),
        }
    }

    /// JSON serialization: flattened for a single recipient, general
    /// otherwise.
    pub fn to_json(&self) -> Result<String, Error> {
        let mut json = JsonJwe {
            protected: self.protected.clone(),
            unprotected: self.unprotected.clone(),
            header: None,
            encrypted_key: None,
            recipients: None,
            iv: encode_optional(&self.iv)?,
            ciphertext: base64url(&self.ciphertext)?,
            tag: encode_optional(&self.tag)?,
            aad: self.aad.as_ref().map(base64url).transpose()?,
        };
        match self.recipients.as_slice() {
            [recipient] => {
                let recipient = recipient.to_json()?;
                json.header = recipient.header;
                json.encrypted_key = recipient.encrypted_key;
            }
            recipients => {
                json.recipients = Some(
                    recipients
                        .iter()
                        .map(Recipient::to_json)
                        .collect::<Result<_, Error>>()?,
                );
            }
        }
        Ok(serde_json::to_string(&json)?)
    }
}

fn check_header_length(encoded: &str, options: &DecryptionOptions) -> Result<(), Error> {
    ensure!(
        encoded.len() <= options.max_header_length.unwrap_or(MAX_HEADER_LENGTH),
        JoseError::HeaderTooLarge
    );
    Ok(())
}

fn decode_header(encoded: &str) -> Result<Map<String, Value>, Error> {
    let json = from_base64url(encoded)?;
    serde_json::from_slice(&json)
        .map_err(|_| JoseError::illegal_argument("Protected header is not a JSON object").into())
}

/// Adds `object` to `merged`; a parameter may only repeat with the same
/// value.
fn merge_header(merged: &mut Map<String, Value>, object: &Map<String, Value>) -> Result<(), Error> {
    for (name, value) in object {
        match merged.get(name) {
            Some(current) => ensure!(
                current == value,
                JoseError::illegal_argument(format!("{} must match protected header", name))
            ),
            None => {
                merged.insert(name.clone(), value.clone());
            }
        }
    }
    Ok(())
}

fn encode_optional(bytes: &[u8]) -> Result<Option<String>, Error> {
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(base64url(bytes)?))
}

fn decode_optional(encoded: Option<&str>) -> Result<Vec<u8>, Error> {
    encoded.map(from_base64url).transpose().map(Option::unwrap_or_default)
}

fn deflate(content: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    Ok(encoder.finish()?)
}

fn inflate(content: &[u8], max_length: Option<usize>) -> Result<Vec<u8>, Error> {
    let mut inflated = Vec::new();
    let mut decoder = DeflateDecoder::new(content);
    match max_length {
        Some(max_length) => {
            decoder
                .take(max_length as u64 + 1)
                .read_to_end(&mut inflated)?;
            ensure!(
                inflated.len() <= max_length,
                JoseError::InflatedContentTooLarge
            );
        }
        None => {
            decoder.read_to_end(&mut inflated)?;
        }
    }
    Ok(inflated)
}

#[derive(Serialize, Deserialize)]
struct JsonRecipient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_key: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonJwe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unprotected: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encrypted_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipients: Option<Vec<JsonRecipient>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iv: Option<String>,
    ciphertext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aad: Option<String>,
}

/// Accumulates recipients, then encrypts a payload once for all of them.
pub struct JweBuilder {
    encryption: ContentEncryption,
    deflate: bool,
    compact: bool,
    protected: Vec<String>,
    recipients: Vec<(JoseBuilder, Jwk)>,
    aad: Option<Vec<u8>>,
    registry: ExtensionRegistry,
    cek: Option<SecretBytes>,
    iv: Option<Vec<u8>>,
}

impl JweBuilder {
    pub fn new(encryption: ContentEncryption, registry: &ExtensionRegistry) -> Self {
        JweBuilder {
            encryption,
            deflate: false,
            compact: false,
            protected: Vec::new(),
            recipients: Vec::new(),
            aad: None,
            registry: registry.clone(),
            cek: None,
            iv: None,
        }
    }

    /// Compresses the payload with DEFLATE before encryption.
    pub fn deflate(mut self) -> Self {
        self.deflate = true;
        self
    }

    /// Protects every header parameter, for compact serialization.
    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    /// Moves parameters shared by every recipient into the protected header.
    pub fn protect<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.protected.contains(&name) {
                self.protected.push(name);
            }
        }
        self
    }

    /// Additional authenticated data. Can only be set once.
    pub fn aad(mut self, aad: impl Into<Vec<u8>>) -> Result<Self, Error> {
        ensure!(
            self.aad.is_none(),
            JoseError::illegal_state("Additional authenticated data already set")
        );
        self.aad = Some(aad.into());
        Ok(self)
    }

    /// Adds a recipient: its header, without `enc` or `zip`, and the key the
    /// CEK is protected with.
    pub fn add_recipient(mut self, header: JoseBuilder, key: &Jwk) -> Self {
        self.recipients
            .push((header.with_registry(&self.registry), key.clone()));
        self
    }

    #[cfg(test)]
    pub(crate) fn with_content_encryption_key(mut self, cek: &[u8]) -> Self {
        self.cek = Some(SecretBytes::from_slice(cek));
        self
    }

    #[cfg(test)]
    pub(crate) fn with_initialization_vector(mut self, iv: &[u8]) -> Self {
        self.iv = Some(iv.to_vec());
        self
    }

    pub fn encrypt(self, plaintext: &[u8]) -> Result<Jwe, Error> {
        let encryption = self.encryption;
        ensure!(
            !self.recipients.is_empty(),
            JoseError::illegal_state("At least one recipient is required")
        );
        if self.compact {
            ensure!(
                self.recipients.len() == 1 && self.aad.is_none(),
                JoseError::illegal_state(
                    "Must have exactly one recipient with no unprotected header parameters, and no additional authentication data to use JWE compact serialization"
                )
            );
        }

        let mut pending = Vec::with_capacity(self.recipients.len());
        for (mut header, key) in self.recipients {
            let alg = header.algorithm().ok_or_else(|| {
                JoseError::illegal_argument("Signature or key protection algorithm is required")
            })?;
            ensure!(
                !alg.is_signature(),
                JoseError::illegal_argument(format!("Not an encryption algorithm {}", alg))
            );
            algorithms::check_key_type(alg, &key)?;
            let fields = header.fields_mut();
            fields.encryption = Some(encryption);
            if self.deflate {
                fields.compression = Some(DEFLATE.to_string());
            }
            pending.push((alg, header, key));
        }

        let is_direct = |alg: &Algorithm| {
            matches!(
                alg.family(),
                AlgorithmFamily::Direct | AlgorithmFamily::EcdhEs
            )
        };
        let direct: Vec<usize> = pending
            .iter()
            .enumerate()
            .filter(|(_, (alg, _, _))| is_direct(alg))
            .map(|(i, _)| i)
            .collect();
        ensure!(
            direct.len() <= 1 && (direct.is_empty() || self.cek.is_none()),
            JoseError::illegal_argument(
                "Cannot specify different content encryption keys for multiple recipients"
            )
        );
        let cek = match direct.first() {
            Some(&i) => {
                let (alg, header, key) = &mut pending[i];
                direct_key(*alg, encryption, header.fields_mut(), key)?
            }
            None => self
                .cek
                .unwrap_or_else(|| ephemeral::content_encryption_key(encryption)),
        };

        let mut built = Vec::with_capacity(pending.len());
        for (i, (alg, mut header, key)) in pending.into_iter().enumerate() {
            let encrypted_key = if direct.contains(&i) {
                Vec::new()
            } else {
                wrap_key(alg, header.fields_mut(), &key, cek.as_bytes())?
            };
            let header = header.build()?;
            let object = header.to_json_object()?;
            built.push((header, object, encrypted_key));
        }

        let mut shared = built
            .first()
            .map(|(_, object, _)| object.clone())
            .unwrap_or_default();
        for (_, object, _) in &built[1..] {
            shared.retain(|name, value| object.get(name) == Some(&*value));
        }

        let (protected, unprotected) = if self.compact {
            (shared, Map::new())
        } else {
            let mut protected = Map::new();
            for name in &self.protected {
                let value = shared.remove(name).ok_or_else(|| {
                    JoseError::illegal_argument(format!(
                        "Protected parameter {} must be shared by every recipient",
                        name
                    ))
                })?;
                protected.insert(name.clone(), value);
            }
            (protected, shared)
        };

        let recipients = built
            .into_iter()
            .map(|(header, mut object, encrypted_key)| {
                object.retain(|name, _| {
                    !protected.contains_key(name) && !unprotected.contains_key(name)
                });
                Recipient {
                    header,
                    per_recipient: Some(object).filter(|object| !object.is_empty()),
                    encrypted_key,
                }
            })
            .collect();

        let protected = if protected.is_empty() {
            None
        } else {
            Some(base64url(serde_json::to_string(&protected)?)?)
        };
        let content = if self.deflate {
            deflate(plaintext)?
        } else {
            plaintext.to_vec()
        };
        let authenticated = Jwe::authenticated_data(protected.as_deref(), self.aad.as_deref())?;
        let iv = self.iv.unwrap_or_else(|| encryption.generate_iv());
        let (ciphertext, tag) = encryption.encrypt(cek.as_bytes(), &iv, &authenticated, &content)?;

        let jwe = Jwe {
            encryption,
            deflate: self.deflate,
            protected,
            unprotected: Some(unprotected).filter(|object| !object.is_empty()),
            recipients,
            iv,
            ciphertext,
            tag,
            aad: self.aad,
        };
        jwe.verify_extensions(&self.registry)?;
        Ok(jwe)
    }
}

/// The CEK for `dir` and `ECDH-ES`, where the recipient key determines it.
fn direct_key(
    alg: Algorithm,
    encryption: ContentEncryption,
    fields: &mut HeaderFields,
    key: &Jwk,
) -> Result<SecretBytes, Error> {
    if alg.family() == AlgorithmFamily::Direct {
        let secret = require_secret(alg, key)?;
        ensure!(
            secret.len() == encryption.key_size(),
            JoseError::illegal_argument(format!("Invalid key size for {}", encryption))
        );
        return Ok(SecretBytes::from_slice(secret));
    }
    agree(alg, fields, key, encryption.name(), encryption.key_size())
}

/// Generates `epk` and derives a key of `key_len` bytes with the recipient.
fn agree(
    alg: Algorithm,
    fields: &mut HeaderFields,
    key: &Jwk,
    algorithm_id: &str,
    key_len: usize,
) -> Result<SecretBytes, Error> {
    let public_key = key
        .public_key()
        .ok_or_else(|| JoseError::illegal_state(format!("Public key required for {}", alg)))?;
    let apu = fields.party_u_info.clone().unwrap_or_default();
    let apv = fields.party_v_info.clone().unwrap_or_default();
    let input = KdfInput {
        algorithm_id,
        key_len,
        apu: &apu,
        apv: &apv,
    };
    let (epk, derived) = ecdh_es::sender_key(public_key, &input)?;
    let epk = JwkBuilder::new(epk.key_type())
        .with_public_key(epk)?
        .build()?;
    fields.ephemeral_public_key = Some(epk);
    Ok(derived)
}

/// Protects `cek` for one recipient, recording the parameters the
/// recipient needs to recover it.
fn wrap_key(
    alg: Algorithm,
    fields: &mut HeaderFields,
    key: &Jwk,
    cek: &[u8],
) -> Result<Vec<u8>, Error> {
    match alg.family() {
        AlgorithmFamily::AesKeyWrap => aes_kw::wrap_key(require_secret(alg, key)?, cek),
        AlgorithmFamily::AesGcmKeyWrap => {
            let wrapped = aes_gcm_kw::wrap_key(require_secret(alg, key)?, cek)?;
            fields.initialization_vector = Some(wrapped.iv);
            fields.tag = Some(wrapped.tag);
            Ok(wrapped.encrypted_key)
        }
        AlgorithmFamily::RsaKeyEncryption => {
            let public_key = key.public_key().ok_or_else(|| {
                JoseError::illegal_state(format!("Public key required for {}", alg))
            })?;
            rsa_oaep::encrypt_key(alg, public_key, cek)
        }
        AlgorithmFamily::EcdhEsKeyWrap => {
            let kek = agree(alg, fields, key, alg.name(), alg.size() / 8)?;
            aes_kw::wrap_key(kek.as_bytes(), cek)
        }
        AlgorithmFamily::Pbes2 => {
            let salt = pbes2::generate_salt(alg);
            let count = pbes2::default_count(alg);
            let kek = pbes2::derive_key(alg, require_secret(alg, key)?, &salt, count, count, count)?;
            fields.password_salt = Some(salt);
            fields.password_count = Some(count);
            aes_kw::wrap_key(kek.as_bytes(), cek)
        }
        _ => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::CertificateReference;
    use crate::extension::Extension;
    use crate::jwa::{KeyType, Use};
    use crate::test_data::{ANOTHER_CERT_TEXT, EC_PRIVATE_KEY};

    const MESSAGE: &[u8] = b"The true sign of intelligence is not knowledge but imagination.";

    fn key(alg: Algorithm) -> Jwk {
        JwkBuilder::ephemeral(alg).unwrap().build().unwrap()
    }

    fn password(text: &str) -> Jwk {
        JwkBuilder::new(KeyType::Raw)
            .with_secret(text.as_bytes().to_vec())
            .unwrap()
            .build()
            .unwrap()
    }

    fn encrypt_compact(alg: Algorithm, enc: ContentEncryption, key: &Jwk) -> String {
        JweBuilder::new(enc, &ExtensionRegistry::new())
            .compact()
            .add_recipient(JoseBuilder::new(alg), key)
            .encrypt(MESSAGE)
            .unwrap()
            .to_compact()
            .unwrap()
    }

    #[test]
    fn compact_round_trip_for_every_key_management_family() {
        let registry = ExtensionRegistry::new();
        let options = DecryptionOptions::default();
        for (alg, enc) in [
            (Algorithm::RSA_OAEP, ContentEncryption::A256GCM),
            (Algorithm::RSA_OAEP_256, ContentEncryption::A128CBC_HS256),
            (Algorithm::RSA1_5, ContentEncryption::A128GCM),
            (Algorithm::A128KW, ContentEncryption::A256CBC_HS512),
            (Algorithm::A256GCMKW, ContentEncryption::A192GCM),
            (Algorithm::ECDH_ES, ContentEncryption::A256GCM),
            (Algorithm::ECDH_ES_A192KW, ContentEncryption::A192CBC_HS384),
        ] {
            let key = key(alg);
            let token = encrypt_compact(alg, enc, &key);
            let jwe = Jwe::parse(&token, &registry).unwrap();
            assert_eq!(jwe.encryption(), enc);
            assert_eq!(jwe.decrypt(&key, &options).unwrap(), MESSAGE, "{}", alg);
            assert_eq!(jwe.to_compact().unwrap(), token);
        }
    }

    #[test]
    fn direct_keys_must_match_the_content_encryption() {
        let registry = ExtensionRegistry::new();
        let key = JwkBuilder::direct(ContentEncryption::A128GCM)
            .unwrap()
            .build()
            .unwrap();
        let token = encrypt_compact(Algorithm::Dir, ContentEncryption::A128GCM, &key);
        let jwe = Jwe::parse(&token, &registry).unwrap();
        assert!(jwe.recipients()[0].encrypted_key().is_empty());
        assert_eq!(
            jwe.decrypt(&key, &DecryptionOptions::default()).unwrap(),
            MESSAGE
        );

        let err = JweBuilder::new(ContentEncryption::A256GCM, &registry)
            .add_recipient(JoseBuilder::new(Algorithm::Dir), &key)
            .encrypt(MESSAGE)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid key size for A256GCM");
    }

    #[test]
    fn only_one_recipient_may_determine_the_key() {
        let registry = ExtensionRegistry::new();
        let a = JwkBuilder::direct(ContentEncryption::A256GCM).unwrap().build().unwrap();
        let b = key(Algorithm::ECDH_ES);
        let err = JweBuilder::new(ContentEncryption::A256GCM, &registry)
            .add_recipient(JoseBuilder::new(Algorithm::Dir), &a)
            .add_recipient(JoseBuilder::new(Algorithm::ECDH_ES), &b)
            .encrypt(MESSAGE)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot specify different content encryption keys for multiple recipients"
        );
    }

    #[test]
    fn password_recipients_respect_the_iteration_floor() {
        let registry = ExtensionRegistry::new();
        let secret = password("Thus from my lips, by yours, my sin is purged.");
        let jwe = JweBuilder::new(ContentEncryption::A128CBC_HS256, &registry)
            .add_recipient(JoseBuilder::new(Algorithm::PBES2_HS256_A128KW), &secret)
            .encrypt(MESSAGE)
            .unwrap();
        let header = jwe.recipients()[0].header();
        assert_eq!(header.password_count(), Some(2048));
        assert_eq!(header.password_salt().unwrap().len(), 16);

        let jwe = Jwe::parse(&jwe.to_json().unwrap(), &registry).unwrap();
        assert_eq!(
            jwe.decrypt(&secret, &DecryptionOptions::default()).unwrap(),
            MESSAGE
        );

        let strict = DecryptionOptions {
            pbes2_min_iterations: 4096,
            ..Default::default()
        };
        let err = jwe.recipients()[0]
            .content_encryption_key(jwe.encryption(), &secret, &strict)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid password-derived key: iteration count must be at least 4096"
        );
        assert!(jwe.decrypt(&secret, &strict).is_err());
    }

    #[test]
    fn multiple_recipients_share_one_key() {
        let registry = ExtensionRegistry::new();
        let rsa = JwkBuilder::ephemeral(Algorithm::RSA_OAEP)
            .unwrap()
            .with_key_id("rsa")
            .build()
            .unwrap();
        let aes = JwkBuilder::ephemeral(Algorithm::A256KW)
            .unwrap()
            .with_key_id("aes")
            .build()
            .unwrap();
        let jwe = JweBuilder::new(ContentEncryption::A256GCM, &registry)
            .protect(["enc"])
            .add_recipient(JoseBuilder::new(Algorithm::RSA_OAEP).with_key_id("rsa"), &rsa)
            .add_recipient(JoseBuilder::new(Algorithm::A256KW).with_key_id("aes"), &aes)
            .aad(b"context".to_vec())
            .unwrap()
            .encrypt(MESSAGE)
            .unwrap();
        assert!(jwe.to_compact().is_err());
        assert!(jwe.unprotected_header().is_none());

        let json = jwe.to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["recipients"][1]["header"]["kid"], "aes");
        assert!(value.get("header").is_none());

        let parsed = Jwe::parse(&json, &registry).unwrap();
        let options = DecryptionOptions::default();
        assert_eq!(parsed.additional_data(), Some(&b"context"[..]));
        assert_eq!(parsed.decrypt(&rsa, &options).unwrap(), MESSAGE);
        assert_eq!(parsed.decrypt(&aes, &options).unwrap(), MESSAGE);

        let stranger = key(Algorithm::A256KW);
        let err = parsed.decrypt(&stranger, &options).unwrap_err();
        assert_eq!(err.to_string(), "Authentication tag didn't verify");
    }

    #[test]
    fn shared_parameters_are_the_intersection() {
        let registry = ExtensionRegistry::new();
        let a = key(Algorithm::A128KW);
        let b = key(Algorithm::A128KW);
        let jwe = JweBuilder::new(ContentEncryption::A128GCM, &registry)
            .add_recipient(JoseBuilder::new(Algorithm::A128KW).with_key_id("a"), &a)
            .add_recipient(JoseBuilder::new(Algorithm::A128KW).with_key_id("b"), &b)
            .encrypt(MESSAGE)
            .unwrap();
        let shared = jwe.unprotected_header().unwrap();
        assert_eq!(shared["alg"], "A128KW");
        assert_eq!(shared["enc"], "A128GCM");
        assert!(!shared.contains_key("kid"));
        assert!(jwe.protected_header().is_none());
        let parsed = Jwe::parse(&jwe.to_json().unwrap(), &registry).unwrap();
        assert_eq!(parsed.recipients()[1].header().key_id(), Some("b"));
        assert_eq!(
            parsed.decrypt(&b, &DecryptionOptions::default()).unwrap(),
            MESSAGE
        );
    }

    #[test]
    fn flipped_bits_fail_closed() {
        let registry = ExtensionRegistry::new();
        let key = key(Algorithm::A128KW);
        let token = encrypt_compact(Algorithm::A128KW, ContentEncryption::A128GCM, &key);
        let parts: Vec<&str> = token.split('.').collect();
        for index in 1..5 {
            let mut bytes = from_base64url(parts[index]).unwrap();
            bytes[0] ^= 1;
            let mut tampered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
            tampered[index] = base64url(&bytes).unwrap();
            let jwe = Jwe::parse(&tampered.join("."), &registry).unwrap();
            assert!(jwe.decrypt(&key, &DecryptionOptions::default()).is_err());
        }
    }

    #[test]
    fn compressed_content_is_bounded() {
        let registry = ExtensionRegistry::new();
        let key = key(Algorithm::A256KW);
        let plaintext = vec![b'a'; 4096];
        let jwe = JweBuilder::new(ContentEncryption::A256GCM, &registry)
            .deflate()
            .compact()
            .add_recipient(JoseBuilder::new(Algorithm::A256KW), &key)
            .encrypt(&plaintext)
            .unwrap();
        assert!(jwe.deflate());
        assert!(jwe.ciphertext().len() < plaintext.len());
        assert_eq!(jwe.decrypt(&key, &DecryptionOptions::default()).unwrap(), plaintext);

        let small = DecryptionOptions {
            max_inflated_length: Some(1024),
            ..Default::default()
        };
        let err = jwe.decrypt(&key, &small).unwrap_err();
        assert_eq!(err.to_string(), "Inflated content is too large");
    }

    #[test]
    fn recipients_must_hold_the_designated_key() {
        let registry = ExtensionRegistry::new();
        let key = JwkBuilder::ephemeral(Algorithm::ECDH_ES_A128KW)
            .unwrap()
            .with_key_id("k1")
            .with_use(Use::Encrypt)
            .unwrap()
            .build()
            .unwrap();
        let jwe = JweBuilder::new(ContentEncryption::A128GCM, &registry)
            .add_recipient(JoseBuilder::new(Algorithm::ECDH_ES_A128KW).with_key(&key), &key)
            .encrypt(MESSAGE)
            .unwrap();
        let options = DecryptionOptions::default();
        assert_eq!(jwe.decrypt(&key, &options).unwrap(), MESSAGE);

        let other = JwkBuilder::ephemeral(Algorithm::ECDH_ES_A128KW)
            .unwrap()
            .with_key_id("k2")
            .build()
            .unwrap();
        let err = jwe.recipients()[0]
            .content_encryption_key(jwe.encryption(), &other, &options)
            .unwrap_err();
        assert_eq!(err.to_string(), "Key is not valid for recipient");
    }

    #[test]
    fn published_keys_without_id_or_algorithm_designate_recipients() {
        let registry = ExtensionRegistry::new();
        let options = DecryptionOptions::default();
        let key = key(Algorithm::RSA_OAEP);
        let published = JwkBuilder::new(KeyType::Rsa)
            .with_public_key(key.public_key().unwrap().clone())
            .unwrap()
            .build()
            .unwrap();
        assert!(published.algorithm().is_none() && published.key_id().is_none());
        let jwe = JweBuilder::new(ContentEncryption::A128GCM, &registry)
            .add_recipient(
                JoseBuilder::new(Algorithm::RSA_OAEP).with_key(&published),
                &key,
            )
            .encrypt(MESSAGE)
            .unwrap();
        let parsed = Jwe::parse(&jwe.to_json().unwrap(), &registry).unwrap();
        assert_eq!(parsed.decrypt(&key, &options).unwrap(), MESSAGE);

        let other = JwkBuilder::ephemeral(Algorithm::RSA_OAEP)
            .unwrap()
            .build()
            .unwrap();
        let err = parsed.recipients()[0]
            .content_encryption_key(parsed.encryption(), &other, &options)
            .unwrap_err();
        assert_eq!(err.to_string(), "Key is not valid for recipient");
    }

    #[test]
    fn certificate_chains_designate_recipients() {
        let registry = ExtensionRegistry::new();
        let options = DecryptionOptions::default();
        let certified = JwkBuilder::from_pem(&format!("{}{}", EC_PRIVATE_KEY, ANOTHER_CERT_TEXT))
            .unwrap()
            .build()
            .unwrap();
        let chain = certified.certificate_chain().unwrap().to_vec();
        let jwe = JweBuilder::new(ContentEncryption::A256GCM, &registry)
            .add_recipient(
                JoseBuilder::new(Algorithm::ECDH_ES_A256KW).with_certificate_chain(chain),
                &certified,
            )
            .encrypt(MESSAGE)
            .unwrap();

        let holder = JwkBuilder::from_pem(EC_PRIVATE_KEY)
            .unwrap()
            .with_algorithm(Algorithm::ECDH_ES_A256KW)
            .build()
            .unwrap();
        assert!(holder.certificate_chain().is_none());
        assert_eq!(jwe.decrypt(&holder, &options).unwrap(), MESSAGE);

        let other = JwkBuilder::new(KeyType::EcP384)
            .with_private_key(
                JwkBuilder::ephemeral(Algorithm::ES384)
                    .unwrap()
                    .build()
                    .unwrap()
                    .private_key()
                    .unwrap()
                    .clone(),
            )
            .unwrap()
            .build()
            .unwrap();
        let err = jwe.recipients()[0]
            .content_encryption_key(jwe.encryption(), &other, &options)
            .unwrap_err();
        assert_eq!(err.to_string(), "Key is not valid for recipient");
    }

    #[test]
    fn json_forms_are_exclusive() {
        let registry = ExtensionRegistry::new();
        let text = r#"{"header":{"alg":"A128KW","enc":"A128GCM"},"recipients":[],"ciphertext":""}"#;
        let err = Jwe::parse(text, &registry).unwrap_err();
        assert_eq!(err.to_string(), "Must not contain both header and recipients");

        let options = DecryptionOptions {
            max_compact_length: Some(16),
            ..Default::default()
        };
        let key = key(Algorithm::A128KW);
        let token = encrypt_compact(Algorithm::A128KW, ContentEncryption::A128GCM, &key);
        let err = Jwe::parse_with_options(&token, &registry, &options).unwrap_err();
        assert_eq!(err.to_string(), "Token is too long");
    }

    struct Audit;

    impl Extension for Audit {
        fn verify_recipient(&self, jwe: &Jwe, _recipient: &Recipient) -> Result<(), Error> {
            ensure!(
                jwe.additional_data().is_some(),
                JoseError::illegal_state("audit requires additional data")
            );
            Ok(())
        }
    }

    #[test]
    fn extensions_verify_recipients() {
        let registry = ExtensionRegistry::new();
        registry.register("urn:example:audit", Audit).unwrap();
        let key = key(Algorithm::A128KW);
        let header = || {
            JoseBuilder::new(Algorithm::A128KW)
                .with_registry(&registry)
                .param("urn:example:audit", true)
                .unwrap()
        };
        let err = JweBuilder::new(ContentEncryption::A128GCM, &registry)
            .add_recipient(header(), &key)
            .encrypt(MESSAGE)
            .unwrap_err();
        assert_eq!(err.to_string(), "audit requires additional data");

        let jwe = JweBuilder::new(ContentEncryption::A128GCM, &registry)
            .add_recipient(header(), &key)
            .aad(b"audit".to_vec())
            .unwrap()
            .encrypt(MESSAGE)
            .unwrap();
        let parsed = Jwe::parse(&jwe.to_json().unwrap(), &registry).unwrap();
        assert_eq!(
            parsed.decrypt(&key, &DecryptionOptions::default()).unwrap(),
            MESSAGE
        );
    }
}
