//! JSON Web Signature (RFC 7515): signing, verification and the compact,
//! general JSON and flattened JSON serializations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::algorithms;
use crate::encoding::{base64url, compact_split, from_base64url};
use crate::error::*;
use crate::extension::ExtensionRegistry;
use crate::header::Jose;
use crate::jwk::Jwk;

/// One signature over a payload, with the header that describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Encoded protected header exactly as signed.
    protected: Option<String>,
    protected_names: Vec<String>,
    header: Jose,
    signature: Vec<u8>,
}

impl Signature {
    fn new(
        protected: Option<(String, Map<String, Value>)>,
        unprotected: Option<Map<String, Value>>,
        signature: Vec<u8>,
        registry: &ExtensionRegistry,
    ) -> Result<Self, Error> {
        let (protected, mut merged) = match protected {
            Some((encoded, object)) => (Some(encoded), object),
            None => (None, Map::new()),
        };
        let protected_names: Vec<String> = merged.keys().cloned().collect();
        for (name, value) in unprotected.into_iter().flatten() {
            match merged.get(&name) {
                Some(current) => ensure!(
                    *current == value,
                    JoseError::illegal_argument(format!("{} must match protected header", name))
                ),
                None => {
                    merged.insert(name, value);
                }
            }
        }
        let header = Jose::from_json_object(merged, registry)?;
        ensure!(
            header.algorithm().is_signature(),
            JoseError::illegal_argument("Not a signature algorithm")
        );
        Ok(Signature {
            protected,
            protected_names,
            header,
            signature,
        })
    }

    pub fn header(&self) -> &Jose {
        &self.header
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The base64url protected header, as it was signed.
    pub fn protected_header(&self) -> Option<&str> {
        self.protected.as_deref()
    }

    /// Header members outside the protected header.
    pub fn unprotected_header(&self) -> Result<Option<Map<String, Value>>, Error> {
        let mut object = self.header.to_json_object()?;
        object.retain(|name, _| !self.protected_names.contains(name));
        Ok(Some(object).filter(|object| !object.is_empty()))
    }

    fn signing_input(protected: Option<&str>, payload: &[u8]) -> Result<String, Error> {
        Ok(format!("{}.{}", protected.unwrap_or_default(), base64url(payload)?))
    }

    /// Verifies this signature over `payload` with `key`.
    pub fn verify(&self, payload: &[u8], key: &Jwk) -> Result<(), Error> {
        let alg = self.header.algorithm();
        let input = Signature::signing_input(self.protected_header(), payload)?;
        algorithms::verify(alg, key, input.as_bytes(), &self.signature).map_err(|err| {
            match err.downcast_ref::<JoseError>() {
                Some(JoseError::IllegalArgument(_)) | Some(JoseError::IllegalState(_)) => err,
                _ => JoseError::VerificationFailed(alg.to_string()).into(),
            }
        })
    }

    fn to_json(&self) -> Result<JsonSignature, Error> {
        Ok(JsonSignature {
            protected: self.protected.clone(),
            header: self.unprotected_header()?,
            signature: base64url(&self.signature)?,
        })
    }
}

/// A payload with one or more signatures.
#[derive(Debug, Clone, PartialEq)]
pub struct Jws {
    payload: Vec<u8>,
    signatures: Vec<Signature>,
}

impl Jws {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Parses compact or JSON (general or flattened) serialization.
    pub fn parse(text: &str, registry: &ExtensionRegistry) -> Result<Self, Error> {
        let text = text.trim();
        let jws = if text.starts_with('{') {
            Jws::parse_json(text, registry)?
        } else {
            Jws::parse_compact(text, registry)?
        };
        jws.verify_extensions(registry)?;
        Ok(jws)
    }

    fn parse_compact(token: &str, registry: &ExtensionRegistry) -> Result<Self, Error> {
        let parts = compact_split(token, 3)?;
        let protected = decode_protected(parts[0])?;
        let payload = from_base64url(parts[1])?;
        let signature = from_base64url(parts[2])?;
        let signature = Signature::new(
            Some((parts[0].to_string(), protected)),
            None,
            signature,
            registry,
        )?;
        Ok(Jws {
            payload,
            signatures: vec![signature],
        })
    }

    fn parse_json(text: &str, registry: &ExtensionRegistry) -> Result<Self, Error> {
        let json: JsonJws = serde_json::from_str(text)?;
        let payload = from_base64url(&json.payload)?;
        let entries = match json.signatures {
            Some(signatures) => {
                ensure!(
                    json.signature.is_none() && json.protected.is_none() && json.header.is_none(),
                    JoseError::illegal_argument("Must not contain both signature and signatures")
                );
                signatures
            }
            None => vec![JsonSignature {
                protected: json.protected,
                header: json.header,
                signature: json.signature.ok_or_else(|| {
                    JoseError::illegal_argument("At least one signature is required")
                })?,
            }],
        };
        ensure!(
            !entries.is_empty(),
            JoseError::illegal_argument("At least one signature is required")
        );
        let signatures = entries
            .into_iter()
            .map(|entry| {
                let protected = match entry.protected {
                    Some(encoded) => {
                        let object = decode_protected(&encoded)?;
                        Some((encoded, object))
                    }
                    None => None,
                };
                Signature::new(
                    protected,
                    entry.header,
                    from_base64url(&entry.signature)?,
                    registry,
                )
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Jws {
            payload,
            signatures,
        })
    }

    fn verify_extensions(&self, registry: &ExtensionRegistry) -> Result<(), Error> {
        for signature in &self.signatures {
            for name in signature.header.to_json_object()?.keys() {
                if let Some(extension) = registry.get(name) {
                    extension.verify_signature(self, signature)?;
                }
            }
        }
        Ok(())
    }

    /// `header.payload.signature`. Only a single signature whose header is
    /// entirely protected can be represented.
    pub fn to_compact(&self) -> Result<String, Error> {
        match self.signatures.as_slice() {
            [signature] if signature.unprotected_header()?.is_none() => Ok(format!(
                "{}.{}",
                Signature::signing_input(signature.protected_header(), &self.payload)?,
                base64url(&signature.signature)?
            )),
            _ => bail!(JoseError::illegal_state(
                "Must have exactly one signature with no unprotected header parameters to use JWS compact serialization"
            )),
        }
    }

    /// JSON serialization: flattened for a single signature, general
    /// otherwise.
    pub fn to_json(&self) -> Result<String, Error> {
        let payload = base64url(&self.payload)?;
        let json = match self.signatures.as_slice() {
            [signature] => {
                let signature = signature.to_json()?;
                JsonJws {
                    payload,
                    signatures: None,
                    protected: signature.protected,
                    header: signature.header,
                    signature: Some(signature.signature),
                }
            }
            signatures => JsonJws {
                payload,
                signatures: Some(
                    signatures
                        .iter()
                        .map(Signature::to_json)
                        .collect::<Result<_, Error>>()?,
                ),
                protected: None,
                header: None,
                signature: None,
            },
        };
        Ok(serde_json::to_string(&json)?)
    }

    /// Verifies every signature with `key`.
    ///
    /// Failures are reported together as [`VerificationErrors`], in
    /// signature order.
    pub fn verify(&self, key: &Jwk) -> Result<(), Error> {
        let errors: Vec<Error> = self
            .signatures
            .iter()
            .filter_map(|signature| signature.verify(&self.payload, key).err())
            .collect();
        match VerificationErrors::collect(errors) {
            Some(errors) => Err(errors.into()),
            None => Ok(()),
        }
    }
}

fn decode_protected(encoded: &str) -> Result<Map<String, Value>, Error> {
    let json = from_base64url(encoded)?;
    serde_json::from_slice(&json)
        .map_err(|_| JoseError::illegal_argument("Protected header is not a JSON object").into())
}

#[derive(Serialize, Deserialize)]
struct JsonSignature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<Map<String, Value>>,
    signature: String,
}

#[derive(Serialize, Deserialize)]
struct JsonJws {
    payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signatures: Option<Vec<JsonSignature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

/// Accumulates signers, then signs a payload once per signer.
pub struct JwsBuilder {
    registry: ExtensionRegistry,
    compact: bool,
    protected: Vec<String>,
    signers: Vec<(Jose, Jwk)>,
}

impl JwsBuilder {
    /// `alg` is always protected.
    pub fn new(registry: &ExtensionRegistry) -> Self {
        JwsBuilder {
            registry: registry.clone(),
            compact: false,
            protected: vec!["alg".to_string()],
            signers: Vec::new(),
        }
    }

    /// Protects every header parameter, for compact serialization.
    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    /// Adds parameter names to the protected header.
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

    /// Adds a signer: its header and the key that signs.
    pub fn next(mut self, header: Jose, key: &Jwk) -> Self {
        self.signers.push((header, key.clone()));
        self
    }

    pub fn sign(self, payload: &[u8]) -> Result<Jws, Error> {
        ensure!(
            !self.signers.is_empty(),
            JoseError::illegal_state("At least one signature is required")
        );
        ensure!(
            !self.compact || self.signers.len() == 1,
            JoseError::illegal_state("Compact serialization allows exactly one signature")
        );
        let mut signatures = Vec::with_capacity(self.signers.len());
        for (header, key) in &self.signers {
            let alg = header.algorithm();
            ensure!(
                alg.is_signature(),
                JoseError::illegal_argument("Not a signature algorithm")
            );
            let mut protected = header.to_json_object()?;
            if !self.compact {
                protected.retain(|name, _| self.protected.contains(name));
            }
            let encoded = base64url(serde_json::to_string(&protected)?)?;
            let input = Signature::signing_input(Some(&encoded), payload)?;
            let signature = algorithms::sign(alg, key, input.as_bytes())?;
            signatures.push(Signature {
                protected: Some(encoded),
                protected_names: protected.keys().cloned().collect(),
                header: header.clone(),
                signature,
            });
        }
        let jws = Jws {
            payload: payload.to_vec(),
            signatures,
        };
        jws.verify_extensions(&self.registry)?;
        Ok(jws)
    }
}
