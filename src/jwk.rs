//! JSON Web Keys (RFC 7517) and key sets.
//!
//! A [`Jwk`] is immutable once built. Construction goes through
//! [`JwkBuilder`], JSON parsing or PEM import, and each of those paths
//! checks that the material is consistent with the declared type,
//! algorithm, use, operations and certificate chain.

use std::fmt;

use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

use crate::algorithms::jwe::ContentEncryption;
use crate::cert::{self, Certificate, CertificateReference};
use crate::common::SecretBytes;
use crate::encoding::{base64url, from_base64url};
use crate::ephemeral;
use crate::error::*;
use crate::jwa::{format_ops, Algorithm, AlgorithmFamily, KeyType, Operation, Use};
use crate::keys::{PrivateKey, PublicKey, RsaCrt};
use crate::pem::{PemCodec, PemLabel};
use crate::resolver::Resolver;

/// A JSON Web Key.
#[derive(Clone, PartialEq, Eq)]
pub struct Jwk {
    key_type: KeyType,
    key_use: Option<Use>,
    ops: Option<Vec<Operation>>,
    algorithm: Option<Algorithm>,
    key_id: Option<String>,
    public_key: Option<PublicKey>,
    private_key: Option<PrivateKey>,
    secret: Option<SecretBytes>,
    certificate_uri: Option<String>,
    certificate_chain: Option<Vec<Certificate>>,
    certificate_thumbprint: Option<Vec<u8>>,
    certificate_sha256_thumbprint: Option<Vec<u8>>,
}

impl Jwk {
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn key_use(&self) -> Option<Use> {
        self.key_use
    }

    pub fn ops(&self) -> Option<&[Operation]> {
        self.ops.as_deref()
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    /// Symmetric key bytes (`k`).
    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.as_ref().map(SecretBytes::as_bytes)
    }

    /// Parses a single key from its JSON representation.
    pub fn parse(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encodes the key material and certificate chain as PEM.
    pub fn to_pem(&self) -> Result<String, Error> {
        ensure!(
            self.key_type != KeyType::Raw,
            JoseError::illegal_state("Raw keys have no PEM encoding")
        );
        PemCodec::serialize(
            self.private_key.as_ref(),
            self.public_key.as_ref(),
            self.certificate_chain.as_deref().unwrap_or_default(),
        )
    }

    /// A copy safe to publish: private and secret material removed.
    pub fn well_known(&self) -> Jwk {
        Jwk {
            private_key: None,
            secret: None,
            ..self.clone()
        }
    }

    /// Whether `other` designates the same key, for lookups across key
    /// rotation. Every component known on both sides must agree, and
    /// this key's algorithm must accept the other key's type and use. Two
    /// keys sharing an id represent each other even when their material
    /// differs; without a shared id, known public material must match.
    pub fn represents(&self, other: &Jwk) -> bool {
        fn agree<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        if self.key_type != other.key_type
            || !agree(&self.key_id, &other.key_id)
            || !agree(&self.algorithm, &other.algorithm)
            || !agree(&self.key_use, &other.key_use)
            || !agree(&self.ops, &other.ops)
            || !agree(&self.certificate_uri, &other.certificate_uri)
            || !agree(&self.certificate_chain, &other.certificate_chain)
            || !agree(&self.certificate_thumbprint, &other.certificate_thumbprint)
            || !agree(
                &self.certificate_sha256_thumbprint,
                &other.certificate_sha256_thumbprint,
            )
        {
            return false;
        }
        if let Some(alg) = self.algorithm {
            if !alg.key_types().contains(&other.key_type)
                || other.key_use.is_some_and(|key_use| key_use != alg.key_use())
            {
                return false;
            }
        }
        if self.key_id.is_some() && other.key_id.is_some() {
            return true;
        }
        agree(&self.public_material(), &other.public_material())
            && agree(&self.secret, &other.secret)
    }

    /// Declared public key, else the one recovered from the private key.
    fn public_material(&self) -> Option<PublicKey> {
        self.public_key.clone().or_else(|| {
            self.private_key
                .as_ref()
                .and_then(|private_key| private_key.public_key().ok().flatten())
        })
    }

    /// Fully validates the key, resolving `x5u` through `resolver` when
    /// given. Returns the public key, recovered from the private key or the
    /// certificate when the key does not carry one.
    pub fn verify(&self, resolver: Option<&Resolver>) -> Result<Option<PublicKey>, Error> {
        let public_key = self.check_consistency(resolver)?;
        if self.key_type != KeyType::Raw {
            self.check_ops_material(public_key.as_ref())?;
        }
        Ok(public_key)
    }

    fn check_consistency(&self, resolver: Option<&Resolver>) -> Result<Option<PublicKey>, Error> {
        let key_type = self.key_type;
        if let Some(alg) = self.algorithm {
            ensure!(
                alg.key_types().contains(&key_type),
                JoseError::illegal_argument(format!(
                    "Illegal type {} for algorithm {}",
                    key_type, alg
                ))
            );
            if let Some(key_use) = self.key_use {
                ensure!(
                    key_use == alg.key_use(),
                    JoseError::illegal_argument(format!(
                        "Illegal use {} for algorithm {}",
                        key_use, alg
                    ))
                );
            }
        }
        if let Some(ops) = &self.ops {
            self.check_ops(ops)?;
        }

        let leaf = cert::verify(self, resolver)?.and_then(|chain| chain.into_iter().next());

        if key_type == KeyType::Raw {
            ensure!(
                self.private_key.is_none(),
                JoseError::illegal_argument("Unexpected private key")
            );
            ensure!(
                self.public_key.is_none(),
                JoseError::illegal_argument("Unexpected public key")
            );
            ensure!(
                leaf.is_none(),
                JoseError::illegal_argument("Unexpected certificate")
            );
            return Ok(None);
        }
        ensure!(
            self.secret.is_none(),
            JoseError::illegal_argument(format!("Unexpected raw key data for {}", key_type))
        );

        let certified = leaf.map(|leaf| leaf.public_key()).transpose()?;
        let mut public_key = match (&self.public_key, certified) {
            (Some(declared), Some(certified)) => {
                ensure!(
                    *declared == certified,
                    JoseError::illegal_argument("public key doesn't match X.509 certificate")
                );
                Some(certified)
            }
            (declared, certified) => declared.clone().or(certified),
        };

        let spec_mismatch = || JoseError::illegal_argument("parameter spec mismatch");
        if let Some(public_key) = &public_key {
            ensure!(key_type.same_family(public_key.key_type()), spec_mismatch());
        }
        if let Some(private_key) = &self.private_key {
            ensure!(key_type.same_family(private_key.key_type()), spec_mismatch());
        }

        match &self.private_key {
            Some(PrivateKey::Rsa { n, e, .. }) => match &public_key {
                Some(PublicKey::Rsa {
                    n: public_n,
                    e: public_e,
                }) => {
                    ensure!(
                        n == public_n,
                        JoseError::illegal_argument(
                            "RSA public key modulus doesn't match private key"
                        )
                    );
                    ensure!(
                        e == public_e,
                        JoseError::illegal_argument(
                            "RSA public key exponent doesn't match private key"
                        )
                    );
                }
                _ => public_key = Some(PublicKey::rsa(n, e)?),
            },
            Some(private_key) => {
                if let Some(derived) = private_key.public_key()? {
                    match &public_key {
                        Some(public_key) => ensure!(
                            *public_key == derived,
                            JoseError::illegal_argument("public key doesn't match private key")
                        ),
                        None => public_key = Some(derived),
                    }
                }
            }
            None => ensure!(
                public_key.is_some() || self.certificate_uri.is_some(),
                JoseError::illegal_argument("Missing algorithm parameters")
            ),
        }
        Ok(public_key)
    }

    fn check_ops(&self, ops: &[Operation]) -> Result<(), Error> {
        let illegal = |suffix: String| {
            JoseError::illegal_argument(format!("Illegal ops {}{}", format_ops(ops), suffix))
        };
        match ops {
            [a, b] => ensure!(a.complement() == Some(*b), illegal(String::new())),
            [_] | [] => {}
            _ => bail!(illegal(String::new())),
        }
        if let Some(alg) = self.algorithm {
            ensure!(
                ops.iter().all(|op| alg.key_ops().contains(op)),
                illegal(format!(" for algorithm {}", alg))
            );
        }
        if let Some(key_use) = self.key_use {
            let signs = ops.iter().any(Operation::is_signature);
            ensure!(
                signs == (key_use == Use::Sign),
                illegal(format!(" for use {}", key_use))
            );
        }
        Ok(())
    }

    fn check_ops_material(&self, public_key: Option<&PublicKey>) -> Result<(), Error> {
        let ops = match &self.ops {
            Some(ops) => ops,
            None => return Ok(()),
        };
        let has = |op: Operation| ops.contains(&op);
        let required = |what: &str| {
            JoseError::illegal_argument(format!("{} required by ops {}", what, format_ops(ops)))
        };
        ensure!(
            !has(Operation::Encrypt) && !has(Operation::Decrypt),
            required("Secret key")
        );
        ensure!(
            public_key.is_some() || !(has(Operation::WrapKey) || has(Operation::Verify)),
            required("Public key")
        );
        ensure!(
            self.private_key.is_some() || !(has(Operation::UnwrapKey) || has(Operation::Sign)),
            required("Private key")
        );
        ensure!(
            public_key.is_some() || self.private_key.is_some() || !has(Operation::DeriveKey),
            required("Public or private key")
        );
        Ok(())
    }
}

impl CertificateReference for Jwk {
    fn certificate_uri(&self) -> Option<&str> {
        self.certificate_uri.as_deref()
    }

    fn certificate_chain(&self) -> Option<&[Certificate]> {
        self.certificate_chain.as_deref()
    }

    fn certificate_thumbprint(&self) -> Option<&[u8]> {
        self.certificate_thumbprint.as_deref()
    }

    fn certificate_sha256_thumbprint(&self) -> Option<&[u8]> {
        self.certificate_sha256_thumbprint.as_deref()
    }
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("key_type", &self.key_type)
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("key_use", &self.key_use)
            .field("ops", &self.ops)
            .field("public_key", &self.public_key)
            .field("private", &self.private_key.is_some())
            .field("secret", &self.secret.is_some())
            .finish()
    }
}

/// Mutable accumulator for a [`Jwk`].
#[derive(Debug, Clone)]
pub struct JwkBuilder {
    key: Jwk,
}

impl JwkBuilder {
    pub fn new(key_type: KeyType) -> Self {
        JwkBuilder {
            key: Jwk {
                key_type,
                key_use: None,
                ops: None,
                algorithm: None,
                key_id: None,
                public_key: None,
                private_key: None,
                secret: None,
                certificate_uri: None,
                certificate_chain: None,
                certificate_thumbprint: None,
                certificate_sha256_thumbprint: None,
            },
        }
    }

    /// A builder holding freshly generated material for `alg`, with the
    /// algorithm and use already set.
    pub fn ephemeral(alg: Algorithm) -> Result<Self, Error> {
        let key_type = match alg.key_types().first() {
            Some(KeyType::RsaPss) => KeyType::Rsa,
            Some(key_type) => *key_type,
            None => bail!(JoseError::UnsupportedAlgorithm(alg.to_string())),
        };
        let builder = JwkBuilder::new(key_type)
            .with_algorithm(alg)
            .with_use(alg.key_use())?;
        match alg.family() {
            AlgorithmFamily::Pbes2 => bail!(JoseError::UnsupportedAlgorithm(format!(
                "{} keys are passwords and cannot be generated",
                alg
            ))),
            _ if key_type == KeyType::Raw => builder.with_secret(ephemeral::secret(alg, None)?),
            _ => {
                let (private_key, public_key) = ephemeral::key_pair(key_type)?;
                let builder = builder.with_private_key(private_key)?;
                match public_key {
                    Some(public_key) => builder.with_public_key(public_key),
                    None => Ok(builder),
                }
            }
        }
    }

    /// A builder holding a random `dir` key for `enc`.
    pub fn direct(enc: ContentEncryption) -> Result<Self, Error> {
        JwkBuilder::new(KeyType::Raw)
            .with_algorithm(Algorithm::Dir)
            .with_use(Use::Encrypt)?
            .with_secret(ephemeral::content_encryption_key(enc))
    }

    /// A builder initialized from PEM text, typed after the first key or
    /// certificate found.
    pub fn from_pem(text: &str) -> Result<Self, Error> {
        let first = PemCodec::parse(text)
            .next()
            .ok_or_else(|| JoseError::illegal_argument("Not PEM encoded"))??;
        let key_type = match first.label() {
            PemLabel::PrivateKey => first.as_private_key()?.key_type(),
            PemLabel::PublicKey => first.as_public_key()?.key_type(),
            PemLabel::Certificate => first.as_certificate()?.public_key()?.key_type(),
            PemLabel::Crl => bail!(JoseError::illegal_argument("Unexpected X509 CRL")),
        };
        JwkBuilder::new(key_type).with_pem(text)
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key.key_id = Some(key_id.into());
        self
    }

    /// Sets `use`. Repeating the same value is allowed, changing it is not.
    pub fn with_use(mut self, key_use: Use) -> Result<Self, Error> {
        if let Some(current) = self.key.key_use {
            ensure!(
                current == key_use,
                JoseError::illegal_state(format!("Use already set to {}", current))
            );
        }
        self.key.key_use = Some(key_use);
        Ok(self)
    }

    /// Sets `key_ops`, with the same rule as [`JwkBuilder::with_use`].
    pub fn with_ops(mut self, ops: impl Into<Vec<Operation>>) -> Result<Self, Error> {
        let ops = ops.into();
        if let Some(current) = &self.key.ops {
            ensure!(
                *current == ops,
                JoseError::illegal_state(format!("Ops already set to {}", format_ops(current)))
            );
        }
        self.key.ops = Some(ops);
        Ok(self)
    }

    pub fn with_algorithm(mut self, alg: Algorithm) -> Self {
        self.key.algorithm = Some(alg);
        self
    }

    pub fn with_secret(mut self, secret: impl Into<SecretBytes>) -> Result<Self, Error> {
        ensure!(
            self.key.secret.is_none(),
            JoseError::illegal_state("Raw key data already set")
        );
        self.key.secret = Some(secret.into());
        Ok(self)
    }

    pub fn with_public_key(mut self, public_key: PublicKey) -> Result<Self, Error> {
        if let Some(current) = &self.key.public_key {
            ensure!(
                *current == public_key,
                JoseError::illegal_state("Public key already set")
            );
        }
        self.key.public_key = Some(public_key);
        Ok(self)
    }

    pub fn with_private_key(mut self, private_key: PrivateKey) -> Result<Self, Error> {
        ensure!(
            self.key.private_key.is_none(),
            JoseError::illegal_state("Private key has been set")
        );
        self.key.private_key = Some(private_key);
        Ok(self)
    }

    pub fn with_key_pair(self, private_key: PrivateKey, public_key: PublicKey) -> Result<Self, Error> {
        self.with_private_key(private_key)?.with_public_key(public_key)
    }

    pub fn with_certificate_uri(mut self, uri: impl Into<String>) -> Self {
        self.key.certificate_uri = Some(uri.into());
        self
    }

    pub fn with_certificate_chain(mut self, chain: Vec<Certificate>) -> Self {
        self.key.certificate_chain = Some(chain);
        self
    }

    pub fn with_certificate_thumbprint(mut self, sha1: impl Into<Vec<u8>>) -> Self {
        self.key.certificate_thumbprint = Some(sha1.into());
        self
    }

    pub fn with_certificate_sha256_thumbprint(mut self, sha256: impl Into<Vec<u8>>) -> Self {
        self.key.certificate_sha256_thumbprint = Some(sha256.into());
        self
    }

    /// Adds keys and certificates from PEM text. At most one private and
    /// one public key may be present; certificates extend the chain.
    pub fn with_pem(mut self, text: &str) -> Result<Self, Error> {
        let mut seen_private = self.key.private_key.is_some();
        let mut seen_public = self.key.public_key.is_some();
        let mut chain = self.key.certificate_chain.take().unwrap_or_default();
        for entry in PemCodec::parse(text) {
            let entry = entry?;
            match entry.label() {
                PemLabel::PrivateKey => {
                    ensure!(
                        !seen_private,
                        JoseError::illegal_argument("Expected at most one private key")
                    );
                    seen_private = true;
                    self = self.with_private_key(entry.as_private_key()?)?;
                }
                PemLabel::PublicKey => {
                    ensure!(
                        !seen_public,
                        JoseError::illegal_argument("Expected at most one public key")
                    );
                    seen_public = true;
                    self = self.with_public_key(entry.as_public_key()?)?;
                }
                PemLabel::Certificate => chain.push(entry.as_certificate()?),
                PemLabel::Crl => bail!(JoseError::illegal_argument("Unexpected X509 CRL")),
            }
        }
        if !chain.is_empty() {
            self.key.certificate_chain = Some(chain);
        }
        Ok(self)
    }

    /// Validates and freezes the key. A public key recovered from private
    /// material is attached to the result.
    pub fn build(self) -> Result<Jwk, Error> {
        self.finish(None)
    }

    /// Like [`JwkBuilder::build`], resolving `x5u` through `resolver`.
    pub fn build_with(self, resolver: &Resolver) -> Result<Jwk, Error> {
        self.finish(Some(resolver))
    }

    fn finish(self, resolver: Option<&Resolver>) -> Result<Jwk, Error> {
        let mut key = self.key;
        let public_key = key.verify(resolver)?;
        if key.public_key.is_none() && key.private_key.is_some() {
            key.public_key = public_key;
        }
        Ok(key)
    }
}

/// An ordered set of keys (`{"keys":[...]}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    keys: Vec<Jwk>,
}

impl Jwks {
    /// A publishable set: every key is reduced to its well-known form.
    pub fn new(keys: impl IntoIterator<Item = Jwk>) -> Self {
        Jwks {
            keys: keys.into_iter().map(|key| key.well_known()).collect(),
        }
    }

    pub fn parse(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// The set published at `uri`, through the resolver cache.
    pub fn from_uri(uri: &str, resolver: &Resolver) -> Result<std::sync::Arc<Jwks>, Error> {
        resolver.key_set(uri)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// First key with the given id.
    pub fn find(&self, key_id: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.key_id() == Some(key_id))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Jwk> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<'a> IntoIterator for &'a Jwks {
    type Item = &'a Jwk;
    type IntoIter = std::slice::Iter<'a, Jwk>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Wire form of a key: every binary member as base64url text.
#[derive(Default, Serialize, Deserialize)]
struct RawJwk {
    kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crv: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    key_use: Option<Use>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_ops: Option<Vec<Operation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alg: Option<Algorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x5u: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x5c: Option<Vec<Certificate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x5t: Option<String>,
    #[serde(rename = "x5t#S256", default, skip_serializing_if = "Option::is_none")]
    x5t_s256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    qi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    k: Option<String>,
}

fn encode(value: Option<impl AsRef<[u8]>>) -> Result<Option<String>, Error> {
    value.map(base64url).transpose()
}

fn decode(value: &Option<String>) -> Result<Option<Vec<u8>>, Error> {
    value.as_deref().map(from_base64url).transpose()
}

fn require(value: Option<Vec<u8>>) -> Result<Vec<u8>, Error> {
    value.ok_or_else(|| JoseError::illegal_argument("Missing algorithm parameters").into())
}

impl RawJwk {
    fn from_jwk(key: &Jwk) -> Result<Self, Error> {
        let mut raw = RawJwk {
            kty: key.key_type.kty().to_string(),
            crv: key.key_type.crv().map(str::to_string),
            key_use: key.key_use,
            key_ops: key.ops.clone(),
            alg: key.algorithm,
            kid: key.key_id.clone(),
            x5u: key.certificate_uri.clone(),
            x5c: key.certificate_chain.clone(),
            x5t: encode(key.certificate_thumbprint.as_ref())?,
            x5t_s256: encode(key.certificate_sha256_thumbprint.as_ref())?,
            k: encode(key.secret.as_ref())?,
            ..Default::default()
        };
        match &key.public_key {
            Some(PublicKey::Rsa { n, e }) => {
                raw.n = encode(Some(n))?;
                raw.e = encode(Some(e))?;
            }
            Some(PublicKey::Ec { x, y, .. }) => {
                raw.x = encode(Some(x))?;
                raw.y = encode(Some(y))?;
            }
            Some(PublicKey::Okp { x, .. }) => raw.x = encode(Some(x))?,
            None => {}
        }
        match &key.private_key {
            Some(PrivateKey::Rsa { n, e, d, crt }) => {
                raw.n = encode(Some(n))?;
                raw.e = encode(Some(e))?;
                raw.d = encode(Some(d))?;
                if let Some(crt) = crt {
                    raw.p = encode(Some(&crt.p))?;
                    raw.q = encode(Some(&crt.q))?;
                    raw.dp = encode(Some(&crt.dp))?;
                    raw.dq = encode(Some(&crt.dq))?;
                    raw.qi = encode(Some(&crt.qi))?;
                }
            }
            Some(PrivateKey::Ec { d, .. }) | Some(PrivateKey::Okp { d, .. }) => {
                raw.d = encode(Some(d))?
            }
            None => {}
        }
        Ok(raw)
    }

    fn into_jwk(self) -> Result<Jwk, Error> {
        let key_type = KeyType::from_kty_crv(&self.kty, self.crv.as_deref())?;
        let mut key = JwkBuilder::new(key_type).key;
        key.key_use = self.key_use;
        key.ops = self.key_ops.clone();
        key.algorithm = self.alg;
        key.key_id = self.kid.clone();
        key.certificate_uri = self.x5u.clone();
        key.certificate_chain = self.x5c.clone();
        key.certificate_thumbprint = decode(&self.x5t)?;
        key.certificate_sha256_thumbprint = decode(&self.x5t_s256)?;
        key.secret = decode(&self.k)?.map(SecretBytes::new);

        let d = decode(&self.d)?.map(SecretBytes::new);
        if key_type.is_rsa() {
            let (n, e) = (decode(&self.n)?, decode(&self.e)?);
            if let Some(d) = d {
                let crt = [&self.p, &self.q, &self.dp, &self.dq, &self.qi];
                let crt = if crt.iter().all(|v| v.is_some()) {
                    Some(RsaCrt {
                        p: SecretBytes::new(require(decode(&self.p)?)?),
                        q: SecretBytes::new(require(decode(&self.q)?)?),
                        dp: SecretBytes::new(require(decode(&self.dp)?)?),
                        dq: SecretBytes::new(require(decode(&self.dq)?)?),
                        qi: SecretBytes::new(require(decode(&self.qi)?)?),
                    })
                } else {
                    ensure!(crt.iter().all(|v| v.is_none()), JoseError::InvalidKeyPair);
                    None
                };
                key.private_key = Some(PrivateKey::Rsa {
                    n: require(n.clone())?,
                    e: require(e.clone())?,
                    d,
                    crt,
                });
            }
            if let (Some(n), Some(e)) = (n, e) {
                key.public_key = Some(PublicKey::rsa(&n, &e)?);
            }
        } else if key_type.is_ec() {
            if let Some(x) = decode(&self.x)? {
                key.public_key = Some(PublicKey::ec(key_type, &x, &require(decode(&self.y)?)?)?);
            }
            if let Some(d) = d {
                key.private_key = Some(PrivateKey::ec(key_type, d.as_bytes())?);
            }
        } else if key_type.is_okp() {
            if let Some(x) = decode(&self.x)? {
                key.public_key = Some(PublicKey::okp(key_type, &x)?);
            }
            if let Some(d) = d {
                key.private_key = Some(PrivateKey::okp(key_type, d.as_bytes())?);
            }
        } else {
            ensure!(d.is_none(), JoseError::illegal_argument("Unexpected private key"));
            ensure!(
                [&self.n, &self.e, &self.x, &self.y].iter().all(|v| v.is_none()),
                JoseError::illegal_argument("Unexpected public key")
            );
        }

        key.check_consistency(None)?;
        Ok(key)
    }
}

impl Serialize for Jwk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawJwk::from_jwk(self)
            .map_err(ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Jwk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawJwk::deserialize(deserializer)?
            .into_jwk()
            .map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_data::{ANOTHER_CERT_TEXT, CERT_TEXT, EC_PRIVATE_KEY};

    const ED25519_JWK: &str = r#"{"kty":"OKP","crv":"Ed25519","d":"nWGxne_9WmC6hEr0kuwsxERJxWl7MmkZcDusAxyuf2A","x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}"#;

    #[test]
    fn ephemeral_keys_round_trip_through_json() {
        for alg in [
            Algorithm::ES256,
            Algorithm::ES384,
            Algorithm::ES512,
            Algorithm::EdDSA,
            Algorithm::RS256,
            Algorithm::HS256,
            Algorithm::A192KW,
            Algorithm::ECDH_ES,
        ] {
            let key = JwkBuilder::ephemeral(alg)
                .unwrap()
                .with_key_id("k1")
                .build()
                .unwrap();
            let parsed = Jwk::parse(&key.to_json().unwrap()).unwrap();
            assert_eq!(parsed, key, "{}", alg);
            assert_eq!(key.algorithm(), Some(alg));
        }
    }

    #[test]
    fn okp_public_key_is_checked_against_private() {
        let key = Jwk::parse(ED25519_JWK).unwrap();
        assert_eq!(key.key_type(), KeyType::Ed25519);
        assert!(key.verify(None).unwrap().is_some());

        let tampered = ED25519_JWK.replace("11qYAYKx", "21qYAYKx");
        let err = Jwk::parse(&tampered).unwrap_err();
        assert!(err.to_string().contains("public key doesn't match private key"));
    }

    #[test]
    fn well_known_strips_private_material() {
        let key = JwkBuilder::ephemeral(Algorithm::RS256).unwrap().build().unwrap();
        let json = key.well_known().to_json().unwrap();
        for member in ["\"d\"", "\"p\"", "\"q\"", "\"dp\"", "\"dq\"", "\"qi\""] {
            assert!(!json.contains(member), "{}", member);
        }
        assert!(json.contains("\"n\""));

        let secret = JwkBuilder::ephemeral(Algorithm::HS384).unwrap().build().unwrap();
        assert_eq!(secret.secret().unwrap().len(), 48);
        assert!(!secret.well_known().to_json().unwrap().contains("\"k\""));
    }

    #[test]
    fn represents_compares_known_components() {
        let a = JwkBuilder::ephemeral(Algorithm::ES256).unwrap().build().unwrap();
        let b = JwkBuilder::ephemeral(Algorithm::ES256).unwrap().build().unwrap();
        assert!(a.represents(&a.well_known()));
        assert!(a.well_known().represents(&a));
        assert!(!a.represents(&b) && !b.represents(&a));

        let rotated = |alg| {
            JwkBuilder::ephemeral(alg)
                .unwrap()
                .with_key_id("rotating")
                .build()
                .unwrap()
        };
        let (a, b) = (rotated(Algorithm::ES256), rotated(Algorithm::ES256));
        assert!(a.represents(&b) && b.represents(&a));
        let renamed = JwkBuilder::ephemeral(Algorithm::ES256)
            .unwrap()
            .with_key_id("other")
            .build()
            .unwrap();
        assert!(!a.represents(&renamed) && !renamed.represents(&a));
        let retyped = rotated(Algorithm::ES384);
        assert!(!a.represents(&retyped) && !retyped.represents(&a));
    }

    #[test]
    fn absent_id_and_algorithm_match_anything() {
        let key = JwkBuilder::ephemeral(Algorithm::RSA_OAEP)
            .unwrap()
            .with_key_id("enc-1")
            .build()
            .unwrap();
        let bare = JwkBuilder::new(KeyType::Rsa)
            .with_public_key(key.public_key().unwrap().clone())
            .unwrap()
            .build()
            .unwrap();
        assert!(bare.represents(&key));
        assert!(key.represents(&bare));

        let stranger = JwkBuilder::ephemeral(Algorithm::RSA_OAEP).unwrap().build().unwrap();
        assert!(!bare.represents(&stranger) && !stranger.represents(&bare));

        let private_only = JwkBuilder::new(KeyType::Rsa)
            .with_private_key(key.private_key().unwrap().clone())
            .unwrap()
            .build()
            .unwrap();
        assert!(bare.represents(&private_only) && private_only.represents(&bare));
    }

    #[test]
    fn represents_checks_each_direction() {
        let rsa = JwkBuilder::ephemeral(Algorithm::RS256).unwrap().build().unwrap();
        let signing = JwkBuilder::new(KeyType::Rsa)
            .with_algorithm(Algorithm::RS256)
            .with_public_key(rsa.public_key().unwrap().clone())
            .unwrap()
            .build()
            .unwrap();
        let encrypting = JwkBuilder::new(KeyType::Rsa)
            .with_use(Use::Encrypt)
            .unwrap()
            .with_public_key(rsa.public_key().unwrap().clone())
            .unwrap()
            .build()
            .unwrap();
        assert!(!signing.represents(&encrypting));
        assert!(encrypting.represents(&signing));

        let ec = JwkBuilder::ephemeral(Algorithm::ES256).unwrap().build().unwrap();
        let hmac = JwkBuilder::ephemeral(Algorithm::HS256).unwrap().build().unwrap();
        assert!(!ec.represents(&hmac) && !hmac.represents(&ec));
    }

    #[test]
    fn raw_keys_parse_from_rfc_examples() {
        let key = Jwk::parse(r#"{"kty":"oct","k":"GawgguFyGrWKav7AX4VKUg"}"#).unwrap();
        assert_eq!(key.secret().unwrap().len(), 16);
        assert!(key.verify(None).unwrap().is_none());

        let err = Jwk::parse(r#"{"kty":"oct","k":"AAAA","x":"AAAA"}"#).unwrap_err();
        assert!(err.to_string().contains("Unexpected public key"));
    }

    #[test]
    fn algorithm_use_and_ops_are_checked() {
        let rsa = JwkBuilder::ephemeral(Algorithm::RS256).unwrap();
        let err = rsa.clone().with_algorithm(Algorithm::ES256).build().unwrap_err();
        assert_eq!(err.to_string(), "Illegal type RSA for algorithm ES256");

        let public_key = rsa.clone().build().unwrap().public_key().unwrap().clone();
        let err = JwkBuilder::new(KeyType::Rsa)
            .with_algorithm(Algorithm::RS256)
            .with_use(Use::Encrypt)
            .unwrap()
            .with_public_key(public_key)
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Illegal use enc for algorithm RS256");

        let err = rsa
            .clone()
            .with_ops([Operation::Sign, Operation::Encrypt])
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Illegal ops [sign, encrypt]");

        let err = rsa
            .clone()
            .with_ops([Operation::WrapKey])
            .unwrap()
            .build().unwrap_err();
        assert_eq!(err.to_string(), "Illegal ops [wrapKey] for algorithm RS256");

        let key = rsa
            .clone()
            .with_ops([Operation::Sign, Operation::Verify])
            .unwrap()
            .build()
            .unwrap();
        assert!(key.well_known().verify(None).is_err());
        assert!(Jwk::parse(&key.well_known().to_json().unwrap()).is_ok());

        let err = JwkBuilder::new(KeyType::Rsa)
            .with_use(Use::Sign)
            .unwrap()
            .with_ops([Operation::WrapKey])
            .unwrap()
            .with_public_key(key.public_key().unwrap().clone())
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Illegal ops [wrapKey] for use sig");

        let err = JwkBuilder::new(KeyType::Rsa)
            .with_ops([Operation::Sign])
            .unwrap()
            .with_public_key(key.public_key().unwrap().clone())
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Private key required by ops [sign]");

        let err = JwkBuilder::new(KeyType::EcP256)
            .with_ops([Operation::Encrypt])
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing algorithm parameters");
    }

    #[test]
    fn use_and_ops_are_set_once() {
        let builder = JwkBuilder::ephemeral(Algorithm::ES256).unwrap();
        assert!(builder.clone().with_use(Use::Sign).is_ok());
        let err = builder.clone().with_use(Use::Encrypt).unwrap_err();
        assert_eq!(err.to_string(), "Use already set to sig");
        assert!(matches!(
            err.downcast_ref::<JoseError>(),
            Some(JoseError::IllegalState(_))
        ));

        let builder = builder.with_ops([Operation::Sign]).unwrap();
        assert!(builder.clone().with_ops([Operation::Sign]).is_ok());
        let err = builder.with_ops(vec![Operation::Verify]).unwrap_err();
        assert_eq!(err.to_string(), "Ops already set to [sign]");
        assert!(matches!(
            err.downcast_ref::<JoseError>(),
            Some(JoseError::IllegalState(_))
        ));
    }

    #[test]
    fn material_must_fit_the_type() {
        let err = JwkBuilder::new(KeyType::EcP256)
            .with_secret(vec![0u8; 32])
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Unexpected raw key data for EC P-256");

        let ec = JwkBuilder::ephemeral(Algorithm::ES384).unwrap().build().unwrap();
        let err = JwkBuilder::new(KeyType::Raw)
            .with_public_key(ec.public_key().unwrap().clone())
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Unexpected public key");

        let err = JwkBuilder::new(KeyType::EcP256)
            .with_private_key(ec.private_key().unwrap().clone())
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "parameter spec mismatch");

        let err = JwkBuilder::new(KeyType::Raw)
            .with_secret(vec![1u8; 16])
            .unwrap()
            .with_secret(vec![2u8; 16])
            .unwrap_err();
        assert_eq!(err.to_string(), "Raw key data already set");
    }

    #[test]
    fn rsa_private_and_public_must_agree() {
        let a = JwkBuilder::ephemeral(Algorithm::RS256).unwrap().build().unwrap();
        let b = JwkBuilder::ephemeral(Algorithm::RS256).unwrap().build().unwrap();
        let err = JwkBuilder::new(KeyType::Rsa)
            .with_key_pair(
                a.private_key().unwrap().clone(),
                b.public_key().unwrap().clone(),
            )
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "RSA public key modulus doesn't match private key"
        );
    }

    #[test]
    fn pem_keys_are_checked_against_certificates() {
        let text = format!("{}{}", EC_PRIVATE_KEY, ANOTHER_CERT_TEXT);
        let key = JwkBuilder::from_pem(&text)
            .unwrap()
            .with_algorithm(Algorithm::ES384)
            .build()
            .unwrap();
        assert_eq!(key.key_type(), KeyType::EcP384);
        assert_eq!(key.certificate_chain().unwrap().len(), 1);
        let parsed = Jwk::parse(&key.to_json().unwrap()).unwrap();
        assert_eq!(parsed, key);

        let pem = key.to_pem().unwrap();
        let again = JwkBuilder::from_pem(&pem).unwrap().build().unwrap();
        assert_eq!(again.private_key(), key.private_key());

        let text = format!("{}{}", EC_PRIVATE_KEY, CERT_TEXT);
        let err = JwkBuilder::from_pem(&text).unwrap().build().unwrap_err();
        assert_eq!(err.to_string(), "parameter spec mismatch");

        let text = format!("{}{}", EC_PRIVATE_KEY, EC_PRIVATE_KEY);
        let err = JwkBuilder::from_pem(&text).unwrap_err();
        assert_eq!(err.to_string(), "Expected at most one private key");
    }

    #[test]
    fn rsa_keys_without_crt_parameters_still_sign() {
        use crate::extension::ExtensionRegistry;
        use crate::header::JoseBuilder;
        use crate::jws::{Jws, JwsBuilder};

        let full = JwkBuilder::ephemeral(Algorithm::PS256).unwrap().build().unwrap();
        let mut json: serde_json::Value = serde_json::from_str(&full.to_json().unwrap()).unwrap();
        for member in ["p", "q", "dp", "dq", "qi"] {
            json.as_object_mut().unwrap().remove(member);
        }
        let key = Jwk::parse(&json.to_string()).unwrap();
        assert!(matches!(key.private_key(), Some(PrivateKey::Rsa { crt: None, .. })));

        let registry = ExtensionRegistry::new();
        let token = JwsBuilder::new(&registry)
            .compact()
            .next(JoseBuilder::new(Algorithm::PS256).build().unwrap(), &key)
            .sign(b"payload")
            .unwrap()
            .to_compact()
            .unwrap();
        Jws::parse(&token, &registry)
            .unwrap()
            .verify(&full.well_known())
            .unwrap();

        let again = JwkBuilder::from_pem(&key.to_pem().unwrap()).unwrap().build().unwrap();
        assert_eq!(again.public_key(), full.public_key());
    }

    #[test]
    fn certificate_thumbprints_are_verified() {
        let leaf = PemCodec::certificate_chain_from(CERT_TEXT).unwrap().remove(0);
        let key = JwkBuilder::new(KeyType::Rsa)
            .with_certificate_chain(vec![leaf.clone()])
            .with_certificate_sha256_thumbprint(leaf.sha256_thumbprint())
            .build()
            .unwrap();
        assert_eq!(key.verify(None).unwrap(), Some(leaf.public_key().unwrap()));

        let err = JwkBuilder::new(KeyType::Rsa)
            .with_certificate_chain(vec![leaf])
            .with_certificate_thumbprint(vec![0u8; 20])
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Certificate SHA-1 thumbprint mismatch");
    }

    #[test]
    fn key_sets_find_by_id() {
        let keys = (0..3).map(|i| {
            JwkBuilder::ephemeral(Algorithm::ES256)
                .unwrap()
                .with_key_id(format!("key-{}", i))
                .build()
                .unwrap()
        });
        let jwks = Jwks::new(keys);
        assert_eq!(jwks.len(), 3);
        assert!(jwks.iter().all(|key| key.private_key().is_none()));
        let parsed = Jwks::parse(&jwks.to_json().unwrap()).unwrap();
        assert_eq!(parsed, jwks);
        assert_eq!(
            parsed.find("key-1").unwrap().key_id(),
            Some("key-1")
        );
        assert!(parsed.find("key-9").is_none());
    }
}
