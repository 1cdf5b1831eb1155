//! PEM armor for certificates, keys and CRLs (RFC 7468).

use std::fmt;
use std::sync::Arc;

use p256::pkcs8::der::pem::{self, LineEnding};
use p256::pkcs8::der::Document;

use crate::cert::Certificate;
use crate::error::*;
use crate::keys::{PrivateKey, PublicKey};
use crate::resolver::Resolver;

const BEGIN: &str = "-----BEGIN ";
const DASHES: &str = "-----";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PemLabel {
    Certificate,
    PrivateKey,
    PublicKey,
    Crl,
}

impl PemLabel {
    pub fn name(&self) -> &'static str {
        match self {
            PemLabel::Certificate => "CERTIFICATE",
            PemLabel::PrivateKey => "PRIVATE KEY",
            PemLabel::PublicKey => "PUBLIC KEY",
            PemLabel::Crl => "X509 CRL",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        [
            PemLabel::Certificate,
            PemLabel::PrivateKey,
            PemLabel::PublicKey,
            PemLabel::Crl,
        ]
        .into_iter()
        .find(|label| label.name() == name)
    }
}

impl fmt::Display for PemLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A DER encoded certificate revocation list.
#[derive(Clone, PartialEq, Eq)]
pub struct Crl(Vec<u8>);

impl Crl {
    pub fn from_der(encoded: &[u8]) -> Result<Self, Error> {
        ensure!(
            Document::try_from(encoded).is_ok(),
            JoseError::illegal_argument("Invalid X.509 CRL")
        );
        Ok(Crl(encoded.to_vec()))
    }

    pub fn to_der(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Crl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crl({} bytes)", self.0.len())
    }
}

/// One decoded PEM block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemEncoded {
    label: PemLabel,
    encoded: Vec<u8>,
}

impl PemEncoded {
    pub fn new(label: PemLabel, encoded: Vec<u8>) -> Self {
        PemEncoded { label, encoded }
    }

    pub fn label(&self) -> PemLabel {
        self.label
    }

    pub fn to_der(&self) -> &[u8] {
        &self.encoded
    }

    fn expect(&self, label: PemLabel) -> Result<(), Error> {
        ensure!(
            self.label == label,
            JoseError::illegal_state(format!("Expected {}, found {}", label, self.label))
        );
        Ok(())
    }

    pub fn as_certificate(&self) -> Result<Certificate, Error> {
        self.expect(PemLabel::Certificate)?;
        Certificate::from_der(&self.encoded)
    }

    pub fn as_private_key(&self) -> Result<PrivateKey, Error> {
        self.expect(PemLabel::PrivateKey)?;
        PrivateKey::from_der(&self.encoded)
    }

    pub fn as_public_key(&self) -> Result<PublicKey, Error> {
        self.expect(PemLabel::PublicKey)?;
        PublicKey::from_der(&self.encoded)
    }

    pub fn as_crl(&self) -> Result<Crl, Error> {
        self.expect(PemLabel::Crl)?;
        Crl::from_der(&self.encoded)
    }

    /// Armored text, wrapped at 64 columns with LF line endings.
    pub fn to_pem(&self) -> Result<String, Error> {
        pem::encode_string(self.label.name(), LineEnding::LF, &self.encoded)
            .map_err(|_| JoseError::illegal_argument("PEM encoding failed").into())
    }
}

/// Lazy sequence of PEM blocks.
///
/// A malformed block is reported when it is reached; blocks before it are
/// still yielded and the sequence ends after the error.
pub struct PemEntries<'a> {
    rest: &'a str,
    done: bool,
}

impl<'a> PemEntries<'a> {
    fn fail(&mut self, message: String) -> Option<Result<PemEncoded, Error>> {
        self.done = true;
        Some(Err(JoseError::IllegalArgument(message).into()))
    }
}

impl<'a> Iterator for PemEntries<'a> {
    type Item = Result<PemEncoded, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let text = self.rest.trim_start();
        if text.is_empty() {
            self.done = true;
            return None;
        }
        let Some(after_begin) = text.strip_prefix(BEGIN) else {
            return self.fail("Not PEM encoded".to_string());
        };
        let Some(label_end) = after_begin.find(DASHES) else {
            return self.fail("Not PEM encoded".to_string());
        };
        let name = &after_begin[..label_end];
        let Some(label) = PemLabel::from_name(name) else {
            return self.fail(format!("Unsupported PEM label {}", name));
        };
        let body_start = &after_begin[label_end + DASHES.len()..];
        let end_marker = format!("-----END {}{}", name, DASHES);
        let Some(body_end) = body_start.find(&end_marker) else {
            return self.fail(format!("Missing {}", end_marker));
        };
        let block_len = text.len() - body_start.len() + body_end + end_marker.len();
        let (block, rest) = text.split_at(block_len);
        self.rest = rest;
        match pem::decode_vec(block.as_bytes()) {
            Ok((_, encoded)) => Some(Ok(PemEncoded::new(label, encoded))),
            Err(_) => self.fail(format!("Malformed {} block", name)),
        }
    }
}

pub struct PemCodec;

impl PemCodec {
    /// Parses PEM text. Each call starts a fresh pass over `text`.
    pub fn parse(text: &str) -> PemEntries<'_> {
        PemEntries {
            rest: text,
            done: false,
        }
    }

    /// Encodes a key pair and optional certificate chain.
    ///
    /// Emits the private key, then the public key when there is neither a
    /// certificate nor an RSA private key to carry it, then the chain.
    pub fn serialize(
        private_key: Option<&PrivateKey>,
        public_key: Option<&PublicKey>,
        chain: &[Certificate],
    ) -> Result<String, Error> {
        let mut public_key = public_key.cloned();
        if let Some(leaf) = chain.first() {
            let certified = leaf.public_key()?;
            match &public_key {
                Some(public_key) => ensure!(
                    *public_key == certified,
                    JoseError::illegal_argument("Public key doesn't match certificate")
                ),
                None => public_key = Some(certified),
            }
        }

        let mut blocks = Vec::new();
        let mut rsa_private = false;
        if let Some(private_key) = private_key {
            blocks.push(PemEncoded::new(PemLabel::PrivateKey, private_key.to_der()?));
            if let PrivateKey::Rsa { n, e, .. } = private_key {
                rsa_private = true;
                if let Some(PublicKey::Rsa { n: public_n, e: public_e }) = &public_key {
                    ensure!(
                        n == public_n && e == public_e,
                        JoseError::illegal_argument("RSA Public key doesn't match private")
                    );
                }
            }
        }
        if chain.is_empty() && !rsa_private {
            if let Some(public_key) = &public_key {
                blocks.push(PemEncoded::new(PemLabel::PublicKey, public_key.to_der()?));
            }
        }
        for certificate in chain {
            blocks.push(PemEncoded::new(
                PemLabel::Certificate,
                certificate.to_der().to_vec(),
            ));
        }
        blocks.iter().map(PemEncoded::to_pem).collect()
    }

    /// Certificate chain published as PEM at `uri`, through the resolver cache.
    pub fn certificate_chain(uri: &str, resolver: &Resolver) -> Result<Arc<Vec<Certificate>>, Error> {
        resolver.certificate_chain(uri)
    }

    /// Decodes a chain of CERTIFICATE blocks; any other label is rejected.
    pub fn certificate_chain_from(text: &str) -> Result<Vec<Certificate>, Error> {
        PemCodec::parse(text)
            .map(|entry| entry?.as_certificate())
            .collect()
    }
}
