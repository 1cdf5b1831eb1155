use std::fmt;

#[allow(unused)]
pub use anyhow::{anyhow, bail, ensure, Error};

#[derive(Debug, thiserror::Error)]
pub enum JoseError {
    #[error("Internal error: [{0}]")]
    InternalError(String),
    #[error("{0}")]
    IllegalArgument(String),
    #[error("{0}")]
    IllegalState(String),
    #[error("Compact encoding error")]
    CompactEncodingError,
    #[error("Header too large")]
    HeaderTooLarge,
    #[error("Token is too long")]
    TokenTooLong,
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Unsupported content encryption algorithm: {0}")]
    UnsupportedContentEncryption(String),
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),
    #[error("Invalid encryption key")]
    InvalidEncryptionKey,
    #[error("Invalid initialization vector")]
    InvalidIV,
    #[error("Invalid authentication tag length")]
    InvalidAuthTagLength,
    #[error("Authentication tag didn't verify")]
    InvalidAuthenticationTag,
    #[error("Key unwrap failed")]
    KeyUnwrapFailed,
    #[error("Weak key")]
    WeakKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid key pair")]
    InvalidKeyPair,
    #[error("Signature tag didn't verify")]
    InvalidSignature,
    #[error("{0} verification failed")]
    VerificationFailed(String),
    #[error("Invalid password-derived key: {0}")]
    InvalidPasswordDerivedKey(String),
    #[error("Inflated content is too large")]
    InflatedContentTooLarge,
    #[error("Remote resolution is not available for {0}")]
    ResolutionUnavailable(String),
}

impl JoseError {
    pub(crate) fn illegal_argument(message: impl Into<String>) -> JoseError {
        JoseError::IllegalArgument(message.into())
    }

    pub(crate) fn illegal_state(message: impl Into<String>) -> JoseError {
        JoseError::IllegalState(message.into())
    }
}

impl From<&str> for JoseError {
    fn from(e: &str) -> JoseError {
        JoseError::InternalError(e.into())
    }
}

/// Outcome of verifying several signatures over the same payload.
///
/// The first failure is the primary error; later failures are kept in
/// the order the signatures appear, so every signature's outcome is
/// visible to the caller.
#[derive(Debug)]
pub struct VerificationErrors {
    primary: Error,
    suppressed: Vec<Error>,
}

impl VerificationErrors {
    pub(crate) fn collect(mut errors: Vec<Error>) -> Option<VerificationErrors> {
        if errors.is_empty() {
            return None;
        }
        let primary = errors.remove(0);
        Some(VerificationErrors {
            primary,
            suppressed: errors,
        })
    }

    /// The first signature failure.
    pub fn primary(&self) -> &Error {
        &self.primary
    }

    /// Failures of the remaining signatures, in order.
    pub fn suppressed(&self) -> &[Error] {
        &self.suppressed
    }
}

impl fmt::Display for VerificationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} more suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for VerificationErrors {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source: &(dyn std::error::Error + 'static) = self.primary.as_ref();
        Some(source)
    }
}
