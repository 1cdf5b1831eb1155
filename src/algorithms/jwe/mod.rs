//! JWE key management and content encryption algorithms (RFC 7518 §4, §5).
//!
//! Each key management family lives in its own module; `jwe` selects
//! between them from the recipient header.

pub(crate) mod aes_gcm_kw;
pub(crate) mod aes_kw;
pub mod content;
pub(crate) mod ecdh_es;
pub(crate) mod pbes2;
pub(crate) mod rsa_oaep;

pub use content::ContentEncryption;
