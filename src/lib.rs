#![forbid(unsafe_code)]

pub mod algorithms;
pub mod cert;
pub mod common;
pub mod encoding;
pub mod ephemeral;
pub mod error;
pub mod extension;
pub mod header;
pub mod jwa;
pub mod jwe;
pub mod jwk;
pub mod jws;
pub mod keys;
pub mod pem;
pub mod resolver;

mod serde_additions;

#[cfg(test)]
mod test_data;

pub use coarsetime;
pub use serde;
pub use serde_json;

pub mod prelude {
    pub use crate::algorithms::jwe::ContentEncryption;
    pub use crate::cert::{Certificate, CertificateReference};
    pub use crate::common::SecretBytes;
    pub use crate::error::{Error, JoseError, VerificationErrors};
    pub use crate::extension::{Extension, ExtensionRegistry};
    pub use crate::header::{Jose, JoseBuilder, Param};
    pub use crate::jwa::{Algorithm, KeyType, Operation, Use};
    pub use crate::jwe::{DecryptionOptions, Jwe, JweBuilder, Recipient};
    pub use crate::jwk::{Jwk, JwkBuilder, Jwks};
    pub use crate::jws::{Jws, JwsBuilder, Signature};
    pub use crate::keys::{PrivateKey, PublicKey};
    pub use crate::pem::PemCodec;
    pub use crate::resolver::{Fetch, FileFetcher, Resolver, ResolverOptions, StaticFetcher};
    #[cfg(feature = "http")]
    pub use crate::resolver::HttpFetcher;
    pub use coarsetime::{self, Duration};
    pub use serde::{Deserialize, Serialize};
}

#[cfg(test)]
mod tests {
    use crate::encoding::base64url;
    use crate::prelude::*;

    const RFC7516_A1_CEK: [u8; 32] = [
        177, 161, 244, 128, 84, 143, 225, 115, 63, 180, 3, 255, 107, 154, 212, 246, 138, 7, 110,
        91, 112, 46, 34, 105, 47, 130, 203, 46, 122, 234, 64, 252,
    ];
    const RFC7516_A1_IV: [u8; 12] = [227, 197, 117, 252, 2, 219, 233, 68, 180, 225, 77, 219];

    const RFC7516_A3_CEK: [u8; 32] = [
        4, 211, 31, 197, 84, 157, 252, 254, 11, 100, 157, 250, 63, 170, 106, 206, 107, 124, 212,
        45, 111, 107, 9, 219, 200, 177, 0, 240, 143, 156, 44, 207,
    ];
    const RFC7516_A3_IV: [u8; 16] = [
        3, 22, 60, 12, 43, 67, 104, 105, 108, 108, 105, 99, 111, 116, 104, 101,
    ];

    const RFC8037_A4_KEY: &str = r#"{"kty":"OKP","crv":"Ed25519",
        "d":"nWGxne_9WmC6hEr0kuwsxERJxWl7MmkZcDusAxyuf2A",
        "x":"11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}"#;

    #[test]
    fn rfc7516_a1_rsa_oaep_a256gcm() {
        let registry = ExtensionRegistry::new();
        let plaintext = b"The true sign of intelligence is not knowledge but imagination.";
        let key = JwkBuilder::ephemeral(Algorithm::RSA_OAEP)
            .unwrap()
            .build()
            .unwrap();
        let token = JweBuilder::new(ContentEncryption::A256GCM, &registry)
            .compact()
            .with_content_encryption_key(&RFC7516_A1_CEK)
            .with_initialization_vector(&RFC7516_A1_IV)
            .add_recipient(JoseBuilder::new(Algorithm::RSA_OAEP), &key)
            .encrypt(plaintext)
            .unwrap()
            .to_compact()
            .unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts[0], "eyJhbGciOiJSU0EtT0FFUCIsImVuYyI6IkEyNTZHQ00ifQ");
        assert_eq!(parts[2], "48V1_ALb6US04U3b");
        assert_eq!(parts[4], "XFBoMYUZodetZdvTiFvSkQ");

        let jwe = Jwe::parse(&token, &registry).unwrap();
        let decrypted = jwe.decrypt(&key, &DecryptionOptions::default()).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn rfc7516_a3_a128kw_a128cbc_hs256() {
        let registry = ExtensionRegistry::new();
        let key = Jwk::parse(r#"{"kty":"oct","k":"GawgguFyGrWKav7AX4VKUg"}"#).unwrap();
        let token = JweBuilder::new(ContentEncryption::A128CBC_HS256, &registry)
            .compact()
            .with_content_encryption_key(&RFC7516_A3_CEK)
            .with_initialization_vector(&RFC7516_A3_IV)
            .add_recipient(JoseBuilder::new(Algorithm::A128KW), &key)
            .encrypt(b"Live long and prosper.")
            .unwrap()
            .to_compact()
            .unwrap();
        assert_eq!(
            token,
            [
                "eyJhbGciOiJBMTI4S1ciLCJlbmMiOiJBMTI4Q0JDLUhTMjU2In0",
                "6KB707dM9YTIgHtLvtgWQ8mKwboJW3of9locizkDTHzBC2IlrT1oOQ",
                "AxY8DCtDaGlsbGljb3RoZQ",
                "KDlTtXchhZTGufMYmOYGS4HffxPSUrfmqCHXaI9wOGY",
                "U0m_YmjN04DJvceFICbCVQ",
            ]
            .join(".")
        );

        let jwe = Jwe::parse(&token, &registry).unwrap();
        let decrypted = jwe.decrypt(&key, &DecryptionOptions::default()).unwrap();
        assert_eq!(decrypted, b"Live long and prosper.");
    }

    #[test]
    fn rfc8037_a4_ed25519_signature() {
        let registry = ExtensionRegistry::new();
        let key = Jwk::parse(RFC8037_A4_KEY).unwrap();
        let token = JwsBuilder::new(&registry)
            .compact()
            .next(JoseBuilder::new(Algorithm::EdDSA).build().unwrap(), &key)
            .sign(b"Example of Ed25519 signing")
            .unwrap()
            .to_compact()
            .unwrap();
        assert_eq!(
            token,
            "eyJhbGciOiJFZERTQSJ9.RXhhbXBsZSBvZiBFZDI1NTE5IHNpZ25pbmc.hgyY0il_MGCjP0JzlnLWG1PPOt7-09PGcvMg3AIbQR6dWbhijcNR4ki4iylGjg5BhVsPt9g7sVvpAr_MuM0KAg"
        );

        let jws = Jws::parse(&token, &registry).unwrap();
        jws.verify(&key.well_known()).unwrap();
    }

    #[test]
    fn published_key_set_verifies_signatures() {
        let registry = ExtensionRegistry::new();
        let signer = JwkBuilder::ephemeral(Algorithm::ES384)
            .unwrap()
            .with_key_id("2026-10")
            .build()
            .unwrap();
        let header = JoseBuilder::new(Algorithm::ES384)
            .with_key_id("2026-10")
            .with_key_set_uri("https://issuer.example/jwks.json")
            .with_type("JWT")
            .build()
            .unwrap();
        let token = JwsBuilder::new(&registry)
            .compact()
            .next(header, &signer)
            .sign(br#"{"sub":"alice"}"#)
            .unwrap()
            .to_compact()
            .unwrap();

        let jwks = Jwks::new([signer.clone()]);
        let fetcher = StaticFetcher::default()
            .with("https://issuer.example/jwks.json", jwks.to_json().unwrap());
        let resolver = Resolver::new(fetcher);

        let jws = Jws::parse(&token, &registry).unwrap();
        let header = jws.signatures()[0].header();
        assert_eq!(header.header_type(), Some("JWT"));
        let key = header.well_known(Some(&resolver)).unwrap().unwrap();
        assert!(key.private_key().is_none());
        assert!(key.represents(&signer));
        jws.verify(&key).unwrap();
    }

    #[test]
    fn sign_then_encrypt() {
        let registry = ExtensionRegistry::new();
        let signer = JwkBuilder::ephemeral(Algorithm::PS256)
            .unwrap()
            .build()
            .unwrap();
        let recipient = JwkBuilder::ephemeral(Algorithm::ECDH_ES_A256KW)
            .unwrap()
            .build()
            .unwrap();
        let signed = JwsBuilder::new(&registry)
            .compact()
            .next(JoseBuilder::new(Algorithm::PS256).build().unwrap(), &signer)
            .sign(b"nested payload")
            .unwrap()
            .to_compact()
            .unwrap();
        let encrypted = JweBuilder::new(ContentEncryption::A256CBC_HS512, &registry)
            .deflate()
            .add_recipient(
                JoseBuilder::new(Algorithm::ECDH_ES_A256KW)
                    .with_content_type("JWT")
                    .param("apu", base64url(b"Alice").unwrap())
                    .unwrap(),
                &recipient,
            )
            .encrypt(signed.as_bytes())
            .unwrap()
            .to_json()
            .unwrap();

        let jwe = Jwe::parse(&encrypted, &registry).unwrap();
        assert_eq!(jwe.recipients()[0].header().party_u_info(), Some(&b"Alice"[..]));
        let inner = jwe
            .decrypt(&recipient, &DecryptionOptions::default())
            .unwrap();
        let jws = Jws::parse(std::str::from_utf8(&inner).unwrap(), &registry).unwrap();
        assert_eq!(jws.payload(), b"nested payload");
        jws.verify(&signer.well_known()).unwrap();
    }
}
