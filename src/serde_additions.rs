/// Optional binary members carried as unpadded base64url text (`iv`, `tag`,
/// `apu`, `x5t`, ...).
pub mod base64url_bytes {
    use std::fmt;

    use serde::{
        de::{Error as DeError, Visitor},
        Deserializer, Serializer,
    };

    use crate::encoding::{base64url, from_base64url};

    struct Base64UrlVisitor;

    impl<'de> Visitor<'de> for Base64UrlVisitor {
        type Value = Option<Vec<u8>>;

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            from_base64url(value).map(Some).map_err(E::custom)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_str(self)
        }

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("base64url text")
        }
    }

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => {
                let encoded = base64url(bytes).map_err(serde::ser::Error::custom)?;
                serializer.serialize_str(&encoded)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        deserializer.deserialize_option(Base64UrlVisitor)
    }
}
