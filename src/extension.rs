//! Registry of extended (non-registered) JOSE header parameters.
//!
//! Registration is append-only and rare; lookups happen on every header
//! parse. Readers load an immutable snapshot without locking, writers
//! serialize on a mutex and publish a new snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::*;
use crate::header::{Jose, Param};
use crate::jwe::{Jwe, Recipient};
use crate::jws::{Jws, Signature};

/// Handler for an extended header parameter.
///
/// Every method has a permissive default so an extension only implements
/// the checks it cares about.
pub trait Extension: Send + Sync {
    /// Validates a value as it is set on a header builder.
    fn validate(&self, _value: &Value) -> Result<(), Error> {
        Ok(())
    }

    /// Verifies a built or parsed header.
    fn verify_header(&self, _header: &Jose) -> Result<(), Error> {
        Ok(())
    }

    /// Verifies one signature of a signed payload.
    fn verify_signature(&self, _jws: &Jws, _signature: &Signature) -> Result<(), Error> {
        Ok(())
    }

    /// Verifies one recipient of an encrypted message.
    fn verify_recipient(&self, _jwe: &Jwe, _recipient: &Recipient) -> Result<(), Error> {
        Ok(())
    }
}

type Extensions = HashMap<String, Arc<dyn Extension>>;

#[derive(Default)]
struct Inner {
    extensions: ArcSwap<Extensions>,
    write_lock: Mutex<()>,
}

/// Shared, cloneable registry. Clones see the same registrations.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    inner: Arc<Inner>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        ExtensionRegistry::default()
    }

    /// Registers `extension` under `name`, once.
    pub fn register(&self, name: &str, extension: impl Extension + 'static) -> Result<(), Error> {
        ensure!(
            Param::from_name(name).is_none(),
            JoseError::illegal_argument(format!(
                "{} is a registered parameter name",
                name
            ))
        );
        let _guard = self.inner.write_lock.lock();
        let current = self.inner.extensions.load();
        ensure!(
            !current.contains_key(name),
            JoseError::illegal_argument(format!("{} is already registered", name))
        );
        let mut extensions = Extensions::clone(&current);
        extensions.insert(name.to_string(), Arc::new(extension));
        self.inner.extensions.store(Arc::new(extensions));
        tracing::debug!(name, "registered header extension");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.inner.extensions.load().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.extensions.load().contains_key(name)
    }

    /// The extension for `name`, failing when it is not understood.
    pub(crate) fn require(&self, name: &str) -> Result<Arc<dyn Extension>, Error> {
        self.get(name).ok_or_else(|| {
            JoseError::illegal_argument(format!("Extension {} is not understood", name)).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    struct Tenant;

    impl Extension for Tenant {
        fn validate(&self, value: &Value) -> Result<(), Error> {
            ensure!(value.is_string(), JoseError::illegal_argument("tenant must be a string"));
            Ok(())
        }
    }

    #[test]
    fn names_register_once() {
        let registry = ExtensionRegistry::new();
        registry.register("urn:example:tenant", Tenant).unwrap();
        let err = registry.register("urn:example:tenant", Tenant).unwrap_err();
        assert_eq!(err.to_string(), "urn:example:tenant is already registered");
        assert!(registry
            .require("urn:example:tenant")
            .unwrap()
            .validate(&Value::Bool(true))
            .is_err());
        assert!(registry.require("urn:example:other").is_err());
    }

    #[test]
    fn registered_names_are_reserved() {
        let registry = ExtensionRegistry::new();
        for name in ["alg", "kid", "epk", "p2c", "x5t#S256"] {
            assert!(registry.register(name, Tenant).is_err());
        }
    }

    #[test]
    fn clones_share_registrations() {
        let registry = ExtensionRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || registry.register(&format!("ext{}", i % 4), Tenant).is_ok())
            })
            .collect();
        let registered = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(registered, 4);
        assert!((0..4).all(|i| registry.contains(&format!("ext{}", i))));
    }
}
