//! Resolution of remote key material (`jku`, `x5u`).
//!
//! A [`Resolver`] owns one cache per resource kind, keyed by URI. Each URI
//! has its own slot guarded by a mutex, so concurrent lookups of the same
//! URI wait for a single fetch while other URIs proceed independently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use coarsetime::{Duration, Instant};
use parking_lot::Mutex;

use crate::cert::Certificate;
use crate::error::*;
use crate::jwk::Jwks;
use crate::pem::PemCodec;

/// Source of the bytes behind a URI.
///
/// Implementations may block. Timeouts and retries are the implementation's
/// concern; the resolver never retries.
pub trait Fetch: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, Error>;
}

/// In-memory fetcher, mostly useful for tests and preloaded trust material.
#[derive(Default)]
pub struct StaticFetcher {
    resources: HashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        StaticFetcher::default()
    }

    pub fn with(mut self, uri: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(uri.into(), content.into());
        self
    }

    /// Number of successful fetches so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl Fetch for StaticFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, Error> {
        let content = self
            .resources
            .get(uri)
            .cloned()
            .ok_or_else(|| JoseError::ResolutionUnavailable(uri.to_string()))?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(content)
    }
}

impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, Error> {
        (**self).fetch(uri)
    }
}

/// Reads `file:` URIs from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

impl Fetch for FileFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, Error> {
        let path = uri
            .strip_prefix("file://")
            .or_else(|| uri.strip_prefix("file:"))
            .ok_or_else(|| JoseError::ResolutionUnavailable(uri.to_string()))?;
        Ok(std::fs::read(path)?)
    }
}

/// Fetches `http:` and `https:` URIs with a blocking `reqwest` client.
///
/// Non-success statuses are errors, so they are never cached.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

    pub fn new() -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()?;
        Ok(HttpFetcher { client })
    }

    /// Uses a preconfigured client (proxies, timeouts, trust roots).
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        HttpFetcher { client }
    }
}

#[cfg(feature = "http")]
impl Fetch for HttpFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, Error> {
        ensure!(
            uri.starts_with("https://") || uri.starts_with("http://"),
            JoseError::ResolutionUnavailable(uri.to_string())
        );
        let response = self.client.get(uri).send()?.error_for_status()?;
        tracing::debug!(uri, status = %response.status(), "fetched");
        Ok(response.bytes()?.to_vec())
    }
}

/// Fetcher used when none is configured: every URI is unavailable.
struct NoFetcher;

impl Fetch for NoFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, Error> {
        bail!(JoseError::ResolutionUnavailable(uri.to_string()))
    }
}

/// Cache behavior.
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// How long a resolved resource stays cached. `None` keeps it for the
    /// life of the resolver.
    pub cache_ttl: Option<Duration>,
}

struct Cached<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

type Slot<T> = Arc<Mutex<Option<Cached<T>>>>;

/// Read-through, fetch-once cache keyed by URI.
pub(crate) struct UriCache<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
    ttl: Option<Duration>,
}

impl<T> UriCache<T> {
    pub(crate) fn new(ttl: Option<Duration>) -> Self {
        UriCache {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn slot(&self, uri: &str) -> Slot<T> {
        self.slots
            .lock()
            .entry(uri.to_string())
            .or_default()
            .clone()
    }

    pub(crate) fn get_or_fetch(
        &self,
        uri: &str,
        fetch: impl FnOnce() -> Result<T, Error>,
    ) -> Result<Arc<T>, Error> {
        let slot = self.slot(uri);
        let mut entry = slot.lock();
        if let Some(cached) = entry.as_ref() {
            let fresh = match self.ttl {
                Some(ttl) => cached.fetched_at.elapsed() < ttl,
                None => true,
            };
            if fresh {
                tracing::trace!(uri, "cache hit");
                return Ok(cached.value.clone());
            }
        }
        let value = Arc::new(fetch()?);
        *entry = Some(Cached {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }
}

/// Resolves key sets and certificate chains by URI.
///
/// Owned by the caller and shared by reference; a resource is fetched at
/// most once per URI for the cache lifetime.
pub struct Resolver {
    fetcher: Box<dyn Fetch>,
    key_sets: UriCache<Jwks>,
    certificate_chains: UriCache<Vec<Certificate>>,
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new(NoFetcher)
    }
}

impl Resolver {
    pub fn new(fetcher: impl Fetch + 'static) -> Self {
        Resolver::with_options(fetcher, ResolverOptions::default())
    }

    pub fn with_options(fetcher: impl Fetch + 'static, options: ResolverOptions) -> Self {
        Resolver {
            fetcher: Box::new(fetcher),
            key_sets: UriCache::new(options.cache_ttl),
            certificate_chains: UriCache::new(options.cache_ttl),
        }
    }

    fn fetch_text(&self, uri: &str) -> Result<String, Error> {
        tracing::debug!(uri, "fetching remote resource");
        let content = self.fetcher.fetch(uri)?;
        String::from_utf8(content)
            .map_err(|_| JoseError::illegal_argument(format!("{} is not UTF-8 text", uri)).into())
    }

    /// The JSON Web Key Set published at `uri`.
    pub fn key_set(&self, uri: &str) -> Result<Arc<Jwks>, Error> {
        self.key_sets
            .get_or_fetch(uri, || Jwks::parse(&self.fetch_text(uri)?))
    }

    /// The PEM certificate chain published at `uri`, leaf first.
    pub fn certificate_chain(&self, uri: &str) -> Result<Arc<Vec<Certificate>>, Error> {
        self.certificate_chains.get_or_fetch(uri, || {
            PemCodec::certificate_chain_from(&self.fetch_text(uri)?)
        })
    }
}
