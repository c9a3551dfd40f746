//! Client cache keyed by structurally equal options.
//!
//! # Design
//! One `Client` per distinct client-shaping configuration, kept until
//! `clear` is called, so repeated calls reuse pooled connections. Two
//! callers racing on a cold key may both build a client; `DashMap::entry`
//! makes one of them the stored winner and the loser's client is used once
//! and dropped. Building happens outside any map lock.
//!
//! A miss can read certificate files and build a TLS stack, so the async
//! `client` runs it on tokio's blocking pool. `get_client` is the same lookup
//! for synchronous callers and blocks the calling thread on a miss.
//!
//! Only fields that change the built client are part of the key. Flags the
//! mappers or dispatcher read per call (error-status handling, charset
//! stripping) and per-request AWS signing do not split the cache.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::builder::{Client, ClientConfig, ClientFactory, ReqwestFactory};
use crate::certificates::{CertificateStore, DirectoryStore};
use crate::error::{Result, WebError};
use crate::types::{Authentication, Options};

/// The subset of `Options` that shapes a built client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    authentication: Authentication,
    connection_timeout_seconds: u64,
    follow_redirects: bool,
    allow_invalid_certificate: bool,
    automatic_cookie_handling: bool,
}

impl From<&Options> for ClientKey {
    fn from(options: &Options) -> Self {
        let authentication = match &options.authentication {
            Authentication::AwsSigV4(_) => Authentication::None,
            other => other.clone(),
        };
        Self {
            authentication,
            connection_timeout_seconds: options.connection_timeout_seconds,
            follow_redirects: options.follow_redirects,
            allow_invalid_certificate: options.allow_invalid_certificate,
            automatic_cookie_handling: options.automatic_cookie_handling,
        }
    }
}

/// Memoizes one client per distinct `ClientKey`. Clones share the same map.
#[derive(Clone)]
pub struct ClientCache {
    clients: Arc<DashMap<ClientKey, Arc<Client>>>,
    factory: Arc<dyn ClientFactory>,
    store: Arc<dyn CertificateStore>,
}

impl ClientCache {
    pub fn new(factory: Arc<dyn ClientFactory>, store: Arc<dyn CertificateStore>) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            factory,
            store,
        }
    }

    /// The client already built for `options`, if any.
    pub fn cached(&self, options: &Options) -> Option<Arc<Client>> {
        self.clients
            .get(&ClientKey::from(options))
            .map(|client| Arc::clone(&client))
    }

    /// Like `get_client`, but a miss is built on the blocking pool.
    pub async fn client(&self, options: &Options) -> Result<Arc<Client>> {
        if let Some(client) = self.cached(options) {
            return Ok(client);
        }
        let cache = self.clone();
        let options = options.clone();
        tokio::task::spawn_blocking(move || cache.get_client(&options))
            .await
            .map_err(|e| WebError::Configuration(format!("client build did not complete: {e}")))?
    }

    /// Return the cached client for `options`, building it on first use.
    /// Blocks on a miss.
    pub fn get_client(&self, options: &Options) -> Result<Arc<Client>> {
        if let Some(client) = self.cached(options) {
            return Ok(client);
        }

        let key = ClientKey::from(options);
        debug!("client cache miss; building client");
        let config = ClientConfig::from_options(options, self.store.as_ref())?;
        let client = Arc::new(self.factory.create(config)?);
        Ok(Arc::clone(&self.clients.entry(key).or_insert(client)))
    }

    /// Drop every cached client. The next call builds afresh.
    pub fn clear(&self) {
        self.clients.clear();
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestFactory), Arc::new(DirectoryStore::from_env()))
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("clients", &self.clients.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::types::AwsCredentials;

    #[derive(Default)]
    struct CountingFactory {
        built: AtomicUsize,
    }

    impl ClientFactory for CountingFactory {
        fn create(&self, config: ClientConfig) -> Result<Client> {
            self.built.fetch_add(1, Ordering::SeqCst);
            ReqwestFactory.create(config)
        }
    }

    fn cache() -> (Arc<CountingFactory>, ClientCache) {
        let factory = Arc::new(CountingFactory::default());
        let cache = ClientCache::new(factory.clone(), Arc::new(DirectoryStore::new("/nonexistent")));
        (factory, cache)
    }

    fn aws(region: &str) -> Options {
        Options {
            authentication: Authentication::AwsSigV4(AwsCredentials {
                access_key_id: "AK".to_string(),
                secret_access_key: "SK".to_string(),
                session_token: None,
                service: "execute-api".to_string(),
                region: region.to_string(),
            }),
            ..Options::default()
        }
    }

    #[test]
    fn equal_options_share_one_client() {
        let (factory, cache) = cache();
        let first = cache.get_client(&Options::default()).unwrap();
        let second = cache.get_client(&Options::default().clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_options_build_different_clients() {
        let (factory, cache) = cache();
        let a = cache.get_client(&Options::default()).unwrap();
        let b = cache
            .get_client(&Options {
                follow_redirects: false,
                ..Options::default()
            })
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(factory.built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn per_call_flags_do_not_split_the_cache() {
        let (factory, cache) = cache();
        cache.get_client(&Options::default()).unwrap();
        cache
            .get_client(&Options {
                throw_exception_on_error_response: true,
                allow_invalid_response_content_type_charset: true,
                ..Options::default()
            })
            .unwrap();
        cache.get_client(&aws("eu-west-1")).unwrap();
        cache.get_client(&aws("us-east-1")).unwrap();
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_forces_a_fresh_client() {
        let (factory, cache) = cache();
        let before = cache.get_client(&Options::default()).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        let after = cache.get_client(&Options::default()).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(factory.built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_builds_are_not_cached() {
        let (_factory, cache) = cache();
        let options = Options {
            connection_timeout_seconds: 0,
            ..Options::default()
        };
        assert!(cache.get_client(&options).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_first_use_keeps_a_single_winner() {
        let (_factory, cache) = cache();
        let cache = Arc::new(cache);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_client(&Options::default()).unwrap())
            })
            .collect();
        let clients: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.len(), 1);
        let stored = cache.get_client(&Options::default()).unwrap();
        assert!(clients.iter().any(|c| Arc::ptr_eq(c, &stored)));
    }

    #[derive(Default)]
    struct ThreadRecordingFactory {
        built_on: std::sync::Mutex<Vec<std::thread::ThreadId>>,
    }

    impl ClientFactory for ThreadRecordingFactory {
        fn create(&self, config: ClientConfig) -> Result<Client> {
            self.built_on.lock().unwrap().push(std::thread::current().id());
            ReqwestFactory.create(config)
        }
    }

    #[tokio::test]
    async fn async_miss_is_built_off_the_runtime_thread() {
        let factory = Arc::new(ThreadRecordingFactory::default());
        let cache = ClientCache::new(factory.clone(), Arc::new(DirectoryStore::new("/nonexistent")));
        let runtime_thread = std::thread::current().id();

        let first = cache.client(&Options::default()).await.unwrap();
        let second = cache.client(&Options::default()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let built_on = factory.built_on.lock().unwrap();
        assert_eq!(built_on.len(), 1);
        assert_ne!(built_on[0], runtime_thread);
    }

    #[tokio::test]
    async fn async_miss_reports_build_errors() {
        let (_factory, cache) = cache();
        let options = Options {
            connection_timeout_seconds: 0,
            ..Options::default()
        };
        let err = cache.client(&options).await.unwrap_err();
        assert!(matches!(err, WebError::Configuration(_)));
        assert!(cache.cached(&options).is_none());
    }
}
