//! Lazy, memoizing dependency container.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::di::ServiceKey;

/// A resolved dependency.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Error type returned by constructors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Constructor =
    Box<dyn Fn(DependencyContainer) -> BoxFuture<'static, Result<Instance, BoxError>> + Send + Sync>;

type Resolution = Result<Instance, ContainerError>;

/// Container misuse and construction failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContainerError {
    #[error("service '{0}' is already registered")]
    DuplicateKey(ServiceKey),

    #[error("no service registered under '{0}'")]
    UnknownKey(ServiceKey),

    #[error("service '{key}' is not a {expected}")]
    TypeMismatch {
        key: ServiceKey,
        expected: &'static str,
    },

    #[error("container is sealed, cannot register '{0}'")]
    Sealed(ServiceKey),

    #[error("constructing '{key}' failed: {message}")]
    Construction { key: ServiceKey, message: String },
}

struct Entry {
    /// `None` for entries registered as ready instances.
    constructor: Option<Constructor>,
    /// Holds the memoized result. `get_or_init` guarantees a single
    /// initializer runs even under concurrent callers.
    cell: OnceCell<Resolution>,
}

#[derive(Default)]
struct Inner {
    entries: DashMap<ServiceKey, Arc<Entry>>,
    sealed: AtomicBool,
}

/// Registry of service dependencies.
///
/// Cloning is cheap and every clone refers to the same registry. Entries move
/// from registered to resolved and never go back; there is no overwrite or
/// removal. After [`seal`](Self::seal) the set of keys is frozen.
#[derive(Clone, Default)]
pub struct DependencyContainer {
    inner: Arc<Inner>,
}

impl DependencyContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lazy constructor.
    ///
    /// The constructor receives a handle to this container so it can resolve
    /// its own dependencies. It runs at most once, on the first [`get`](Self::get).
    pub fn register<T, F, Fut>(&self, key: ServiceKey, constructor: F) -> Result<(), ContainerError>
    where
        T: Any + Send + Sync,
        F: Fn(DependencyContainer) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    {
        let constructor: Constructor = Box::new(move |container| {
            let fut = constructor(container);
            Box::pin(async move { fut.await.map(|value| Arc::new(value) as Instance) })
        });

        self.insert(
            key,
            Entry {
                constructor: Some(constructor),
                cell: OnceCell::new(),
            },
        )
    }

    /// Register an already-built instance.
    pub fn register_instance<T>(&self, key: ServiceKey, value: T) -> Result<(), ContainerError>
    where
        T: Any + Send + Sync,
    {
        let instance: Instance = Arc::new(value);
        self.insert(
            key,
            Entry {
                constructor: None,
                cell: OnceCell::from(Ok(instance)),
            },
        )
    }

    fn insert(&self, key: ServiceKey, entry: Entry) -> Result<(), ContainerError> {
        if self.is_sealed() {
            return Err(ContainerError::Sealed(key));
        }
        match self.inner.entries.entry(key) {
            MapEntry::Occupied(existing) => Err(ContainerError::DuplicateKey(existing.key().clone())),
            MapEntry::Vacant(slot) => {
                tracing::debug!(key = %slot.key(), "Service registered");
                slot.insert(Arc::new(entry));
                Ok(())
            }
        }
    }

    /// Resolve `key`, running its constructor on first use.
    ///
    /// A failed construction is cached like a success: later callers get the
    /// same error and the constructor is not retried.
    pub async fn get(&self, key: &ServiceKey) -> Result<Instance, ContainerError> {
        let entry = self
            .inner
            .entries
            .get(key)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ContainerError::UnknownKey(key.clone()))?;

        entry
            .cell
            .get_or_init(|| async {
                let Some(constructor) = entry.constructor.as_ref() else {
                    return Err(ContainerError::UnknownKey(key.clone()));
                };
                match constructor(self.clone()).await {
                    Ok(instance) => {
                        tracing::debug!(key = %key, "Service resolved");
                        Ok(instance)
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Service construction failed");
                        Err(ContainerError::Construction {
                            key: key.clone(),
                            message: e.to_string(),
                        })
                    }
                }
            })
            .await
            .clone()
    }

    /// Resolve `key` and downcast the instance to `T`.
    ///
    /// Trait objects are stored as `Arc<dyn Trait>` and retrieved with
    /// `get_as::<Arc<dyn Trait>>`.
    pub async fn get_as<T>(&self, key: &ServiceKey) -> Result<T, ContainerError>
    where
        T: Any + Send + Sync + Clone,
    {
        let instance = self.get(key).await?;
        instance
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ContainerError::TypeMismatch {
                key: key.clone(),
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Whether `key` has been resolved (successfully or not).
    pub fn is_resolved(&self, key: &ServiceKey) -> bool {
        self.inner
            .entries
            .get(key)
            .map(|e| e.cell.initialized())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Freeze the key set. Called once bootstrap has completed.
    pub fn seal(&self) {
        if !self.inner.sealed.swap(true, Ordering::AcqRel) {
            tracing::debug!(entries = self.len(), "Dependency container sealed");
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.sealed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for DependencyContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyContainer")
            .field("entries", &self.len())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const DB: ServiceKey = ServiceKey::from_static("db");
    const REPO: ServiceKey = ServiceKey::from_static("repo");

    #[tokio::test]
    async fn test_unknown_key() {
        let container = DependencyContainer::new();
        let err = container.get(&DB).await.unwrap_err();
        assert_eq!(err, ContainerError::UnknownKey(DB));
    }

    #[tokio::test]
    async fn test_duplicate_key() {
        let container = DependencyContainer::new();
        container.register_instance(DB, 1u32).unwrap();
        let err = container
            .register(DB, |_| async { Ok::<_, BoxError>(2u32) })
            .unwrap_err();
        assert_eq!(err, ContainerError::DuplicateKey(DB));
        assert_eq!(container.get_as::<u32>(&DB).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_constructor_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let container = DependencyContainer::new();
        let c = calls.clone();
        container
            .register(DB, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(String::from("postgres://"))
                }
            })
            .unwrap();

        assert!(!container.is_resolved(&DB));
        let a = container.get(&DB).await.unwrap();
        let b = container.get(&DB).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(container.is_resolved(&DB));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_construction_error_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let container = DependencyContainer::new();
        let c = calls.clone();
        container
            .register(DB, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, BoxError>("connection refused".into())
                }
            })
            .unwrap();

        let first = container.get(&DB).await.unwrap_err();
        let second = container.get(&DB).await.unwrap_err();
        assert_eq!(first, second);
        assert!(matches!(first, ContainerError::Construction { ref message, .. } if message == "connection refused"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_constructor_resolves_dependencies() {
        let container = DependencyContainer::new();
        container.register_instance(DB, String::from("db-handle")).unwrap();
        container
            .register(REPO, |c: DependencyContainer| async move {
                let db = c.get_as::<String>(&DB).await?;
                Ok::<_, BoxError>(format!("repo({db})"))
            })
            .unwrap();

        assert_eq!(container.get_as::<String>(&REPO).await.unwrap(), "repo(db-handle)");
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let container = DependencyContainer::new();
        container.register_instance(DB, 7u64).unwrap();
        let err = container.get_as::<String>(&DB).await.unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_trait_object_round_trip() {
        trait Greeter: Send + Sync {
            fn greet(&self) -> &'static str;
        }
        struct Hello;
        impl Greeter for Hello {
            fn greet(&self) -> &'static str {
                "hello"
            }
        }

        let container = DependencyContainer::new();
        container
            .register_instance(REPO, Arc::new(Hello) as Arc<dyn Greeter>)
            .unwrap();
        let greeter = container.get_as::<Arc<dyn Greeter>>(&REPO).await.unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[tokio::test]
    async fn test_sealed_rejects_registration() {
        let container = DependencyContainer::new();
        container.register_instance(DB, 1u8).unwrap();
        container.seal();
        assert_eq!(
            container.register_instance(REPO, 2u8).unwrap_err(),
            ContainerError::Sealed(REPO)
        );
        // Reads still work.
        assert_eq!(container.get_as::<u8>(&DB).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_is_single_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let container = DependencyContainer::new();
        let c = calls.clone();
        container
            .register(DB, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, BoxError>(vec![1u8, 2, 3])
                }
            })
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let container = container.clone();
            tasks.push(tokio::spawn(async move { container.get(&DB).await.unwrap() }));
        }

        let mut resolved = Vec::new();
        for task in tasks {
            resolved.push(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(resolved.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
