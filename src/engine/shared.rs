//! Shared engine handle.

use std::sync::Arc;

use parking_lot::Mutex;

use super::Engine;
use crate::buffer::StatsSnapshot;
use crate::common::{Error, Result};

/// Cloneable handle to one [`Engine`].
///
/// Every call takes the engine's mutex for its whole duration, so
/// operations from different threads are serialized and never interleave
/// inside the tree.
///
/// # Example
/// ```
/// use plustree::{Engine, Geometry, Options, SharedEngine};
/// use std::thread;
///
/// let engine = Engine::create_memory(Geometry::new(8, 8, 1), Options::default()).unwrap();
/// let shared = SharedEngine::new(engine);
///
/// let handles: Vec<_> = (0..4u64)
///     .map(|t| {
///         let shared = shared.clone();
///         thread::spawn(move || shared.insert(&t.to_be_bytes(), &[t as u8; 8]).unwrap())
///     })
///     .collect();
/// for handle in handles {
///     assert!(handle.join().unwrap());
/// }
/// assert_eq!(shared.len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn insert(&self, key: &[u8], data: &[u8]) -> Result<bool> {
        self.inner.lock().insert(key, data)
    }

    pub fn find(&self, key: &[u8], out: &mut [u8]) -> Result<bool> {
        self.inner.lock().find(key, out)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.lock().get(key)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.inner.lock().contains(key)
    }

    pub fn commit(&self) -> Result<()> {
        self.inner.lock().commit()
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn cache_stats(&self) -> StatsSnapshot {
        self.inner.lock().cache_stats()
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Live handles to this engine, including `self`.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Recover the engine if this is the last handle.
    pub fn into_inner(self) -> std::result::Result<Engine, SharedEngine> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| SharedEngine { inner })
    }

    /// Close the engine through its last handle.
    ///
    /// # Errors
    /// `Error::InvalidConfig` if other handles are still alive. Nothing is
    /// committed then; the engine stays open for the remaining handles.
    pub fn close(self) -> Result<()> {
        match self.into_inner() {
            Ok(engine) => engine.close(),
            Err(shared) => Err(Error::InvalidConfig(format!(
                "engine still shared by {} other handles",
                shared.handle_count() - 1
            ))),
        }
    }
}
