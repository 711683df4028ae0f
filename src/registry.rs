//! Named breakers, created lazily and shared.

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::breaker::Breaker;
use crate::config::BreakerBuilder;
use crate::error::ConfigError;

/// Maps logical names to breakers, at most one per name.
///
/// The registry is an ordinary value: create one and pass it to whatever
/// needs it.
pub struct BreakerRegistry<E>
where
    E: std::error::Error + 'static,
{
    breakers: RwLock<AHashMap<String, Breaker<E>>>,
}

impl<E> Default for BreakerRegistry<E>
where
    E: std::error::Error + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> BreakerRegistry<E>
where
    E: std::error::Error + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            breakers: RwLock::new(AHashMap::new()),
        }
    }

    /// Returns the breaker named by `builder`, creating it on first use.
    ///
    /// The first configuration registered under a name wins; later builders
    /// for the same name are ignored and never validated. Concurrent first
    /// calls create exactly one breaker.
    pub fn get_or_create(&self, builder: BreakerBuilder<E>) -> Result<Breaker<E>, ConfigError> {
        if let Some(existing) = self.breakers.read().get(builder.name()) {
            return Ok(existing.clone());
        }

        let mut breakers = self.breakers.write();
        if let Some(existing) = breakers.get(builder.name()) {
            return Ok(existing.clone());
        }

        let breaker = builder.build()?;
        tracing::debug!(breaker = %breaker.name(), "registered circuit breaker");
        breakers.insert(breaker.name().to_owned(), breaker.clone());
        Ok(breaker)
    }

    /// Looks up an existing breaker.
    pub fn get(&self, name: &str) -> Option<Breaker<E>> {
        self.breakers.read().get(name).cloned()
    }

    /// Names of all registered breakers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// True if no breaker has been registered.
    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}
