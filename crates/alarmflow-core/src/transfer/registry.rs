//! Registry of named transfer function factories.
//!
//! Configuration documents reference functions by registered name; the
//! DASU asks the registry for a fresh instance per computing element.
//! This replaces any form of dynamic code loading: what is not
//! registered does not exist, and an unknown name is a configuration
//! error.

use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use super::min_max_threshold::MinMaxThresholdTf;
use super::multiplicity::MultiplicityTf;
use super::{TransferError, TransferFunction};

/// Factory producing a fresh transfer function instance.
pub type TransferFactory = Arc<dyn Fn() -> Box<dyn TransferFunction> + Send + Sync>;

/// Catalog of available transfer functions.
#[derive(Clone, Default)]
pub struct TransferFunctionRegistry {
    factories: Arc<RwLock<FxHashMap<String, TransferFactory>>>,
}

impl TransferFunctionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in functions registered:
    /// `MinMaxThreshold` and `Multiplicity`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("MinMaxThreshold", Arc::new(|| {
            Box::new(MinMaxThresholdTf::new()) as Box<dyn TransferFunction>
        }));
        registry.register("Multiplicity", Arc::new(|| {
            Box::new(MultiplicityTf::new()) as Box<dyn TransferFunction>
        }));
        registry
    }

    /// Registers a factory under a name, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, factory: TransferFactory) {
        self.factories.write().insert(name.into(), factory);
    }

    /// Creates a fresh instance of the named function.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::UnknownFunction`] when no factory is
    /// registered under `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn TransferFunction>, TransferError> {
        let factories = self.factories.read();
        let factory = factories
            .get(name)
            .ok_or_else(|| TransferError::UnknownFunction(name.to_string()))?;
        Ok(factory())
    }

    /// The registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}
