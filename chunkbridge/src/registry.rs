//! The driver registry.
//!
//! [`make_driver`] selects a [`StorageDriver`] from the scheme of a URL. The global registry is
//! populated with the built-in schemes on first access:
//! - `file` ([`FilesystemDriver`](crate::filesystem::FilesystemDriver), `filesystem` feature), and
//! - `s3` ([`ObjectStoreDriver`](crate::object_store::ObjectStoreDriver), `object_store` feature).
//!
//! Applications can add their own schemes with [`register_driver`].

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use chunkbridge_storage::{DriverError, DriverMode, StorageDriver};
use parking_lot::RwLock;

/// A shareable, type-erased storage driver.
pub type Driver = Arc<dyn StorageDriver>;

/// A function that creates a driver from a URL and a mode.
pub type DriverBuilder =
    Arc<dyn Fn(&str, DriverMode) -> Result<Driver, DriverError> + Send + Sync>;

/// A registry of driver builders keyed by URL scheme.
#[derive(Default)]
pub struct DriverRegistry {
    builders: RwLock<HashMap<String, DriverBuilder>>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

impl DriverRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver builder for `scheme`, replacing any existing builder.
    pub fn register<F>(&self, scheme: &str, builder: F)
    where
        F: Fn(&str, DriverMode) -> Result<Driver, DriverError> + Send + Sync + 'static,
    {
        self.builders
            .write()
            .insert(scheme.to_ascii_lowercase(), Arc::new(builder));
    }

    /// Remove the driver builder for `scheme`. Returns true if one was registered.
    pub fn unregister(&self, scheme: &str) -> bool {
        self.builders
            .write()
            .remove(&scheme.to_ascii_lowercase())
            .is_some()
    }

    /// Get the driver builder for `scheme`.
    #[must_use]
    pub fn get_builder(&self, scheme: &str) -> Option<DriverBuilder> {
        self.builders
            .read()
            .get(&scheme.to_ascii_lowercase())
            .cloned()
    }

    /// The registered schemes, sorted.
    #[must_use]
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.builders.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Create a driver for `url` with the builder registered for its scheme.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] if `url` has no scheme or no builder is registered for it.
    /// Otherwise returns any error of the builder.
    pub fn make_driver(&self, url: &str, mode: DriverMode) -> Result<Driver, DriverError> {
        let scheme = url_scheme(url)?;
        let builder = self.get_builder(&scheme).ok_or_else(|| {
            DriverError::Config(format!("Unsupported URL scheme '{scheme}' in {url}"))
        })?;
        // The lock is released before building, so builders may use the registry.
        let driver = builder(url, mode)?;
        log::debug!("created {scheme} driver for {url} in {mode} mode");
        Ok(driver)
    }
}

fn url_scheme(url: &str) -> Result<String, DriverError> {
    url::Url::parse(url)
        .map(|url| url.scheme().to_string())
        .map_err(|err| DriverError::Config(format!("Invalid URL {url}: {err}")))
}

fn init_builtin_drivers(registry: &DriverRegistry) {
    #[cfg(feature = "filesystem")]
    registry.register("file", |url, mode| {
        Ok(Arc::new(chunkbridge_filesystem::FilesystemDriver::new(
            url, mode,
        )?))
    });
    #[cfg(feature = "object_store")]
    registry.register("s3", |url, mode| {
        Ok(Arc::new(chunkbridge_object_store::ObjectStoreDriver::new(
            url, mode,
        )?))
    });
    #[cfg(not(any(feature = "filesystem", feature = "object_store")))]
    let _ = registry;
}

/// The global driver registry.
///
/// The built-in drivers are registered on first access.
pub fn get_global_registry() -> &'static DriverRegistry {
    static REGISTRY: OnceLock<DriverRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let registry = DriverRegistry::new();
        init_builtin_drivers(&registry);
        registry
    })
}

/// Register a driver builder for `scheme` in the global registry.
///
/// A builder registered for a built-in scheme replaces the built-in driver.
pub fn register_driver<F>(scheme: &str, builder: F)
where
    F: Fn(&str, DriverMode) -> Result<Driver, DriverError> + Send + Sync + 'static,
{
    get_global_registry().register(scheme, builder);
}

/// Create a driver for `url` in `mode` from the global registry.
///
/// The driver is not initialised, call [`StorageDriver::init`] before use.
///
/// # Errors
/// Returns [`DriverError::Config`] if the scheme of `url` is missing or unsupported, or any error
/// of the driver constructor (e.g. [`DriverError::Url`] for a malformed bucket).
pub fn make_driver(url: &str, mode: DriverMode) -> Result<Driver, DriverError> {
    get_global_registry().make_driver(url, mode)
}
