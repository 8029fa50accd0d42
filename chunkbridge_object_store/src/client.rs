use std::sync::{Arc, OnceLock};

use chunkbridge_storage::DriverError;
use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};

#[derive(Debug, Default)]
struct ClientState {
    instances: usize,
    runtime: Option<Runtime>,
}

/// Process-wide object store client initialisation.
///
/// The object store client runs on a tokio runtime which is created by the first driver that
/// acquires the context. Later drivers share it and only increment the instance counter. The
/// runtime lives as long as the context; there is no teardown per driver.
///
/// [`ClientContext::global`] is the context used by drivers unless one is passed explicitly.
#[derive(Debug, Default)]
pub struct ClientContext {
    state: Mutex<ClientState>,
}

impl ClientContext {
    /// Create a new, uninitialised client context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide client context.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ClientContext>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Register a driver instance, initialising the client on first use.
    ///
    /// Returns a handle to the runtime the client runs on.
    ///
    /// # Errors
    /// Returns [`DriverError::Config`] if the runtime cannot be created.
    pub fn acquire(&self) -> Result<Handle, DriverError> {
        let mut state = self.state.lock();
        let handle = if let Some(runtime) = &state.runtime {
            runtime.handle().clone()
        } else {
            let runtime = Builder::new_multi_thread()
                .enable_all()
                .thread_name("chunkbridge-object-store")
                .build()
                .map_err(|err| {
                    DriverError::Config(format!(
                        "Failed to initialise the object store client: {err}"
                    ))
                })?;
            log::info!("object store client initialised");
            state.runtime.insert(runtime).handle().clone()
        };
        state.instances += 1;
        Ok(handle)
    }

    /// The number of driver instances that have acquired the context.
    #[must_use]
    pub fn instances(&self) -> usize {
        self.state.lock().instances
    }

    /// Returns true if the client has been initialised.
    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.state.lock().runtime.is_some()
    }
}
