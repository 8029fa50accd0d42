//! [`object_store`] driver support for the `chunkbridge` crate.
//!
//! [`ObjectStoreDriver`] stores each object of an array under a key prefix in a bucket, e.g. the URL
//! `s3://bucket/arrays/a1` maps the suffix `chunks/c_0_1` to the key `arrays/a1/chunks/c_0_1`.
//!
//! Every request is wrapped in a fixed-delay retry loop ([`RetryPolicy`]) and runs to completion on
//! the calling thread. Drivers must not be used from within an async context.
//!
//! ## Licence
//! `chunkbridge_object_store` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

mod client;
mod retry;
mod url;

use std::{future::Future, sync::Arc};

use chunkbridge_storage::{
    check_object_size, Bytes, DriverError, DriverMode, StorageDriver, METADATA_SUFFIX,
};
use futures::TryStreamExt;
use object_store::{path::Path, ObjectStore, PutPayload};
use tokio::runtime::Handle;

pub use client::ClientContext;
pub use retry::{RetryPolicy, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY};
pub use url::ObjectStoreUrl;

pub use object_store;

/// Appended to errors caused by rejected credentials or permissions.
const FORBIDDEN_HINT: &str =
    "See https://aws.amazon.com/premiumsupport/knowledge-center/s3-troubleshoot-403/";

/// Options for use with [`ObjectStoreDriver`].
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreDriverOptions {
    retry: RetryPolicy,
}

impl ObjectStoreDriverOptions {
    /// Set the retry policy applied to every request.
    pub fn retry(&mut self, retry: RetryPolicy) -> &mut Self {
        self.retry = retry;
        self
    }
}

/// Map an [`object_store::Error`] to a [`DriverError::Storage`].
fn storage_error(operation: &'static str, location: String, err: &object_store::Error) -> DriverError {
    let message = match err {
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => format!("{err} {FORBIDDEN_HINT}"),
        _ => err.to_string(),
    };
    DriverError::storage(operation, location, message)
}

/// A driver backed by an [`object_store::ObjectStore`].
#[derive(Debug)]
pub struct ObjectStoreDriver {
    url: String,
    location: ObjectStoreUrl,
    mode: DriverMode,
    store: Arc<dyn ObjectStore>,
    runtime: Handle,
    options: ObjectStoreDriverOptions,
}

impl ObjectStoreDriver {
    /// Create a new Amazon S3 driver for an `s3://<bucket>/<prefix>` URL.
    ///
    /// The region, endpoint, and credentials are read from the standard `AWS_*` environment variables.
    ///
    /// # Errors
    /// Returns [`DriverError::Url`] if `url` is malformed, or [`DriverError::Config`] if the client
    /// cannot be configured.
    #[cfg(feature = "aws")]
    pub fn new(url: &str, mode: DriverMode) -> Result<Self, DriverError> {
        Self::new_with_options(url, mode, ObjectStoreDriverOptions::default())
    }

    /// Create a new Amazon S3 driver for an `s3://<bucket>/<prefix>` URL with non-default `options`.
    ///
    /// # Errors
    /// Returns [`DriverError::Url`] if `url` is malformed, or [`DriverError::Config`] if the client
    /// cannot be configured.
    #[cfg(feature = "aws")]
    pub fn new_with_options(
        url: &str,
        mode: DriverMode,
        options: ObjectStoreDriverOptions,
    ) -> Result<Self, DriverError> {
        Self::new_with_s3_builder(
            url,
            mode,
            object_store::aws::AmazonS3Builder::from_env(),
            options,
        )
    }

    /// Create a new Amazon S3 driver for an `s3://<bucket>/<prefix>` URL from a preconfigured `builder`.
    ///
    /// The bucket of `builder` is set from `url`. The client's own retries are disabled, so each
    /// attempt of the [`RetryPolicy`] issues a single request.
    ///
    /// # Errors
    /// Returns [`DriverError::Url`] if `url` is malformed, or [`DriverError::Config`] if the client
    /// cannot be configured.
    #[cfg(feature = "aws")]
    pub fn new_with_s3_builder(
        url: &str,
        mode: DriverMode,
        builder: object_store::aws::AmazonS3Builder,
        options: ObjectStoreDriverOptions,
    ) -> Result<Self, DriverError> {
        let location = ObjectStoreUrl::parse(url)?;
        if location.scheme() != "s3" {
            return Err(DriverError::Url(format!("Invalid S3 URL {url}")));
        }
        let mut retry = object_store::RetryConfig::default();
        retry.max_retries = 0;
        let store = builder
            .with_bucket_name(location.bucket())
            .with_retry(retry)
            .build()
            .map_err(|err| DriverError::Config(err.to_string()))?;
        Self::new_with_store_and_context(
            url,
            mode,
            Arc::new(store),
            &ClientContext::global(),
            options,
        )
    }

    /// Create a new driver on an existing object `store` using the global [`ClientContext`].
    ///
    /// Only the prefix of `url` is used to form keys; the bucket is for display.
    ///
    /// # Errors
    /// Returns [`DriverError::Url`] if `url` is malformed.
    pub fn new_with_store(
        url: &str,
        mode: DriverMode,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, DriverError> {
        Self::new_with_store_and_context(
            url,
            mode,
            store,
            &ClientContext::global(),
            ObjectStoreDriverOptions::default(),
        )
    }

    /// Create a new driver on an existing object `store` with an explicit client `context`.
    ///
    /// # Errors
    /// Returns [`DriverError::Url`] if `url` is malformed, or [`DriverError::Config`] if the client
    /// context cannot be initialised.
    pub fn new_with_store_and_context(
        url: &str,
        mode: DriverMode,
        store: Arc<dyn ObjectStore>,
        context: &ClientContext,
        options: ObjectStoreDriverOptions,
    ) -> Result<Self, DriverError> {
        let location = ObjectStoreUrl::parse(url)?;
        let runtime = context.acquire()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            location,
            mode,
            store,
            runtime,
            options,
        })
    }

    /// The parsed driver URL.
    #[must_use]
    pub fn location(&self) -> &ObjectStoreUrl {
        &self.location
    }

    /// Run the request built by `request` under the retry policy, blocking until it completes.
    ///
    /// Failed attempts that are retried are logged as warnings. The error of the final attempt is returned.
    fn retry_loop<T, Fut>(
        &self,
        operation: &'static str,
        key: &str,
        mut request: impl FnMut() -> Fut,
    ) -> Result<T, object_store::Error>
    where
        Fut: Future<Output = Result<T, object_store::Error>>,
    {
        let location = self.location.location(key);
        log::debug!("{operation} {location}");
        self.options.retry.run(
            || self.runtime.block_on(request()),
            |attempt, err| log::warn!("{operation} {location} attempt #{attempt} failed: {err}"),
        )
    }

    /// [`retry_loop`](Self::retry_loop), raising a [`DriverError::Storage`] once the attempts are exhausted.
    fn request<T, Fut>(
        &self,
        operation: &'static str,
        key: &str,
        request: impl FnMut() -> Fut,
    ) -> Result<T, DriverError>
    where
        Fut: Future<Output = Result<T, object_store::Error>>,
    {
        self.retry_loop(operation, key, request)
            .map_err(|err| storage_error(operation, self.location.location(key), &err))
    }
}

impl StorageDriver for ObjectStoreDriver {
    fn init(&self) -> Result<(), DriverError> {
        let key = self.location.key(METADATA_SUFFIX);
        let path = Path::from(key.as_str());
        // A missing object is an expected outcome here, not an error
        let exists = match self.retry_loop("Head", &key, || self.store.head(&path)) {
            Ok(_) => true,
            Err(object_store::Error::NotFound { .. }) => false,
            Err(err) => return Err(storage_error("Head", self.location.location(&key), &err)),
        };
        self.mode
            .check_metadata(exists, &self.location.location(&key))
    }

    fn read_bytes(&self, suffix: &str) -> Result<Bytes, DriverError> {
        let key = self.location.key(suffix);
        let path = &Path::from(key.as_str());
        let location = &self.location.location(&key);
        // An oversized object is reported without retrying or reading the body
        self.request("Get", &key, move || async move {
            let result = self.store.get(path).await?;
            if let Err(err) = check_object_size(location, result.meta.size) {
                return Ok::<_, object_store::Error>(Err(err));
            }
            result.bytes().await.map(Ok)
        })?
    }

    fn write_bytes(&self, suffix: &str, bytes: Bytes) -> Result<(), DriverError> {
        let key = self.location.key(suffix);
        check_object_size(&self.location.location(&key), bytes.len() as u64)?;
        let path = Path::from(key.as_str());
        self.request("Put", &key, || {
            self.store.put(&path, PutPayload::from(bytes.clone()))
        })?;
        Ok(())
    }

    fn count(&self, prefix: &str) -> Result<usize, DriverError> {
        // Listing is by path segment, so list the parent and match the key prefix
        let key = self.location.key(prefix);
        let parent = key
            .rsplit_once('/')
            .map(|(parent, _)| Path::from(parent));
        let objects = self.request("List", &key, || {
            self.store.list(parent.as_ref()).try_collect::<Vec<_>>()
        })?;
        Ok(objects
            .iter()
            .filter(|object| object.location.as_ref().starts_with(&key))
            .count())
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn mode(&self) -> DriverMode {
        self.mode
    }
}
