#![allow(missing_docs)]

use std::{
    error::Error,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chunkbridge_object_store::{
    object_store::{
        self, memory::InMemory, path::Path, GetOptions, GetResult, GetResultPayload, ListResult,
        MultipartUpload, ObjectMeta, ObjectStore, PutMultipartOptions, PutOptions, PutPayload,
        PutResult,
    },
    ClientContext, ObjectStoreDriver, ObjectStoreDriverOptions, RetryPolicy,
};
use chunkbridge_storage::{Bytes, DriverError, DriverMode, StorageDriver, MAX_OBJECT_SIZE};
use futures::{stream::BoxStream, StreamExt};

fn options() -> ObjectStoreDriverOptions {
    let mut options = ObjectStoreDriverOptions::default();
    options.retry(RetryPolicy::default().with_delay(Duration::from_millis(1)));
    options
}

fn driver(
    store: &Arc<dyn ObjectStore>,
    url: &str,
    mode: DriverMode,
) -> Result<ObjectStoreDriver, DriverError> {
    ObjectStoreDriver::new_with_store_and_context(
        url,
        mode,
        store.clone(),
        &ClientContext::global(),
        options(),
    )
}

#[test]
fn memory() -> Result<(), Box<dyn Error>> {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let driver = driver(&store, "s3://bucket/arrays/a1", DriverMode::Write)?;
    driver.init()?;
    chunkbridge_storage::driver_test::driver_write_read(&driver)?;
    chunkbridge_storage::driver_test::driver_metadata(&driver)?;
    chunkbridge_storage::driver_test::driver_index(&driver)?;
    Ok(())
}

#[test]
fn memory_bucket_root() -> Result<(), Box<dyn Error>> {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let driver = driver(&store, "s3://bucket/", DriverMode::Write)?;
    driver.init()?;
    chunkbridge_storage::driver_test::driver_write_read(&driver)?;
    Ok(())
}

#[test]
fn memory_modes() -> Result<(), Box<dyn Error>> {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    chunkbridge_storage::driver_test::driver_modes(|mode| {
        driver(&store, "s3://bucket/arrays/a1", mode)
    })?;

    // Arrays under sibling prefixes are independent
    let sibling = driver(&store, "s3://bucket/arrays/a10", DriverMode::Write)?;
    sibling.init()?;
    let err = driver(&store, "s3://bucket/arrays/a10", DriverMode::Read)?
        .init()
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Array not found, missing metadata s3://bucket/arrays/a10/metadata"
    );
    Ok(())
}

#[test]
fn memory_global_context() -> Result<(), Box<dyn Error>> {
    let before = ClientContext::global().instances();
    let _driver = ObjectStoreDriver::new_with_store(
        "s3://bucket/a",
        DriverMode::Write,
        Arc::new(InMemory::new()),
    )?;
    assert!(ClientContext::global().instances() > before);
    Ok(())
}

/// An in-memory store that reports every object as larger than [`MAX_OBJECT_SIZE`] and fails any body read.
#[derive(Debug, Default)]
struct OversizedStore {
    inner: InMemory,
    gets: AtomicUsize,
}

impl std::fmt::Display for OversizedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OversizedStore")
    }
}

#[async_trait]
impl ObjectStore for OversizedStore {
    async fn put_opts(
        &self,
        location: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        opts: PutMultipartOptions,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(&self, location: &Path, options: GetOptions) -> object_store::Result<GetResult> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let mut result = self.inner.get_opts(location, options).await?;
        result.meta.size = MAX_OBJECT_SIZE + 1;
        let body = futures::stream::once(async {
            Err::<Bytes, _>(object_store::Error::Generic {
                store: "OversizedStore",
                source: "body read".into(),
            })
        });
        result.payload = GetResultPayload::Stream(body.boxed());
        Ok(result)
    }

    async fn delete(&self, location: &Path) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'static, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&Path>) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

#[test]
fn memory_oversized_object() -> Result<(), Box<dyn Error>> {
    let oversized = Arc::new(OversizedStore::default());
    let store: Arc<dyn ObjectStore> = oversized.clone();
    let driver = driver(&store, "s3://bucket/arrays/a1", DriverMode::Write)?;
    driver.write_bytes("chunks/c_0", Bytes::from_static(b"chunk"))?;

    let err = driver.read_bytes("chunks/c_0").unwrap_err();
    assert!(
        matches!(err, DriverError::SizeLimit { size, .. } if size == MAX_OBJECT_SIZE + 1),
        "{err}"
    );
    // Neither retried nor read
    assert_eq!(oversized.gets.load(Ordering::SeqCst), 1);
    Ok(())
}

/// Serve `503 Service Unavailable` to every request, counting the requests.
#[cfg(feature = "aws")]
fn unavailable_endpoint() -> Result<(String, Arc<AtomicUsize>), Box<dyn Error>> {
    use std::io::{BufRead, BufReader, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let endpoint = format!("http://{}", listener.local_addr()?);
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();
    std::thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let mut reader = BufReader::new(&stream);
            let mut line = String::new();
            while reader.read_line(&mut line).is_ok_and(|read| read > 2) {
                line.clear();
            }
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = (&stream).write_all(
                b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
        }
    });
    Ok((endpoint, requests))
}

#[cfg(feature = "aws")]
#[test]
fn s3_one_request_per_attempt() -> Result<(), Box<dyn Error>> {
    let (endpoint, requests) = unavailable_endpoint()?;
    let builder = object_store::aws::AmazonS3Builder::new()
        .with_endpoint(endpoint)
        .with_allow_http(true)
        .with_region("us-east-1")
        .with_access_key_id("key")
        .with_secret_access_key("secret");
    let mut options = ObjectStoreDriverOptions::default();
    options.retry(RetryPolicy::default().with_attempts(2).with_delay(Duration::ZERO));
    let driver = ObjectStoreDriver::new_with_s3_builder(
        "s3://bucket/arrays/a1",
        DriverMode::Read,
        builder,
        options,
    )?;

    let err = driver.read_bytes("chunks/c_0").unwrap_err();
    assert!(matches!(err, DriverError::Storage { operation: "Get", .. }), "{err}");
    assert_eq!(requests.load(Ordering::SeqCst), 2);
    Ok(())
}
