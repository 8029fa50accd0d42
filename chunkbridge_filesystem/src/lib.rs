//! A filesystem driver for the `chunkbridge` crate.
//!
//! [`FilesystemDriver`] stores each object as a file under a root directory, e.g. the URL
//! `file:///data/array` maps the suffix `chunks/c_0_1` to `/data/array/chunks/c_0_1`.
//!
//! ## Licence
//! `chunkbridge_filesystem` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::BytesMut;
use chunkbridge_storage::{
    check_object_size, Bytes, DriverError, DriverMode, Metadata, StorageDriver, METADATA_SUFFIX,
};
use parking_lot::{Mutex, RwLock};
use walkdir::WalkDir;

const METADATA_TMP_SUFFIX: &str = ".metadata.tmp";

/// Options for use with [`FilesystemDriver`].
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct FilesystemDriverOptions {
    sync: bool,
}

impl FilesystemDriverOptions {
    /// Set whether written files are flushed to disk before a write returns.
    pub fn sync(&mut self, sync: bool) -> &mut Self {
        self.sync = sync;
        self
    }
}

/// A filesystem driver.
#[derive(Debug)]
pub struct FilesystemDriver {
    url: String,
    base_path: PathBuf,
    mode: DriverMode,
    options: FilesystemDriverOptions,
    files: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

/// Decode the root path of a `file://` URL.
fn url_to_path(url: &str) -> Result<PathBuf, DriverError> {
    let path = url
        .strip_prefix("file://")
        .ok_or_else(|| DriverError::Url(format!("Invalid filesystem URL {url}")))?;
    let path = urlencoding::decode(path)
        .map_err(|err| DriverError::Url(format!("Invalid filesystem URL {url}: {err}")))?;
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return Err(DriverError::Url(format!(
            "Invalid filesystem URL {url}, missing path"
        )));
    }
    Ok(PathBuf::from(path))
}

impl FilesystemDriver {
    /// Create a new filesystem driver for a `file://<path>` URL.
    ///
    /// # Errors
    /// Returns [`DriverError::Url`] if `url` is not a `file://` URL with a non-empty path.
    pub fn new(url: &str, mode: DriverMode) -> Result<Self, DriverError> {
        Self::new_with_options(url, mode, FilesystemDriverOptions::default())
    }

    /// Create a new filesystem driver for a `file://<path>` URL with non-default `options`.
    ///
    /// # Errors
    /// Returns [`DriverError::Url`] if `url` is not a `file://` URL with a non-empty path.
    pub fn new_with_options(
        url: &str,
        mode: DriverMode,
        options: FilesystemDriverOptions,
    ) -> Result<Self, DriverError> {
        let base_path = url_to_path(url)?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            base_path,
            mode,
            options,
            files: Mutex::default(),
        })
    }

    /// Create a new filesystem driver rooted at `base_path`.
    ///
    /// # Errors
    /// Returns [`DriverError::Url`] if `base_path` is not valid UTF-8 or is empty.
    pub fn from_path<P: AsRef<Path>>(base_path: P, mode: DriverMode) -> Result<Self, DriverError> {
        let base_path = base_path.as_ref();
        let path = base_path.to_str().ok_or_else(|| {
            DriverError::Url(format!("Invalid filesystem path {}", base_path.display()))
        })?;
        Self::new(&format!("file://{path}"), mode)
    }

    /// The root directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Maps an object suffix to a filesystem [`PathBuf`].
    #[must_use]
    pub fn suffix_to_fspath(&self, suffix: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        if !suffix.is_empty() {
            path.push(suffix.strip_prefix('/').unwrap_or(suffix));
        }
        path
    }

    /// Maps a filesystem path under the root to an object suffix.
    fn fspath_to_suffix(&self, path: &Path) -> Option<String> {
        let path = pathdiff::diff_paths(path, &self.base_path)?;
        let suffix = path.to_string_lossy();
        #[cfg(target_os = "windows")]
        {
            Some(suffix.replace('\\', "/"))
        }
        #[cfg(not(target_os = "windows"))]
        {
            Some(suffix.into_owned())
        }
    }

    fn get_file_mutex(&self, suffix: &str) -> Arc<RwLock<()>> {
        let mut files = self.files.lock();
        let file = files
            .entry(suffix.to_string())
            .or_insert_with(|| Arc::new(RwLock::default()))
            .clone();
        drop(files);
        file
    }

    fn open_for_read(&self, suffix: &str) -> Result<(File, usize), DriverError> {
        let location = self.object_url(suffix);
        log::debug!("Get {location}");
        let get_error = |err: std::io::Error| DriverError::storage("Get", &location, err);
        let file = File::open(self.suffix_to_fspath(suffix)).map_err(get_error)?;
        let size = file.metadata().map_err(get_error)?.len();
        check_object_size(&location, size)?;
        let size = usize::try_from(size)
            .map_err(|_| DriverError::storage("Get", &location, "object too large for memory"))?;
        Ok((file, size))
    }

    fn write_file(&self, path: &Path, bytes: &[u8], location: &str) -> Result<(), DriverError> {
        let put_error = |err: std::io::Error| DriverError::storage("Put", location, err);
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(put_error)?;
            }
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(put_error)?;
        file.write_all(bytes).map_err(put_error)?;
        if self.options.sync {
            file.sync_all().map_err(put_error)?;
        }
        Ok(())
    }
}

impl StorageDriver for FilesystemDriver {
    fn init(&self) -> Result<(), DriverError> {
        if self.mode == DriverMode::Write {
            std::fs::create_dir_all(&self.base_path)
                .map_err(|err| DriverError::storage("Create", &self.url, err))?;
        }
        let location = self.object_url(METADATA_SUFFIX);
        log::debug!("Head {location}");
        let exists = self.suffix_to_fspath(METADATA_SUFFIX).is_file();
        self.mode.check_metadata(exists, &location)
    }

    fn read_bytes(&self, suffix: &str) -> Result<Bytes, DriverError> {
        let mut buffer = BytesMut::new();
        self.read_bytes_into(suffix, &mut buffer)?;
        Ok(buffer.freeze())
    }

    fn read_bytes_into(&self, suffix: &str, buffer: &mut BytesMut) -> Result<usize, DriverError> {
        let file = self.get_file_mutex(suffix);
        let _lock = file.read();
        let (mut file, size) = self.open_for_read(suffix)?;
        buffer.clear();
        buffer.resize(size, 0);
        file.read_exact(buffer)
            .map_err(|err| DriverError::storage("Get", self.object_url(suffix), err))?;
        Ok(size)
    }

    fn write_bytes(&self, suffix: &str, bytes: Bytes) -> Result<(), DriverError> {
        let location = self.object_url(suffix);
        check_object_size(&location, bytes.len() as u64)?;
        log::debug!("Put {location}");
        let file = self.get_file_mutex(suffix);
        let _lock = file.write();
        self.write_file(&self.suffix_to_fspath(suffix), &bytes, &location)
    }

    fn write_metadata(&self, metadata: &Metadata) -> Result<(), DriverError> {
        let text = metadata.to_text()?;
        let location = self.object_url(METADATA_SUFFIX);
        log::debug!("Put {location}");
        let file = self.get_file_mutex(METADATA_SUFFIX);
        let _lock = file.write();
        let tmp_path = self.suffix_to_fspath(METADATA_TMP_SUFFIX);
        self.write_file(&tmp_path, text.as_bytes(), &location)?;
        std::fs::rename(&tmp_path, self.suffix_to_fspath(METADATA_SUFFIX))
            .map_err(|err| DriverError::storage("Put", &location, err))
    }

    fn count(&self, prefix: &str) -> Result<usize, DriverError> {
        let location = self.object_url(prefix);
        log::debug!("List {location}");
        // Only walk the deepest directory the prefix names
        let directory = prefix.rsplit_once('/').map_or("", |(directory, _)| directory);
        let mut count = 0;
        for entry in WalkDir::new(self.suffix_to_fspath(directory)) {
            let entry = match entry {
                Ok(entry) => entry,
                // A missing directory holds no objects
                Err(err)
                    if err.depth() == 0
                        && err
                            .io_error()
                            .is_some_and(|err| err.kind() == std::io::ErrorKind::NotFound) =>
                {
                    return Ok(0)
                }
                Err(err) => return Err(DriverError::storage("List", location, err)),
            };
            if entry.file_type().is_file()
                && self
                    .fspath_to_suffix(entry.path())
                    .is_some_and(|suffix| suffix.starts_with(prefix))
            {
                count += 1;
            }
        }
        Ok(count)
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn mode(&self) -> DriverMode {
        self.mode
    }
}
