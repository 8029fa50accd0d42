#![allow(missing_docs)]

use std::error::Error;

use chunkbridge_filesystem::{FilesystemDriver, FilesystemDriverOptions};
use chunkbridge_storage::{
    Bytes, BytesMut, DriverError, DriverMode, Metadata, StorageDriver, MAX_OBJECT_SIZE,
};

#[test]
fn filesystem() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let driver = FilesystemDriver::from_path(path.path().join("array"), DriverMode::Write)?;
    driver.init()?;
    chunkbridge_storage::driver_test::driver_write_read(&driver)?;
    chunkbridge_storage::driver_test::driver_metadata(&driver)?;
    chunkbridge_storage::driver_test::driver_index(&driver)?;
    Ok(())
}

#[test]
fn filesystem_sync() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let url = format!("file://{}", path.path().to_str().ok_or("path")?);
    let mut options = FilesystemDriverOptions::default();
    options.sync(true);
    let driver = FilesystemDriver::new_with_options(&url, DriverMode::Write, options)?;
    driver.init()?;
    chunkbridge_storage::driver_test::driver_write_read(&driver)?;
    Ok(())
}

#[test]
fn filesystem_modes() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let root = path.path().join("nested").join("array");
    chunkbridge_storage::driver_test::driver_modes(|mode| {
        FilesystemDriver::from_path(&root, mode)
    })?;
    assert!(root.join("metadata").is_file());
    Ok(())
}

#[test]
fn filesystem_metadata_atomic() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let driver = FilesystemDriver::from_path(path.path(), DriverMode::Write)?;
    driver.init()?;
    let mut metadata = Metadata::new();
    metadata.set("schema", "<v:int64> [i=0:9:0:5]");
    driver.write_metadata(&metadata)?;
    assert_eq!(
        std::fs::read_to_string(path.path().join("metadata"))?,
        "schema\t<v:int64> [i=0:9:0:5]\n"
    );
    assert!(!path.path().join(".metadata.tmp").exists());
    assert_eq!(driver.count("")?, 1);
    Ok(())
}

#[test]
fn filesystem_missing_object() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let driver = FilesystemDriver::from_path(path.path(), DriverMode::Read)?;
    let err = driver.read_bytes("chunks/c_0").unwrap_err();
    assert!(matches!(err, DriverError::Storage { operation: "Get", .. }));
    assert!(err
        .to_string()
        .starts_with(&format!("Get operation on {}/chunks/c_0 failed.", driver.url())));
    assert_eq!(driver.count("chunks/")?, 0);
    Ok(())
}

#[test]
fn filesystem_count_error() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let driver = FilesystemDriver::from_path(path.path(), DriverMode::Write)?;
    driver.init()?;
    driver.write_bytes("chunks/c_0", Bytes::from_static(b"x"))?;

    // Listing beneath a regular file fails rather than reporting no objects
    let err = driver.count("chunks/c_0/index/").unwrap_err();
    assert!(matches!(err, DriverError::Storage { operation: "List", .. }), "{err}");
    assert!(err
        .to_string()
        .starts_with(&format!("List operation on {}/chunks/c_0/index/ failed.", driver.url())));
    assert_eq!(driver.count("chunks/")?, 1);
    assert_eq!(driver.count("index/")?, 0);
    Ok(())
}

#[test]
#[cfg_attr(miri, ignore)]
fn filesystem_size_limit() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let driver = FilesystemDriver::from_path(path.path(), DriverMode::Write)?;
    driver.init()?;
    driver.write_bytes("chunks/c_0", Bytes::from_static(b"x"))?;

    // A sparse file larger than the limit, nothing is allocated or transferred
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(driver.suffix_to_fspath("chunks/c_0"))?;
    file.set_len(MAX_OBJECT_SIZE + 1)?;
    drop(file);

    let mut buffer = BytesMut::new();
    assert!(matches!(
        driver.read_bytes_into("chunks/c_0", &mut buffer),
        Err(DriverError::SizeLimit { size, .. }) if size == MAX_OBJECT_SIZE + 1
    ));
    assert!(buffer.is_empty());
    assert!(matches!(
        driver.read_bytes("chunks/c_0"),
        Err(DriverError::SizeLimit { .. })
    ));
    Ok(())
}

#[test]
fn filesystem_invalid_url() {
    assert!(matches!(
        FilesystemDriver::new("file://", DriverMode::Read),
        Err(DriverError::Url(_))
    ));
    assert!(matches!(
        FilesystemDriver::new("/tmp/array", DriverMode::Read),
        Err(DriverError::Url(_))
    ));
}
