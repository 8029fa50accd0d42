#![allow(missing_docs)]

use std::{error::Error, sync::Arc};

use chunkbridge::{
    array::{ArrayReader, ArrayWriter, ArrayWriterOptions},
    get_global_registry, make_driver, register_driver,
    storage::{store::MemoryDriver, ArraySchema, Bytes, DriverError, DriverMode},
};
use serial_test::serial;

#[test]
#[serial]
fn make_driver_file() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let url = format!("file://{}/array", path.path().to_str().ok_or("path")?);

    let schema: ArraySchema = "<v:int64> [i=0:99:0:10]".parse()?;
    let mut writer = ArrayWriter::create(
        make_driver(&url, DriverMode::Write)?,
        schema,
        &ArrayWriterOptions::default(),
    )?;
    writer.write_chunk(&[57], Bytes::from_static(b"57"))?;
    writer.finish()?;

    let driver = make_driver(&url, DriverMode::Read)?;
    assert_eq!(driver.url(), url);
    assert_eq!(driver.mode(), DriverMode::Read);
    let reader = ArrayReader::open(driver)?;
    assert_eq!(reader.read_chunk(&[5])?, Some(Bytes::from_static(b"57")));
    assert!(path.path().join("array").join("metadata").is_file());
    Ok(())
}

#[test]
#[serial]
fn make_driver_unsupported() {
    for url in ["ftp://host/array", "gs://bucket/array"] {
        let err = make_driver(url, DriverMode::Read).unwrap_err();
        assert!(matches!(err, DriverError::Config(_)), "{url}");
        assert!(err.to_string().starts_with("Unsupported URL scheme"), "{err}");
    }
    for url in ["/tmp/array", "array", ""] {
        assert!(
            matches!(
                make_driver(url, DriverMode::Read),
                Err(DriverError::Config(_))
            ),
            "{url}"
        );
    }
}

#[test]
#[serial]
fn make_driver_invalid_url() {
    assert!(matches!(
        make_driver("s3://bucket", DriverMode::Read),
        Err(DriverError::Url(_))
    ));
    assert!(matches!(
        make_driver("file://", DriverMode::Read),
        Err(DriverError::Url(_))
    ));
}

#[test]
#[serial]
fn register_driver_custom() -> Result<(), Box<dyn Error>> {
    let memory = Arc::new(MemoryDriver::new("memory://shared", DriverMode::Write));
    {
        let memory = memory.clone();
        register_driver("memory", move |_url, mode| Ok(Arc::new(memory.with_mode(mode))));
    }
    assert!(get_global_registry()
        .schemes()
        .contains(&"memory".to_string()));

    let schema: ArraySchema = "<v:int64> [i=0:99:0:10; j=0:9:0:5]".parse()?;
    let mut writer = ArrayWriter::create(
        make_driver("memory://shared", DriverMode::Write)?,
        schema,
        &ArrayWriterOptions::default(),
    )?;
    writer.write_chunk(&[10, 9], Bytes::from_static(b"x"))?;
    writer.finish()?;
    assert_eq!(memory.suffixes().len(), 3);

    let reader = ArrayReader::open(make_driver("memory://shared", DriverMode::Read)?)?;
    assert_eq!(reader.read_chunk(&[1, 1])?, Some(Bytes::from_static(b"x")));

    assert!(get_global_registry().unregister("memory"));
    assert!(matches!(
        make_driver("memory://shared", DriverMode::Read),
        Err(DriverError::Config(_))
    ));
    Ok(())
}
