use chunkbridge_storage::DriverError;

/// An object store URL, `<scheme>://<bucket>/<prefix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreUrl {
    scheme: String,
    bucket: String,
    prefix: String,
}

impl ObjectStoreUrl {
    /// Parse an object store URL.
    ///
    /// The bucket must be non-empty and followed by a `/`. Trailing slashes of the prefix are ignored.
    ///
    /// # Errors
    /// Returns [`DriverError::Url`] if `url` is malformed.
    pub fn parse(url: &str) -> Result<Self, DriverError> {
        let invalid = || DriverError::Url(format!("Invalid object store URL {url}"));
        let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
        let (bucket, prefix) = rest.split_once('/').ok_or_else(invalid)?;
        if scheme.is_empty() || bucket.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            prefix: prefix.trim_end_matches('/').to_string(),
        })
    }

    /// The URL scheme, e.g. `s3`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The bucket.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The key prefix, empty for the bucket root.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The key of the object at `suffix`, `<prefix>/<suffix>`.
    #[must_use]
    pub fn key(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}/{suffix}", self.prefix)
        }
    }

    /// The display location of `key`, `<scheme>://<bucket>/<key>`.
    #[must_use]
    pub fn location(&self, key: &str) -> String {
        format!("{}://{}/{key}", self.scheme, self.bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_parse() {
        let url = ObjectStoreUrl::parse("s3://bucket/arrays/a1").unwrap();
        assert_eq!(url.scheme(), "s3");
        assert_eq!(url.bucket(), "bucket");
        assert_eq!(url.prefix(), "arrays/a1");
        assert_eq!(url.key("metadata"), "arrays/a1/metadata");
        assert_eq!(
            url.location(&url.key("chunks/c_0_1")),
            "s3://bucket/arrays/a1/chunks/c_0_1"
        );

        let url = ObjectStoreUrl::parse("s3://bucket/").unwrap();
        assert_eq!(url.prefix(), "");
        assert_eq!(url.key("metadata"), "metadata");
        assert_eq!(ObjectStoreUrl::parse("s3://bucket/a/").unwrap().prefix(), "a");
    }

    #[test]
    fn url_invalid() {
        for url in ["s3://bucket", "s3:///prefix", "s3://", "bucket/prefix", "://bucket/a"] {
            assert!(
                matches!(ObjectStoreUrl::parse(url), Err(DriverError::Url(_))),
                "{url}"
            );
        }
    }
}
