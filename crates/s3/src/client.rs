//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from upsync-core.
//! S3 has no real directories: a directory is a common prefix in a
//! delimited listing, optionally backed by a zero-byte `dir/` marker.

use async_trait::async_trait;

use upsync_core::{
    Error, ListOptions, ListResult, ObjectInfo, ObjectMeta, ObjectStore, Result, StoreConfig,
};

use crate::purge::HttpPurger;

const DEFAULT_REGION: &str = "us-east-1";

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    bucket: String,
    purger: Option<HttpPurger>,
}

impl S3Client {
    /// Create a new S3 client for the configured bucket
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let region = if config.region.is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            config.region.clone()
        };

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region));

        // Without explicit credentials the SDK's default provider chain applies
        if !config.operator.is_empty() {
            let credentials = aws_credential_types::Credentials::new(
                config.operator.clone(),
                config.password.clone(),
                None, // session token
                None, // expiry
                "upsync-static-credentials",
            );
            loader = loader.credentials_provider(credentials);
        }

        if !config.endpoint.is_empty() {
            loader = loader.endpoint_url(&config.endpoint);
        }

        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(force_path_style(&config.bucket_lookup, &config.endpoint))
            .build();

        let purger = config
            .purge_endpoint
            .as_deref()
            .map(HttpPurger::new)
            .transpose()?;

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            purger,
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E: std::fmt::Display>(error: &aws_sdk_s3::error::SdkError<E>) -> String {
        match error {
            aws_sdk_s3::error::SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let meta = service_err.raw();
                let mut msg = format!("Service error: {}", err);
                if let Some(code) = meta.headers().get("x-amz-error-code")
                    && let Ok(code_str) = std::str::from_utf8(code.as_bytes())
                {
                    msg.push_str(&format!(" (code: {})", code_str));
                }
                msg
            }
            aws_sdk_s3::error::SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {:?}", err)
            }
            aws_sdk_s3::error::SdkError::TimeoutError(_) => "Request timeout".to_string(),
            aws_sdk_s3::error::SdkError::DispatchFailure(err) => {
                format!("Network dispatch error: {:?}", err)
            }
            aws_sdk_s3::error::SdkError::ResponseError(err) => {
                format!("Response error: {:?}", err)
            }
            _ => error.to_string(),
        }
    }

    /// Map an SDK error onto the core error kinds
    fn map_sdk_error<E: std::fmt::Display>(
        error: &aws_sdk_s3::error::SdkError<E>,
        path: &str,
    ) -> Error {
        classify_error(Self::format_sdk_error(error), path)
    }
}

/// Classify a formatted SDK error message
fn classify_error(message: String, path: &str) -> Error {
    if message.contains("NotFound") || message.contains("NoSuchKey") {
        Error::NotFound(path.to_string())
    } else if message.contains("NoSuchBucket") {
        Error::NotFound(format!("Bucket not found: {message}"))
    } else if message.contains("AccessDenied")
        || message.contains("InvalidAccessKeyId")
        || message.contains("SignatureDoesNotMatch")
    {
        Error::Auth(message)
    } else {
        Error::Network(message)
    }
}

/// Path-style addressing is used unless virtual-hosted style is requested.
/// In `auto` mode a custom endpoint (MinIO, RustFS, ...) gets path style.
fn force_path_style(bucket_lookup: &str, endpoint: &str) -> bool {
    match bucket_lookup {
        "path" => true,
        "dns" => false,
        _ => !endpoint.is_empty(),
    }
}

/// Object key for a slash-rooted file path
fn object_key(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Listing prefix for a slash-rooted directory path. The root has none.
fn dir_prefix(path: &str) -> String {
    let key = path.trim_matches('/');
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}

/// Strip the surrounding quotes S3 puts around ETags
fn etag_hash(etag: &str) -> String {
    etag.trim_matches('"').to_ascii_lowercase()
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_dir(&self, path: &str, options: ListOptions) -> Result<ListResult> {
        let prefix = dir_prefix(path);
        let mut request = self
            .inner
            .list_objects_v2()
            .bucket(&self.bucket)
            .delimiter("/");

        if !prefix.is_empty() {
            request = request.prefix(&prefix);
        }

        if let Some(max) = options.max_keys {
            request = request.max_keys(max);
        }

        if let Some(token) = &options.continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&e, path))?;

        let mut items = Vec::new();

        // Common prefixes are the subdirectories
        for common in response.common_prefixes() {
            if let Some(p) = common.prefix() {
                items.push(ObjectInfo::dir(p.trim_end_matches('/')));
            }
        }

        for object in response.contents() {
            let key = object.key().unwrap_or_default();
            // Skip the directory's own marker object
            if key.is_empty() || key == prefix || key.ends_with('/') {
                continue;
            }
            items.push(ObjectInfo::file(key));
        }

        Ok(ListResult {
            items,
            truncated: response.is_truncated().unwrap_or(false),
            continuation_token: response.next_continuation_token().map(|s| s.to_string()),
        })
    }

    async fn head_object(&self, path: &str) -> Result<ObjectMeta> {
        let response = self
            .inner
            .head_object()
            .bucket(&self.bucket)
            .key(object_key(path))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&e, path))?;

        Ok(ObjectMeta {
            path: path.to_string(),
            content_type: response.content_type().unwrap_or_default().to_string(),
            content_hash: response.e_tag().map(etag_hash).unwrap_or_default(),
        })
    }

    async fn put_object(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let body = aws_sdk_s3::primitives::ByteStream::from(data);

        self.inner
            .put_object()
            .bucket(&self.bucket)
            .key(object_key(path))
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&e, path))?;

        Ok(())
    }

    /// S3 deletes are always applied before the response; `asynchronous`
    /// has no effect.
    async fn delete_object(&self, path: &str, _asynchronous: bool) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key(path))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&e, path))?;

        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        let marker = dir_prefix(path);
        if marker.is_empty() {
            return Err(Error::InvalidPath("cannot remove the bucket root".to_string()));
        }

        self.inner
            .delete_object()
            .bucket(&self.bucket)
            .key(marker)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&e, path))?;

        Ok(())
    }

    async fn purge(&self, paths: &[String]) -> Result<Vec<String>> {
        match &self.purger {
            Some(purger) => Ok(purger.purge(paths).await),
            None => {
                tracing::debug!(count = paths.len(), "No purge endpoint configured");
                Ok(Vec::new())
            }
        }
    }
}
