//! S3-compatible object store (AWS S3, MinIO, R2)
//!
//! Requests are path-style (`{endpoint}/{bucket}/{key}`) and signed with
//! SigV4. Presigned URLs are built against the public endpoint so browsers
//! outside the deployment network can reach them.
//!
//! # Configuration
//!
//! - `S3_ENDPOINT_URL` - API endpoint (required), e.g. http://minio:9000
//! - `S3_PUBLIC_URL` - endpoint used in presigned URLs (default: endpoint)
//! - `S3_ACCESS_KEY`, `S3_SECRET_KEY` - credentials (required)
//! - `S3_REGION` - signing region (default: us-east-1)
//! - `S3_BUCKET_NAME` - bucket (default: greenspark-bills)

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, StatusCode, Url};
use tracing::{debug, info};

use super::sigv4::{presign_url, sign_headers, uri_encode, Credentials};
use crate::error::{Error, Result};

pub const S3_ENDPOINT_ENV: &str = "S3_ENDPOINT_URL";
pub const S3_PUBLIC_URL_ENV: &str = "S3_PUBLIC_URL";
pub const S3_ACCESS_KEY_ENV: &str = "S3_ACCESS_KEY";
pub const S3_SECRET_KEY_ENV: &str = "S3_SECRET_KEY";
pub const S3_REGION_ENV: &str = "S3_REGION";
pub const S3_BUCKET_ENV: &str = "S3_BUCKET_NAME";

pub const DEFAULT_BUCKET: &str = "greenspark-bills";
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub public_url: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub bucket: String,
}

impl S3Config {
    /// Returns None unless endpoint and credentials are all set
    pub fn from_env() -> Option<Self> {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        let endpoint = var(S3_ENDPOINT_ENV)?;
        Some(Self {
            public_url: var(S3_PUBLIC_URL_ENV).unwrap_or_else(|| endpoint.clone()),
            access_key: var(S3_ACCESS_KEY_ENV)?,
            secret_key: var(S3_SECRET_KEY_ENV)?,
            region: var(S3_REGION_ENV).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            bucket: var(S3_BUCKET_ENV).unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            endpoint,
        })
    }
}

/// `host[:port]` as it appears in the Host header
fn host_header(url: &str) -> Result<String> {
    let parsed =
        Url::parse(url).map_err(|e| Error::Storage(format!("invalid endpoint {}: {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Storage(format!("endpoint {} has no host", url)))?;
    Ok(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

#[derive(Clone)]
pub struct S3Storage {
    http: Client,
    config: S3Config,
    host: String,
    public_host: String,
}

impl S3Storage {
    pub fn new(mut config: S3Config) -> Result<Self> {
        config.endpoint = config.endpoint.trim_end_matches('/').to_string();
        config.public_url = config.public_url.trim_end_matches('/').to_string();
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());
        Ok(Self {
            host: host_header(&config.endpoint)?,
            public_host: host_header(&config.public_url)?,
            http,
            config,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn credentials(&self) -> Credentials<'_> {
        Credentials {
            access_key: &self.config.access_key,
            secret_key: &self.config.secret_key,
            region: &self.config.region,
            service: "s3",
        }
    }

    fn object_path(&self, key: &str) -> String {
        format!("/{}/{}", self.config.bucket, uri_encode(key, false))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response> {
        let headers = sign_headers(
            &self.credentials(),
            Utc::now(),
            method.as_str(),
            &self.host,
            path,
            &[],
            &body,
        )?;
        let mut request = self
            .http
            .request(method, format!("{}{}", self.config.endpoint, path));
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(ct) = content_type {
            request = request.header("content-type", ct);
        }
        Ok(request.body(body).send().await?)
    }

    fn status_error(action: &str, status: StatusCode) -> Error {
        if status.is_server_error() {
            Error::Unavailable(format!("S3 {} failed with {}", action, status))
        } else {
            Error::Storage(format!("S3 {} failed with {}", action, status))
        }
    }

    /// Create the bucket unless it exists
    pub async fn ensure_bucket(&self) -> Result<()> {
        let path = format!("/{}", self.config.bucket);
        let head = self.send(Method::HEAD, &path, Vec::new(), None).await?;
        if head.status().is_success() {
            return Ok(());
        }
        if head.status() != StatusCode::NOT_FOUND {
            return Err(Self::status_error("head bucket", head.status()));
        }

        let body = if self.config.region == DEFAULT_REGION {
            Vec::new()
        } else {
            format!(
                "<CreateBucketConfiguration><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
                self.config.region
            )
            .into_bytes()
        };
        let created = self.send(Method::PUT, &path, body, None).await?;
        // a concurrent creator wins the race
        if created.status().is_success() || created.status() == StatusCode::CONFLICT {
            info!(bucket = %self.config.bucket, "Bucket ready");
            Ok(())
        } else {
            Err(Self::status_error("create bucket", created.status()))
        }
    }

    pub fn presign_put(&self, key: &str, expires: Duration) -> Result<String> {
        presign_url(
            &self.credentials(),
            Utc::now(),
            "PUT",
            &self.config.public_url,
            &self.public_host,
            &self.object_path(key),
            expires.as_secs(),
        )
    }

    pub async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .send(Method::PUT, &self.object_path(key), data, Some(content_type))
            .await?;
        if !response.status().is_success() {
            return Err(Self::status_error("put object", response.status()));
        }
        debug!(key = %key, "Stored object");
        Ok(())
    }

    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .send(Method::GET, &self.object_path(key), Vec::new(), None)
            .await?;
        match response.status() {
            s if s.is_success() => Ok(response.bytes().await?.to_vec()),
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("Object {}", key))),
            s => Err(Self::status_error("get object", s)),
        }
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        let response = self
            .send(Method::DELETE, &self.object_path(key), Vec::new(), None)
            .await?;
        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            s => Err(Self::status_error("delete object", s)),
        }
    }

    pub async fn health_check(&self) -> bool {
        let path = format!("/{}", self.config.bucket);
        self.send(Method::HEAD, &path, Vec::new(), None)
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
