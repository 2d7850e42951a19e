//! Object storage for uploaded bills
//!
//! Provides a unified interface over:
//! - `S3Storage`: any S3-compatible endpoint, selected by `S3_ENDPOINT_URL`
//! - `MemoryStorage`: in-process map used for development and tests
//!
//! Bills are referenced by `s3://{bucket}/{key}` URIs. Keys are
//! `{user_id}/{uuid}-{sanitized filename}` so ownership can be checked from
//! the key alone.

mod memory;
mod s3;
pub mod sigv4;

pub use memory::MemoryStorage;
pub use s3::{S3Config, S3Storage, DEFAULT_BUCKET};

use std::time::Duration;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Presigned upload URLs stay valid this long
pub const PRESIGN_EXPIRY: Duration = Duration::from_secs(3600);

const MAX_FILENAME_LEN: usize = 100;

#[derive(Clone)]
pub enum Storage {
    S3(S3Storage),
    Memory(MemoryStorage),
}

impl Storage {
    /// S3 when configured, otherwise in-memory
    pub fn from_env() -> Result<Self> {
        match S3Config::from_env() {
            Some(config) => Ok(Storage::S3(S3Storage::new(config)?)),
            None => {
                let bucket = std::env::var("S3_BUCKET_NAME")
                    .ok()
                    .filter(|b| !b.is_empty())
                    .unwrap_or_else(|| DEFAULT_BUCKET.to_string());
                Ok(Storage::Memory(MemoryStorage::new(&bucket)))
            }
        }
    }

    pub fn memory() -> Self {
        Storage::Memory(MemoryStorage::new(DEFAULT_BUCKET))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Storage::S3(_) => "s3",
            Storage::Memory(_) => "memory",
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            Storage::S3(s) => s.bucket(),
            Storage::Memory(m) => m.bucket(),
        }
    }

    pub async fn ensure_bucket(&self) -> Result<()> {
        match self {
            Storage::S3(s) => s.ensure_bucket().await,
            Storage::Memory(_) => Ok(()),
        }
    }

    /// URL a client can PUT the file to
    ///
    /// The content type is not part of the signature; clients may send any.
    pub fn presign_put(&self, key: &str, expires: Duration) -> Result<String> {
        match self {
            Storage::S3(s) => s.presign_put(key, expires),
            Storage::Memory(m) => m.presign_put(key, expires),
        }
    }

    pub async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        match self {
            Storage::S3(s) => s.put_object(key, data, content_type).await,
            Storage::Memory(m) => m.put_object(key, data, content_type),
        }
    }

    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        match self {
            Storage::S3(s) => s.get_object(key).await,
            Storage::Memory(m) => m.get_object(key),
        }
    }

    pub async fn delete_object(&self, key: &str) -> Result<()> {
        match self {
            Storage::S3(s) => s.delete_object(key).await,
            Storage::Memory(m) => m.delete_object(key),
        }
    }

    pub async fn health_check(&self) -> bool {
        match self {
            Storage::S3(s) => s.health_check().await,
            Storage::Memory(_) => true,
        }
    }

    pub fn file_uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket(), key)
    }

    /// Key of a `s3://{bucket}/...` URI in this bucket
    pub fn key_from_uri(&self, uri: &str) -> Result<String> {
        let prefix = format!("s3://{}/", self.bucket());
        let key = uri
            .strip_prefix(&prefix)
            .ok_or_else(|| Error::Validation(format!("File URI must start with {}", prefix)))?;
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(Error::Validation("Invalid file URI".to_string()));
        }
        Ok(key.to_string())
    }
}

/// Replace anything but letters, digits, `.`, `-` and `_`
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "bill".to_string()
    } else {
        cleaned
    }
}

/// Storage key for a new upload
pub fn object_key(user_id: Uuid, filename: &str) -> String {
    format!("{}/{}-{}", user_id, Uuid::new_v4(), sanitize_filename(filename))
}

/// Whether a key lives under the user's prefix
pub fn key_belongs_to(key: &str, user_id: Uuid) -> bool {
    key.strip_prefix(&user_id.to_string())
        .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Bill (Jan).pdf"), "My_Bill__Jan_.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\scans\\bill.png"), "bill.png");
        assert_eq!(sanitize_filename("..."), "bill");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), 100);
    }

    #[test]
    fn test_object_key_and_ownership() {
        let user = Uuid::new_v4();
        let key = object_key(user, "bill.pdf");
        assert!(key.starts_with(&format!("{}/", user)));
        assert!(key.ends_with("-bill.pdf"));
        assert!(key_belongs_to(&key, user));
        assert!(!key_belongs_to(&key, Uuid::new_v4()));
        assert!(!key_belongs_to(&user.to_string(), user));
    }

    #[test]
    fn test_uri_roundtrip() {
        let storage = Storage::memory();
        let uri = storage.file_uri("u/k.pdf");
        assert_eq!(uri, "s3://greenspark-bills/u/k.pdf");
        assert_eq!(storage.key_from_uri(&uri).unwrap(), "u/k.pdf");
        assert!(storage.key_from_uri("s3://other-bucket/u/k.pdf").is_err());
        assert!(storage.key_from_uri("s3://greenspark-bills/u/../k.pdf").is_err());
    }

    #[tokio::test]
    async fn test_memory_objects() {
        let storage = Storage::memory();
        storage
            .put_object("u/a.pdf", b"%PDF".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(storage.get_object("u/a.pdf").await.unwrap(), b"%PDF");
        storage.delete_object("u/a.pdf").await.unwrap();
        assert!(matches!(
            storage.get_object("u/a.pdf").await,
            Err(Error::NotFound(_))
        ));
    }
}
