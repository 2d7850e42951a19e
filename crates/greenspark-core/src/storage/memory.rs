//! In-process object store
//!
//! Used when no S3 endpoint is configured and in tests. Objects live for the
//! lifetime of the process; presigned URLs point nowhere, so clients of a
//! memory-backed server upload through `/bills/direct-upload`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct MemoryStorage {
    bucket: String,
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
}

impl MemoryStorage {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, String)>>> {
        self.objects
            .lock()
            .map_err(|_| Error::Storage("memory storage lock poisoned".to_string()))
    }

    pub fn presign_put(&self, key: &str, expires: Duration) -> Result<String> {
        Ok(format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            key,
            expires.as_secs()
        ))
    }

    pub fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.lock()?
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    pub fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| Error::NotFound(format!("Object {}", key)))
    }

    pub fn delete_object(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().map(|m| m.contains_key(key)).unwrap_or(false)
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock()
            .ok()
            .and_then(|m| m.get(key).map(|(_, ct)| ct.clone()))
    }
}
