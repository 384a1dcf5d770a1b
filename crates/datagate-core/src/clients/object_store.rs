//! Key-addressed blob store interface and filesystem implementation
//!
//! The trait mirrors the operations the orchestration core needs from an
//! S3-like collaborator. Every operation is atomic per call on the
//! collaborator side; the core never assumes atomicity across calls.

use crate::error::{PipelineError, Result};
use crate::types::{ObjectEntry, ObjectPage, TagSet};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of the sidecar file holding an object's tag set
const TAGS_SUFFIX: &str = ".tags.json";

/// Key-addressed blob storage with copy, delete, paginated list and tagging
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of a bucket. Entries carry the object's tags so bulk
    /// operations can filter before mutating.
    async fn list_page(&self, bucket: &str, continuation: Option<&str>) -> Result<ObjectPage>;

    /// Copy an object, tags included, overwriting any destination object
    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()>;

    /// Delete an object. Deleting an absent key is a no-op success.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Read an object's tags. Fails with `NotFound` for an absent key.
    async fn get_tags(&self, bucket: &str, key: &str) -> Result<TagSet>;

    /// Replace an object's tags. Fails with `NotFound` for an absent key.
    async fn put_tags(&self, bucket: &str, key: &str, tags: &TagSet) -> Result<()>;

    /// Whether the key currently exists in the bucket
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;
}

/// Filesystem-backed object store: one directory per bucket, one file per
/// object, tags in a `<key>.tags.json` sidecar.
///
/// Used for local deployments and the test suite; the semantics match what
/// the core assumes of the production store (idempotent delete, copy
/// carries tags, list returns keys with their tags).
pub struct FsObjectStore {
    root: PathBuf,
    page_size: usize,
}

impl FsObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            page_size: 1000,
        })
    }

    /// Lower the listing page size; small pages exercise pagination in tests
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    fn tags_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(format!("{}{}", key, TAGS_SUFFIX))
    }

    /// Seed an object directly, bypassing the pipeline. Upload is not part
    /// of the orchestration surface; this exists for operators and tests.
    pub fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, body)?;
        Ok(())
    }

    /// Read an object's payload
    pub fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key);
        if !path.is_file() {
            return Err(PipelineError::NotFound(format!("{}/{}", bucket, key)));
        }
        Ok(fs::read(&path)?)
    }

    fn read_tags(&self, bucket: &str, key: &str) -> Result<TagSet> {
        let path = self.tags_path(bucket, key);
        if !path.is_file() {
            return Ok(TagSet::new());
        }

        let json = fs::read_to_string(&path)?;
        serde_json::from_str(&json)
            .map_err(|e| PipelineError::Deserialization(format!("Failed to parse tag set: {}", e)))
    }

    fn collect_keys(&self, dir: &Path, prefix: &str, keys: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if path.is_dir() {
                self.collect_keys(&path, &format!("{}{}/", prefix, name), keys)?;
            } else if !name.ends_with(TAGS_SUFFIX) {
                keys.push(format!("{}{}", prefix, name));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list_page(&self, bucket: &str, continuation: Option<&str>) -> Result<ObjectPage> {
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.is_dir() {
            return Ok(ObjectPage {
                objects: Vec::new(),
                next_token: None,
            });
        }

        let mut keys = Vec::new();
        self.collect_keys(&bucket_dir, "", &mut keys)?;
        keys.sort();

        // The continuation token is the last key of the previous page
        let start = match continuation {
            Some(after) => keys.partition_point(|k| k.as_str() <= after),
            None => 0,
        };

        let page_keys: Vec<String> = keys[start..]
            .iter()
            .take(self.page_size)
            .cloned()
            .collect();
        let next_token = if start + page_keys.len() < keys.len() {
            page_keys.last().cloned()
        } else {
            None
        };

        let mut objects = Vec::with_capacity(page_keys.len());
        for key in page_keys {
            let tags = self.read_tags(bucket, &key)?;
            objects.push(ObjectEntry { key, tags });
        }

        Ok(ObjectPage {
            objects,
            next_token,
        })
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        let src = self.object_path(src_bucket, src_key);
        if !src.is_file() {
            return Err(PipelineError::NotFound(format!(
                "{}/{}",
                src_bucket, src_key
            )));
        }

        let dst = self.object_path(dst_bucket, dst_key);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&src, &dst)?;

        // Copy carries the tag set, matching S3 copy semantics
        let src_tags = self.tags_path(src_bucket, src_key);
        let dst_tags = self.tags_path(dst_bucket, dst_key);
        if src_tags.is_file() {
            fs::copy(&src_tags, &dst_tags)?;
        } else if dst_tags.is_file() {
            fs::remove_file(&dst_tags)?;
        }

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key);
        if path.is_file() {
            fs::remove_file(&path)?;
        }

        let tags = self.tags_path(bucket, key);
        if tags.is_file() {
            fs::remove_file(&tags)?;
        }

        Ok(())
    }

    async fn get_tags(&self, bucket: &str, key: &str) -> Result<TagSet> {
        if !self.object_path(bucket, key).is_file() {
            return Err(PipelineError::NotFound(format!("{}/{}", bucket, key)));
        }
        self.read_tags(bucket, key)
    }

    async fn put_tags(&self, bucket: &str, key: &str, tags: &TagSet) -> Result<()> {
        if !self.object_path(bucket, key).is_file() {
            return Err(PipelineError::NotFound(format!("{}/{}", bucket, key)));
        }

        let json = serde_json::to_string_pretty(tags)
            .map_err(|e| PipelineError::Serialization(format!("Failed to serialize tags: {}", e)))?;
        fs::write(self.tags_path(bucket, key), json)?;

        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.object_path(bucket, key).is_file())
    }
}
