//! In-memory bridge store, for tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{staging_key, BridgeStore, StagedObject, Variant};
use crate::error::FaceError;

pub struct MemoryBridge {
    prefix: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBridge {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BridgeStore for MemoryBridge {
    async fn stage(
        &self,
        scope_id: &str,
        source_key: Option<&str>,
        variant: Variant,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<StagedObject, FaceError> {
        let key = staging_key(&self.prefix, scope_id, source_key, variant);
        self.objects.write().await.insert(key.clone(), bytes);
        Ok(StagedObject {
            bucket: "memory".to_string(),
            key,
        })
    }

    async fn unstage(&self, staged: &StagedObject) {
        self.objects.write().await.remove(&staged.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn stage_then_unstage_leaves_nothing_behind() {
        let bridge = MemoryBridge::new("staging/");
        let staged = bridge
            .stage("g1", Some("photos/a.jpg"), Variant::Enroll, vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        assert!(bridge.contains(&staged.key).await);
        bridge.unstage(&staged).await;
        assert!(bridge.is_empty().await);
    }

    #[tokio::test]
    async fn guard_release_cleans_up() {
        let bridge = Arc::new(MemoryBridge::new("staging/"));
        let staged = bridge
            .stage("g1", None, Variant::Match, vec![9], "image/jpeg")
            .await
            .unwrap();
        let guard = super::super::StagedGuard::new(bridge.clone(), staged);
        assert_eq!(bridge.len().await, 1);
        guard.release().await;
        assert!(bridge.is_empty().await);
    }
}
