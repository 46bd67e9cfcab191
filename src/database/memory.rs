//! In-process document store with the same write semantics as the remote one

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::error::{DatabaseError, DatabaseResult};
use super::{path_segments, DocumentStore};

#[derive(Default)]
pub struct MemoryStore {
    root: RwLock<JsonValue>,
    push_counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing tree
    pub fn with_data(data: JsonValue) -> Self {
        Self {
            root: RwLock::new(data),
            push_counter: AtomicU64::new(0),
        }
    }

    /// Copy of the whole tree
    pub async fn snapshot(&self) -> JsonValue {
        self.root.read().await.clone()
    }

    fn next_push_key(&self) -> String {
        let n = self.push_counter.fetch_add(1, Ordering::SeqCst);
        format!("-M{:013}{:06}", chrono::Utc::now().timestamp_millis(), n)
    }
}

fn pointer(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| format!("/{}", s.replace('~', "~0").replace('/', "~1")))
        .collect()
}

fn lookup<'a>(root: &'a JsonValue, segments: &[&str]) -> Option<&'a JsonValue> {
    root.pointer(&pointer(segments)).filter(|v| !v.is_null())
}

/// Node at `segments`, creating intermediate objects as needed
fn slot<'a>(mut node: &'a mut JsonValue, segments: &[&str]) -> &'a mut JsonValue {
    for segment in segments {
        if !node.is_object() {
            *node = JsonValue::Object(Map::new());
        }
        node = &mut node[*segment];
    }
    node
}

/// Drop nulls and empty objects left behind by deletes
fn prune(node: &mut JsonValue) {
    if let JsonValue::Object(map) = node {
        for child in map.values_mut() {
            prune(child);
        }
        map.retain(|_, v| !v.is_null() && !matches!(v, JsonValue::Object(m) if m.is_empty()));
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> DatabaseResult<Option<JsonValue>> {
        let root = self.root.read().await;
        Ok(lookup(&root, &path_segments(path)).cloned())
    }

    async fn put(&self, path: &str, value: &JsonValue) -> DatabaseResult<()> {
        let mut root = self.root.write().await;
        *slot(&mut root, &path_segments(path)) = value.clone();
        prune(&mut root);
        Ok(())
    }

    async fn patch(&self, path: &str, fields: &JsonValue) -> DatabaseResult<()> {
        let fields = fields
            .as_object()
            .ok_or_else(|| DatabaseError::invalid_input("patch requires an object"))?;

        let mut root = self.root.write().await;
        let node = slot(&mut root, &path_segments(path));
        if !node.is_object() {
            *node = JsonValue::Object(Map::new());
        }
        for (key, value) in fields {
            node[key.as_str()] = value.clone();
        }
        prune(&mut root);
        Ok(())
    }

    async fn push(&self, path: &str, value: &JsonValue) -> DatabaseResult<String> {
        let key = self.next_push_key();
        let mut segments = path_segments(path);
        segments.push(&key);

        let mut root = self.root.write().await;
        *slot(&mut root, &segments) = value.clone();
        Ok(key)
    }

    async fn delete(&self, path: &str) -> DatabaseResult<()> {
        let segments = path_segments(path);
        let mut root = self.root.write().await;
        match segments.split_last() {
            None => *root = JsonValue::Null,
            Some((last, parent)) => {
                if let Some(JsonValue::Object(map)) = root.pointer_mut(&pointer(parent)) {
                    map.remove(*last);
                }
            }
        }
        prune(&mut root);
        Ok(())
    }

    async fn child_keys(&self, path: &str) -> DatabaseResult<Vec<String>> {
        let root = self.root.read().await;
        let mut keys: Vec<String> = match lookup(&root, &path_segments(path)) {
            Some(JsonValue::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        keys.sort();
        Ok(keys)
    }

    async fn put_if_absent(&self, path: &str, value: &JsonValue) -> DatabaseResult<bool> {
        let segments = path_segments(path);
        let mut root = self.root.write().await;
        if lookup(&root, &segments).is_some() {
            return Ok(false);
        }
        *slot(&mut root, &segments) = value.clone();
        Ok(true)
    }
}
