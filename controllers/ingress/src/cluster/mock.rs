//! Mock ClusterApi for unit testing
//!
//! Stores objects as JSON keyed by (kind, namespace, name), assigns
//! increasing resource versions, and rejects replaces whose resource
//! version is stale. Conflicts, write failures and list failures can be
//! injected per object or per kind.

use super::{ClusterApi, Managed};
use crate::error::ClientError;
use crate::store::{Kind, ObjectKey};
use kube::ResourceExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A write observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Create(ObjectKey),
    Replace(ObjectKey),
    Delete(ObjectKey),
}

#[derive(Default)]
struct MockState {
    objects: BTreeMap<ObjectKey, Value>,
    next_version: u64,
    conflicts: HashMap<ObjectKey, usize>,
    failing_writes: HashSet<ObjectKey>,
    failing_lists: HashSet<Kind>,
    writes: Vec<Write>,
}

/// In-memory cluster
#[derive(Clone, Default)]
pub struct MockClusterApi {
    state: Arc<Mutex<MockState>>,
}

impl MockClusterApi {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object directly (for test setup); returns it with its new resource version
    pub fn add<K: Managed>(&self, obj: K) -> K {
        let mut state = self.state.lock().unwrap();
        let key = ObjectKey::of(&obj);
        state.store(&key, obj)
    }

    /// Read an object back
    pub fn object<K: Managed>(&self, namespace: &str, name: &str) -> Option<K> {
        let state = self.state.lock().unwrap();
        let key = ObjectKey::new(K::KIND, namespace, name);
        state
            .objects
            .get(&key)
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    /// Every stored object of kind `K`
    pub fn objects<K: Managed>(&self) -> Vec<K> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .iter()
            .filter(|(key, _)| key.kind == K::KIND)
            .map(|(_, v)| serde_json::from_value(v.clone()).unwrap())
            .collect()
    }

    /// Bump an object's resource version behind the controller's back
    pub fn touch<K: Managed>(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let key = ObjectKey::new(K::KIND, namespace, name);
        let obj: K = serde_json::from_value(state.objects[&key].clone()).unwrap();
        state.store(&key, obj);
    }

    /// Make the next `count` creates/replaces of this object fail with a conflict
    pub fn inject_conflicts(&self, kind: Kind, namespace: &str, name: &str, count: usize) {
        let mut state = self.state.lock().unwrap();
        state.conflicts.insert(ObjectKey::new(kind, namespace, name), count);
    }

    /// Make every write to this object fail
    pub fn fail_writes(&self, kind: Kind, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_writes.insert(ObjectKey::new(kind, namespace, name));
    }

    /// Make every list of `kind` fail
    pub fn fail_list(&self, kind: Kind) {
        self.state.lock().unwrap().failing_lists.insert(kind);
    }

    /// Writes observed so far, in order
    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }
}

impl MockState {
    fn store<K: Managed>(&mut self, key: &ObjectKey, mut obj: K) -> K {
        self.next_version += 1;
        obj.meta_mut().resource_version = Some(self.next_version.to_string());
        self.objects
            .insert(key.clone(), serde_json::to_value(&obj).unwrap());
        obj
    }

    fn check_write(&mut self, key: &ObjectKey) -> Result<(), ClientError> {
        if self.failing_writes.contains(key) {
            return Err(ClientError::Api {
                code: 500,
                message: format!("injected failure for {}/{}", key.namespace, key.name),
            });
        }
        if let Some(remaining) = self.conflicts.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(conflict(key));
            }
        }
        Ok(())
    }
}

fn conflict(key: &ObjectKey) -> ClientError {
    ClientError::Conflict {
        kind: key.kind,
        namespace: key.namespace.clone(),
        name: key.name.clone(),
    }
}

fn not_found(key: &ObjectKey) -> ClientError {
    ClientError::NotFound {
        kind: key.kind,
        namespace: key.namespace.clone(),
        name: key.name.clone(),
    }
}

#[async_trait::async_trait]
impl ClusterApi for MockClusterApi {
    async fn list<K: Managed>(&self) -> Result<Vec<K>, ClientError> {
        if self.state.lock().unwrap().failing_lists.contains(&K::KIND) {
            return Err(ClientError::Api {
                code: 503,
                message: format!("injected list failure for {}", K::KIND),
            });
        }
        Ok(self.objects())
    }

    async fn get<K: Managed>(&self, namespace: &str, name: &str) -> Result<K, ClientError> {
        self.object(namespace, name)
            .ok_or_else(|| not_found(&ObjectKey::new(K::KIND, namespace, name)))
    }

    async fn create<K: Managed>(&self, obj: &K) -> Result<K, ClientError> {
        let mut state = self.state.lock().unwrap();
        let key = ObjectKey::of(obj);
        state.writes.push(Write::Create(key.clone()));
        state.check_write(&key)?;
        if state.objects.contains_key(&key) {
            return Err(conflict(&key));
        }
        Ok(state.store(&key, obj.clone()))
    }

    async fn replace<K: Managed>(&self, obj: &K) -> Result<K, ClientError> {
        let mut state = self.state.lock().unwrap();
        let key = ObjectKey::of(obj);
        state.writes.push(Write::Replace(key.clone()));
        state.check_write(&key)?;
        let current = state.objects.get(&key).ok_or_else(|| not_found(&key))?;
        let current_version = current["metadata"]["resourceVersion"].as_str().map(str::to_string);
        if obj.resource_version() != current_version {
            return Err(conflict(&key));
        }
        Ok(state.store(&key, obj.clone()))
    }

    async fn delete<K: Managed>(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        let key = ObjectKey::new(K::KIND, namespace, name);
        state.writes.push(Write::Delete(key.clone()));
        state.check_write(&key)?;
        state.objects.remove(&key).map(|_| ()).ok_or_else(|| not_found(&key))
    }
}
