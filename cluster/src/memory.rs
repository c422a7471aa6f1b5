//! An in-memory cluster for tests.
//!
//! It mimics the server-side behavior the lifecycle depends on: namespaced
//! objects need their namespace, deleting a namespace deletes its contents,
//! token secrets are filled in by a controller and `NodePort` services get a
//! node port.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};

use crate::{
    BoxFuture, ClusterApi, ClusterError, ResourceKey, ResourceKind,
    resources::{SERVICE_ACCOUNT_NAME_ANNOTATION, SERVICE_ACCOUNT_TOKEN_TYPE},
};

pub const FAKE_CA_PEM: &str = "-----BEGIN CERTIFICATE-----\nZmFrZQ==\n-----END CERTIFICATE-----\n";
const FIRST_NODE_PORT: u16 = 30000;

/// The bearer token the fake controller mints for a service account.
pub fn fake_token(service_account: &str) -> String {
    format!("token-for-{service_account}")
}

#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ResourceKey, Value>,
    assigned_ports: u16,
    failing_kinds: BTreeSet<ResourceKind>,
    token_delay: usize,
    pending_tokens: BTreeMap<ResourceKey, usize>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with an existing namespace, as if created by someone else.
    pub fn with_namespace(name: &str) -> Self {
        let cluster = Self::new();
        cluster.lock().objects.insert(
            ResourceKey::namespace_key(name),
            json!({ "apiVersion": "v1", "kind": "Namespace", "metadata": { "name": name } }),
        );
        cluster
    }

    /// Every later create of `kind` fails with a server error.
    pub fn fail_creates_of(&self, kind: ResourceKind) {
        self.lock().failing_kinds.insert(kind);
    }

    /// Token secrets stay empty for this many reads.
    pub fn delay_tokens(&self, reads: usize) {
        self.lock().token_delay = reads;
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.lock().objects.contains_key(key)
    }

    pub fn object(&self, key: &ResourceKey) -> Option<Value> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn keys_of(&self, kind: ResourceKind) -> Vec<ResourceKey> {
        self.lock()
            .objects
            .keys()
            .filter(|k| k.kind == kind)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_object(&self, key: &ResourceKey, body: &Value) -> Result<Value, ClusterError> {
        let mut state = self.lock();
        let error = |status: u16, message: String| ClusterError::Api {
            status,
            resource: key.to_string(),
            message,
        };

        if state.failing_kinds.contains(&key.kind) {
            return Err(error(500, "injected failure".to_string()));
        }
        if let Some(ns) = &key.namespace
            && !state.objects.contains_key(&ResourceKey::namespace_key(ns))
        {
            return Err(error(404, format!("namespaces \"{ns}\" not found")));
        }
        if state.objects.contains_key(key) {
            return Err(error(
                409,
                format!("{} \"{}\" already exists", key.kind.plural(), key.name),
            ));
        }

        let mut object = body.clone();
        match key.kind {
            ResourceKind::Service => state.assign_node_ports(&mut object),
            ResourceKind::Secret if object["type"] == SERVICE_ACCOUNT_TOKEN_TYPE => {
                if state.token_delay == 0 {
                    fill_token(&mut object);
                } else {
                    let delay = state.token_delay;
                    state.pending_tokens.insert(key.clone(), delay);
                }
            }
            _ => {}
        }
        state.objects.insert(key.clone(), object.clone());
        Ok(object)
    }

    fn get_object(&self, key: &ResourceKey) -> Option<Value> {
        let mut state = self.lock();
        if let Some(remaining) = state.pending_tokens.get_mut(key) {
            *remaining -= 1;
            if *remaining == 0 {
                state.pending_tokens.remove(key);
                if let Some(object) = state.objects.get_mut(key) {
                    fill_token(object);
                }
            }
        }
        state.objects.get(key).cloned()
    }

    fn delete_object(&self, key: &ResourceKey) -> bool {
        let mut state = self.lock();
        if state.objects.remove(key).is_none() {
            return false;
        }
        if key.kind == ResourceKind::Namespace {
            state
                .objects
                .retain(|k, _| k.namespace.as_deref() != Some(key.name.as_str()));
        }
        true
    }
}

impl State {
    fn assign_node_ports(&mut self, service: &mut Value) {
        let Some(ports) = service
            .pointer_mut("/spec/ports")
            .and_then(Value::as_array_mut)
        else {
            return;
        };
        for port in ports {
            if port.get("nodePort").is_none() {
                port["nodePort"] = json!(FIRST_NODE_PORT + self.assigned_ports);
                self.assigned_ports += 1;
            }
        }
    }
}

fn fill_token(secret: &mut Value) {
    let account = secret
        .pointer(&format!(
            "/metadata/annotations/{}",
            SERVICE_ACCOUNT_NAME_ANNOTATION.replace('/', "~1")
        ))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let namespace = secret
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    secret["data"] = json!({
        "token": STANDARD.encode(fake_token(&account)),
        "ca.crt": STANDARD.encode(FAKE_CA_PEM),
        "namespace": STANDARD.encode(namespace),
    });
}

impl ClusterApi for MemoryCluster {
    fn create<'a>(
        &'a self,
        key: &'a ResourceKey,
        body: &'a Value,
    ) -> BoxFuture<'a, Result<Value, ClusterError>> {
        Box::pin(async move { self.create_object(key, body) })
    }

    fn get<'a>(
        &'a self,
        key: &'a ResourceKey,
    ) -> BoxFuture<'a, Result<Option<Value>, ClusterError>> {
        Box::pin(async move { Ok(self.get_object(key)) })
    }

    fn delete<'a>(&'a self, key: &'a ResourceKey) -> BoxFuture<'a, Result<bool, ClusterError>> {
        Box::pin(async move { Ok(self.delete_object(key)) })
    }
}
