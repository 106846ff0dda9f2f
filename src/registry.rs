use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

use crate::http::manager::{HttpHostControl, HttpHostManager};

#[derive(Clone, Debug)]
pub struct ContractMetadata {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl ContractMetadata {
    pub fn new(inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

struct ContractEntry {
    func: Arc<dyn Func>,
    metadata: Option<Arc<ContractMetadata>>,
}

struct RegistryInner {
    funcs: HashMap<String, Arc<ContractEntry>>,
    bindings: HashMap<String, String>,
}

impl RegistryInner {
    fn new() -> Self {
        Self {
            funcs: HashMap::new(),
            bindings: HashMap::new(),
        }
    }
}

pub struct Registry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub trait Func: Send + Sync {
    fn call(&self, ctx: &mut Context, input: Value, meta: Option<Value>) -> Result<Value>;
}

impl<F> Func for F
where
    F: Fn(&mut Context, Value, Option<Value>) -> Result<Value> + Send + Sync + 'static,
{
    fn call(&self, ctx: &mut Context, input: Value, meta: Option<Value>) -> Result<Value> {
        (self)(ctx, input, meta)
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::new())),
        }
    }

    pub fn register<F>(&self, name: impl Into<String>, func: F)
    where
        F: Func + 'static,
    {
        self.register_entry(name, func, None);
    }

    /// Register a contract whose input is filtered down to `metadata.inputs`
    /// and whose output is projected onto `metadata.outputs`.
    pub fn register_with_metadata<F>(&self, name: impl Into<String>, func: F, metadata: ContractMetadata)
    where
        F: Func + 'static,
    {
        self.register_entry(name, func, Some(Arc::new(metadata)));
    }

    fn register_entry<F>(&self, name: impl Into<String>, func: F, metadata: Option<Arc<ContractMetadata>>)
    where
        F: Func + 'static,
    {
        let entry = Arc::new(ContractEntry {
            func: Arc::new(func),
            metadata,
        });
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner.funcs.insert(name.into(), entry);
    }

    pub fn set_binding(&self, contract: impl Into<String>, implementation: impl Into<String>) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner
            .bindings
            .insert(contract.into(), implementation.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.lock().expect("registry poisoned");
        find_entry(&inner, name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("registry poisoned");
        let mut names: Vec<String> = inner.funcs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn call(
        &self,
        ctx: &mut Context,
        name: &str,
        input: Value,
        meta: Option<Value>,
    ) -> Result<Value> {
        ctx.call(name, input, meta)
    }

    pub fn context(&self) -> Context {
        Context::new(self.inner.clone())
    }
}

fn enforce_outputs(value: Value, allowed: &[String]) -> Value {
    if allowed.is_empty() {
        return value;
    }
    match value {
        Value::Object(mut map) => {
            let mut filtered = Map::new();
            for key in allowed {
                let entry = map.shift_remove(key).unwrap_or(Value::Null);
                filtered.insert(key.clone(), entry);
            }
            Value::Object(filtered)
        }
        other => other,
    }
}

fn sanitize_input(value: Value, allowed: &[String]) -> Value {
    let original = match value {
        Value::Object(map) => map,
        other => {
            let mut wrapper = Map::new();
            wrapper.insert("value".to_string(), other);
            wrapper
        }
    };
    if allowed.is_empty() {
        return Value::Object(original);
    }
    let mut filtered = Map::new();
    for key in allowed {
        if let Some(entry) = original.get(key) {
            filtered.insert(key.clone(), entry.clone());
        }
    }
    Value::Object(filtered)
}

fn find_entry(inner: &RegistryInner, name: &str) -> Option<Arc<ContractEntry>> {
    if let Some(entry) = inner.funcs.get(name) {
        return Some(entry.clone());
    }
    inner
        .bindings
        .get(name)
        .filter(|binding| binding.as_str() != name)
        .and_then(|binding| inner.funcs.get(binding).cloned())
}

pub struct Context {
    registry: Arc<Mutex<RegistryInner>>,
    http_hosts: HttpHostManager,
    log_tag_stack: Vec<Map<String, Value>>,
}

impl Context {
    fn new(registry: Arc<Mutex<RegistryInner>>) -> Self {
        Self {
            registry,
            http_hosts: HttpHostManager::new(),
            log_tag_stack: Vec::new(),
        }
    }

    pub fn call(&mut self, name: &str, input: Value, meta: Option<Value>) -> Result<Value> {
        let entry = {
            let inner = self.registry.lock().expect("registry poisoned");
            find_entry(&inner, name)
        }
        .ok_or_else(|| anyhow!("function not found: {name}"))?;

        let prepared = match entry.metadata.as_ref() {
            Some(meta) => sanitize_input(input, &meta.inputs),
            None => input,
        };
        let value = entry.func.call(self, prepared, meta)?;
        Ok(match entry.metadata.as_ref() {
            Some(meta) => enforce_outputs(value, &meta.outputs),
            None => value,
        })
    }

    pub fn register_http_host(&mut self, control: HttpHostControl) -> Value {
        self.http_hosts.register(control)
    }

    pub fn stop_http_host(&mut self, handle: &Value) -> Result<Value> {
        self.http_hosts.stop(handle)
    }

    pub fn stop_all_http_hosts(&mut self) {
        self.http_hosts.stop_all();
    }

    pub fn running_http_hosts(&self) -> usize {
        self.http_hosts.running()
    }

    pub fn registry_clone(&self) -> Registry {
        Registry {
            inner: self.registry.clone(),
        }
    }

    pub fn push_log_tags(&mut self, tags: Map<String, Value>) {
        if tags.is_empty() {
            return;
        }
        self.log_tag_stack.push(tags);
    }

    pub fn pop_log_tags(&mut self) {
        self.log_tag_stack.pop();
    }

    pub fn log_tag_stack(&self) -> &[Map<String, Value>] {
        &self.log_tag_stack
    }

    pub fn binding_for(&self, contract: &str) -> Option<String> {
        let inner = self.registry.lock().expect("registry poisoned");
        inner.bindings.get(contract).cloned()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.http_hosts.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binding_routes_to_implementation() {
        let registry = Registry::new();
        registry.register("presenton://impl/echo@1", |_ctx: &mut Context, input: Value, _meta| {
            Ok(input)
        });
        registry.set_binding("presenton://contract/echo@1", "presenton://impl/echo@1");
        let mut ctx = registry.context();
        let out = ctx
            .call("presenton://contract/echo@1", json!({ "a": 1 }), None)
            .unwrap();
        assert_eq!(out, json!({ "a": 1 }));
    }

    #[test]
    fn metadata_filters_inputs_and_outputs() {
        let registry = Registry::new();
        registry.register_with_metadata(
            "presenton://impl/keys@1",
            |_ctx: &mut Context, input: Value, _meta| {
                let count = input.as_object().map(|m| m.len()).unwrap_or(0);
                Ok(json!({ "count": count, "noise": true }))
            },
            ContractMetadata::new(&["schema"], &["count"]),
        );
        let mut ctx = registry.context();
        let out = ctx
            .call("presenton://impl/keys@1", json!({ "schema": {}, "extra": 1 }), None)
            .unwrap();
        assert_eq!(out, json!({ "count": 1 }));
    }

    #[test]
    fn unknown_function_errors() {
        let registry = Registry::new();
        let mut ctx = registry.context();
        let err = ctx.call("presenton://missing@1", Value::Null, None).unwrap_err();
        assert!(err.to_string().contains("function not found"));
    }
}
