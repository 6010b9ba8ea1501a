use blake3::Hasher;
use kata_protocol::RpcCall;
use serde_json::Value;
use std::fmt;

/// Cache identity of a query: procedure namespace plus a hash of its input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    pub namespace: Vec<String>,
    pub input_hash: String,
}

impl QueryKey {
    pub fn new(path: &str, input: &Value) -> Self {
        Self {
            namespace: split_path(path),
            input_hash: hash_input(input),
        }
    }

    pub fn for_call(call: &RpcCall) -> Self {
        Self::new(&call.path, &call.input)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.input_hash.get(..12).unwrap_or(self.input_hash.as_str());
        write!(f, "{}#{short}", self.namespace.join("."))
    }
}

/// Selects cache entries by namespace prefix, optionally pinned to one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix {
    namespace: Vec<String>,
    input_hash: Option<String>,
}

impl KeyPrefix {
    /// `"exercise"` matches every `exercise.*` query; `"exercise.list"` every input of it.
    pub fn path(prefix: &str) -> Self {
        Self {
            namespace: split_path(prefix),
            input_hash: None,
        }
    }

    pub fn exact(key: &QueryKey) -> Self {
        Self {
            namespace: key.namespace.clone(),
            input_hash: Some(key.input_hash.clone()),
        }
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        if !key.namespace.starts_with(&self.namespace) {
            return false;
        }
        match &self.input_hash {
            Some(hash) => key.namespace.len() == self.namespace.len() && &key.input_hash == hash,
            None => true,
        }
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn hash_input(input: &Value) -> String {
    let canonical = canonical_json(input);
    let mut hasher = Hasher::new();
    hasher.update(canonical.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// JSON with object keys sorted at every level.
pub fn canonical_json(input: &Value) -> String {
    let mut out = String::new();
    write_canonical(input, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
