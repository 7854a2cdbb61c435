// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use serde_json::Value;

/// A canonical cache key derived from an operation name and its parameters.
///
/// Two calls that are logically identical must collide on the same key regardless of
/// how their parameter objects were assembled, so object keys are serialized in sorted
/// order at every nesting level. The same key identifies the call in the cache and in
/// the pending-flight map, which is what makes deduplication line up with caching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Computes the key for `operation` called with `params` under `prefix`.
    #[must_use]
    pub fn compute(prefix: &str, operation: &str, params: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(params, &mut canonical);
        Self(format!("{prefix}:{operation}:{canonical}"))
    }

}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serializes a JSON value with object keys sorted at every level.
///
/// serde_json's default map representation is already ordered, but canonicalization
/// must not depend on a feature flag a downstream crate might flip (`preserve_order`),
/// so the ordering is made explicit here.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                if let Some(inner) = map.get(*key) {
                    write_canonical(inner, out);
                }
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
        leaf => out.push_str(&leaf.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn key_order_does_not_matter() {
        let a = CacheKey::compute("p", "fetch", &json!({ "page": 1, "query": "x" }));
        let b = CacheKey::compute("p", "fetch", &json!({ "query": "x", "page": 1 }));

        assert_eq!(a, b);
    }

    #[test]
    fn nested_objects_are_canonicalized() {
        let a = CacheKey::compute("p", "fetch", &json!({ "filter": { "b": 2, "a": 1 } }));
        let b = CacheKey::compute("p", "fetch", &json!({ "filter": { "a": 1, "b": 2 } }));

        assert_eq!(a, b);
    }

    #[test]
    fn array_order_matters() {
        let a = CacheKey::compute("p", "fetch", &json!({ "ids": [1, 2] }));
        let b = CacheKey::compute("p", "fetch", &json!({ "ids": [2, 1] }));

        assert_ne!(a, b);
    }

    #[test]
    fn different_operations_differ() {
        let params = json!({ "id": 1 });
        let a = CacheKey::compute("p", "fetch", &params);
        let b = CacheKey::compute("p", "delete", &params);

        assert_ne!(a, b);
    }

    #[test]
    fn different_prefixes_differ() {
        let params = json!({ "id": 1 });
        let a = CacheKey::compute("alpha", "fetch", &params);
        let b = CacheKey::compute("beta", "fetch", &params);

        assert_ne!(a, b);
    }

    #[test]
    fn key_shape_is_readable() {
        let key = CacheKey::compute("docs", "fetch", &json!({ "id": 7 }));
        assert_eq!(key.to_string(), "docs:fetch:{\"id\":7}");
    }

    #[test]
    fn scalar_params_are_supported() {
        let key = CacheKey::compute("p", "ping", &json!(null));
        assert_eq!(key.to_string(), "p:ping:null");
    }
}
