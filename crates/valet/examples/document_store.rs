// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "this is an example")]

//! Fronts a toy in-memory document store with a `ServiceAdapter`.
//!
//! Run with:
//!
//! ```text
//! cargo run --example document_store
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pulse::Clock;
use serde_json::{Value, json};
use valet::{CallOptions, Dependency, Failure, Operation, RetryPolicy, ServiceAdapter};

#[tokio::main]
async fn main() -> Result<(), valet::AdapterError> {
    let clock = Clock::new_tokio();
    let store: Arc<Mutex<HashMap<String, Value>>> = Arc::new(Mutex::new(HashMap::new()));

    let fetch_store = Arc::clone(&store);
    let put_store = Arc::clone(&store);

    let adapter = ServiceAdapter::builder("document-store", &clock)
        .capability("documents")
        .retry(RetryPolicy {
            retryable_operations: ["fetch_document".to_owned()].into(),
            base_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        })
        .operation(
            Operation::query("fetch_document", move |params, _ctx| {
                let store = Arc::clone(&fetch_store);
                async move {
                    let id = params["id"].as_str().unwrap_or_default().to_owned();
                    store
                        .lock()
                        .get(&id)
                        .cloned()
                        .ok_or_else(|| Failure::operation(format!("document '{id}' not found")).permanent())
                }
            })
            .cacheable(true),
        )
        .operation(Operation::mutation("put_document", move |params, _ctx| {
            let store = Arc::clone(&put_store);
            async move {
                let id = params["id"].as_str().unwrap_or_default().to_owned();
                let _ = store.lock().insert(id.clone(), params.clone());
                Ok(json!({ "stored": id }))
            }
        }))
        .dependency(Dependency::new("blob-store", || async { true }).timeout(Duration::from_secs(2)))
        .build();

    adapter.initialize(Default::default()).await?;
    adapter.start().await?;

    let put = adapter
        .execute("put_document", json!({ "id": "a-1", "body": "hello" }), CallOptions::default())
        .await;
    println!("put: success={} id={}", put.success, put.metadata.operation_id);

    // First fetch goes to the backend, the second is served from the cache.
    for _ in 0..2 {
        let fetched = adapter
            .execute("fetch_document", json!({ "id": "a-1" }), CallOptions::default())
            .await;
        println!(
            "fetch: success={} cache_hit={} data={}",
            fetched.success,
            fetched.metadata.cache_hit,
            fetched.data.unwrap_or(Value::Null)
        );
    }

    let snapshot = adapter.metrics();
    println!(
        "metrics: operations={} cache_hit_rate={:.2} avg_latency={:?}",
        snapshot.operation_count, snapshot.cache_hit_rate, snapshot.average_latency
    );

    let status = adapter.status();
    println!("status: lifecycle={} health={}", status.lifecycle, status.health);

    adapter.stop().await?;
    adapter.destroy().await?;
    Ok(())
}
