//! Process-wide entrypoint registry: the Rust-native replacement for the
//! original's dynamic `importlib.import_module` + `getattr` dispatch
//! (`worker.py`'s `worker_main`). A compiled binary has no interpreter to
//! hand a module name to, so entrypoints are registered by name before
//! `run`/`init` is ever called, and the worker resolves `MPI_RUN_FUNCTION`
//! by lookup instead of import. Entrypoints are async since every rank
//! communicates over Tokio, so the registry stores boxed futures rather
//! than plain closures.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};

type BoxFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send>>;
type JobFn = Box<dyn Fn(Vec<u8>) -> BoxFuture + Send + Sync>;

fn registry() -> &'static Mutex<HashMap<String, JobFn>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, JobFn>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn key(namespace: &str, function: &str) -> String {
    format!("{namespace}::{function}")
}

/// Register a raw byte-in/byte-out async entrypoint under
/// `namespace::function`. Overwrites any prior registration under the
/// same key.
pub fn register_entrypoint(namespace: &str, function: &str, f: JobFn) {
    registry()
        .lock()
        .expect("registry mutex poisoned")
        .insert(key(namespace, function), f);
}

/// Register a typed async entrypoint, handling the `bincode` encode/decode
/// at the boundary so callers work with their own argument/result types.
pub fn register<A, R, F, Fut>(namespace: &str, function: &str, f: F)
where
    A: serde::de::DeserializeOwned,
    R: serde::Serialize,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let f = Arc::new(f);
    let wrapped: JobFn = Box::new(move |bytes: Vec<u8>| {
        let f = f.clone();
        Box::pin(async move {
            let arg: A = crate::wire::deserialize(&bytes)?;
            let result = f(arg).await?;
            Ok(crate::wire::serialize(&result)?)
        })
    });
    register_entrypoint(namespace, function, wrapped);
}

/// Invoke the entrypoint registered under `namespace::function` with
/// `args` (already `bincode`-encoded), returning its encoded result.
pub async fn dispatch(namespace: &str, function: &str, args: Vec<u8>) -> Result<Vec<u8>> {
    let fut = {
        let guard = registry().lock().expect("registry mutex poisoned");
        match guard.get(&key(namespace, function)) {
            Some(f) => f(args),
            None => bail!("no entrypoint registered for {}::{}", namespace, function),
        }
    };
    fut.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Args {
        n: i64,
    }

    #[tokio::test]
    async fn registered_entrypoint_round_trips_through_bincode() {
        register::<Args, i64, _, _>("tests", "double", |a: Args| async move { Ok(a.n * 2) });
        let encoded = crate::wire::serialize(&Args { n: 21 }).unwrap();
        let result_bytes = dispatch("tests", "double", encoded).await.unwrap();
        let result: i64 = crate::wire::deserialize(&result_bytes).unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn unknown_entrypoint_fails() {
        assert!(dispatch("tests", "does-not-exist", Vec::new())
            .await
            .is_err());
    }
}
