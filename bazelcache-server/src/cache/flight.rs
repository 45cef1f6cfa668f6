//! Request coalescing
//!
//! At most one load per key runs at a time. The load is spawned as its own
//! task and shared by every caller waiting on it, so a caller that goes away
//! (client disconnect, request timeout) does not cancel the load for the
//! others. The task removes its own entry when it finishes.

use crate::core::{CacheError, Result};
use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

type SharedLoad = Shared<BoxFuture<'static, Result<Bytes>>>;

#[derive(Clone, Default)]
pub struct SingleFlight {
    calls: Arc<Mutex<HashMap<String, SharedLoad>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `load` for `key` unless a load for it is already in flight, in
    /// which case wait for that one instead. `load` is dropped unused when
    /// joining an existing flight.
    pub async fn run<F>(&self, key: &str, load: F) -> Result<Bytes>
    where
        F: Future<Output = Result<Bytes>> + Send + 'static,
    {
        let shared = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let shared = self.spawn_load(key.to_string(), load);
                    calls.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        shared.await
    }

    /// Number of loads currently in flight
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn spawn_load<F>(&self, key: String, load: F) -> SharedLoad
    where
        F: Future<Output = Result<Bytes>> + Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        let handle = tokio::spawn(async move {
            let result = AssertUnwindSafe(load).catch_unwind().await;
            // Blocks until the caller that spawned us has inserted the entry
            calls.lock().remove(&key);
            result.unwrap_or_else(|_| {
                error!(key = %key, "cache load panicked");
                Err(CacheError::Fatal("cache load panicked".to_string()))
            })
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "cache load task failed");
                    Err(CacheError::Fatal(format!("load task failed: {}", e)))
                }
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_load() {
        let flight = SingleFlight::new();
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let flight = flight.clone();
            let loads = loads.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("cas/abc", async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Bytes::from_static(b"value"))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), Bytes::from_static(b"value"));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_load_again() {
        let flight = SingleFlight::new();
        let loads = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let loads = loads.clone();
            flight
                .run("k", async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Bytes::new())
                })
                .await
                .unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let flight = SingleFlight::new();
        let result = flight
            .run("k", async { Err(CacheError::NotFound("k".into())) })
            .await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_cancel_load() {
        let flight = SingleFlight::new();
        let loads = Arc::new(AtomicUsize::new(0));

        let first = {
            let flight = flight.clone();
            let loads = loads.clone();
            tokio::spawn(async move {
                flight
                    .run("k", async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(Bytes::from_static(b"done"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("k", async { Ok(Bytes::from_static(b"unused")) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        first.abort();
        assert_eq!(second.await.unwrap().unwrap(), Bytes::from_static(b"done"));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicked_load_does_not_pin_key() {
        let flight = SingleFlight::new();

        fn exploding_load() -> Result<Bytes> {
            panic!("loader blew up")
        }

        let result = flight.run("k", async { exploding_load() }).await;
        assert_eq!(result.unwrap_err().kind(), crate::core::ErrorKind::Fatal);
        assert_eq!(flight.in_flight(), 0);

        let value = flight
            .run("k", async { Ok(Bytes::from_static(b"recovered")) })
            .await
            .unwrap();
        assert_eq!(value, Bytes::from_static(b"recovered"));
    }
}
