//! Chaotic blob store wrapper for fault injection testing
//!
//! Wraps a [`BlobStore`] and randomly fails or stalls fetches so retry and
//! timeout handling in the session can be exercised deterministically.

use std::{
    future::{Future, pending},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use murmur_core::{FetchError, RemoteMediaObject};

use crate::{backend::BlobStore, error::TransportError};

/// How an injected fault manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail immediately with a transient storage error.
    Fail,
    /// Never complete; only a caller-side timeout ends the attempt.
    Hang,
}

/// Blob store wrapper that randomly injects fetch faults.
///
/// Delegates to an underlying store but faults fetches based on a configured
/// rate. Uploads always go through so only the read path is exercised. The
/// RNG state sits behind `Arc<Mutex<>>`, making the wrapper Clone and shared
/// across spawned fetch tasks.
#[derive(Clone)]
pub struct ChaoticBlobStore<B: BlobStore> {
    inner: B,
    /// Fault rate (0.0 = never, 1.0 = always)
    failure_rate: f64,
    fault: Fault,
    rng: Arc<Mutex<ChaoticRng>>,
    /// Fetch attempts seen, faulted or not
    fetch_count: Arc<Mutex<usize>>,
}

/// Linear congruential generator, reproducible per seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<B: BlobStore> ChaoticBlobStore<B> {
    /// Wrap `inner`, faulting fetches at `failure_rate` with a fixed seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: B, failure_rate: f64, fault: Fault) -> Self {
        Self::with_seed(inner, failure_rate, fault, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: B, failure_rate: f64, fault: Fault, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            fault,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            fetch_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying store.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Total number of fetches attempted through this wrapper.
    #[allow(clippy::expect_used)]
    pub fn fetch_count(&self) -> usize {
        *self.fetch_count.lock().expect("fetch_count mutex poisoned")
    }

    #[allow(clippy::expect_used)]
    fn next_fault(&self) -> Option<Fault> {
        *self.fetch_count.lock().expect("fetch_count mutex poisoned") += 1;
        let roll = self.rng.lock().expect("ChaoticRng mutex poisoned").next();
        (roll < self.failure_rate).then_some(self.fault)
    }
}

impl<B: BlobStore> BlobStore for ChaoticBlobStore<B> {
    fn upload(
        &self,
        bytes: Bytes,
        content_type: &str,
    ) -> impl Future<Output = Result<String, TransportError>> + Send {
        self.inner.upload(bytes, content_type)
    }

    fn fetch(&self, url: &str) -> impl Future<Output = Result<RemoteMediaObject, FetchError>> + Send {
        let fault = self.next_fault();
        let inner = self.inner.clone();
        let url = url.to_owned();
        async move {
            match fault {
                Some(Fault::Fail) => {
                    tracing::debug!(%url, "injected fetch failure");
                    Err(FetchError::Storage("chaotic failure injection".to_string()))
                },
                Some(Fault::Hang) => {
                    tracing::debug!(%url, "injected fetch stall");
                    pending().await
                },
                None => inner.fetch(&url).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    fn store_with_blob() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.insert_blob("mem://a", "image/png", Bytes::from_static(b"png"));
        backend
    }

    #[tokio::test]
    async fn zero_rate_passes_through() {
        let chaotic = ChaoticBlobStore::new(store_with_blob(), 0.0, Fault::Fail);
        for _ in 0..10 {
            assert!(BlobStore::fetch(&chaotic, "mem://a").await.is_ok());
        }
        assert_eq!(chaotic.fetch_count(), 10);
    }

    #[tokio::test]
    async fn full_rate_always_fails_transiently() {
        let chaotic = ChaoticBlobStore::new(store_with_blob(), 1.0, Fault::Fail);
        let error = BlobStore::fetch(&chaotic, "mem://a").await.unwrap_err();
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn same_seed_same_faults() {
        let outcomes = |seed| async move {
            let chaotic = ChaoticBlobStore::with_seed(store_with_blob(), 0.5, Fault::Fail, seed);
            let mut results = Vec::new();
            for _ in 0..32 {
                results.push(BlobStore::fetch(&chaotic, "mem://a").await.is_ok());
            }
            results
        };

        assert_eq!(outcomes(7).await, outcomes(7).await);
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between 0.0 and 1.0")]
    fn rejects_out_of_range_rate() {
        let _ = ChaoticBlobStore::new(MemoryBackend::new(), 1.5, Fault::Fail);
    }
}
