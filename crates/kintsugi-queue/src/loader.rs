//! Engine loading with source fallback, shared in-flight init, and a
//! bounded wait.
//!
//! [`CapabilityLoader`] tries an ordered list of [`EngineSource`]s --
//! the bundled engine first, then any configured fallbacks -- and
//! short-circuits on the first success. Loading is init-once: a
//! `tokio::sync::OnceCell` guarantees concurrent callers share one
//! in-flight attempt instead of loading twice, a failed attempt stays
//! retryable, and a successful load is permanent for the process
//! lifetime. Each caller's wait is bounded by the configured timeout.
//!
//! The loaded [`ReadyEngine`] also carries the
//! [`CapabilityProfile`]: variant selection happens here, exactly
//! once, never per pipeline call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use kintsugi_pipeline::{BundledEngine, CapabilityProfile, Engine, EngineError};

/// One place an engine can be loaded from.
pub trait EngineSource: Send + Sync {
    /// Short label for logs ("bundled", a mirror name, …).
    fn label(&self) -> &'static str;

    /// Load and initialize the engine.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when this source cannot produce a
    /// working engine; the loader then moves on to the next source.
    fn load(&self) -> Result<Arc<dyn Engine>, EngineError>;
}

/// The engine compiled into this binary; the primary source.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledSource;

impl EngineSource for BundledSource {
    fn label(&self) -> &'static str {
        "bundled"
    }

    fn load(&self) -> Result<Arc<dyn Engine>, EngineError> {
        Ok(Arc::new(BundledEngine::new()))
    }
}

/// A loaded engine plus its once-selected capability profile.
#[derive(Clone)]
pub struct ReadyEngine {
    /// Shared engine handle; read-mostly, never reconfigured mid-run.
    pub engine: Arc<dyn Engine>,
    /// Variants selected from the engine's capabilities at load time.
    pub profile: CapabilityProfile,
}

impl core::fmt::Debug for ReadyEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReadyEngine")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

/// Why the engine could not be made ready.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    /// Every configured source failed to load.
    #[error("engine unavailable: all {attempts} source(s) failed; last error: {last_error}")]
    AllSourcesFailed {
        /// Number of sources tried.
        attempts: usize,
        /// The last source's error, rendered to text.
        last_error: String,
    },

    /// The caller's bounded wait elapsed before any source succeeded.
    #[error("engine load timed out after {0:?}")]
    Timeout(Duration),

    /// The load worker was torn down before finishing.
    #[error("engine load aborted: {0}")]
    Aborted(String),
}

/// Locates and initializes the image-processing engine.
pub struct CapabilityLoader {
    sources: Arc<Vec<Box<dyn EngineSource>>>,
    timeout: Duration,
    ready: OnceCell<ReadyEngine>,
}

impl CapabilityLoader {
    /// Build a loader over an ordered source list; the first source
    /// that loads wins.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn EngineSource>>, timeout: Duration) -> Self {
        Self {
            sources: Arc::new(sources),
            timeout,
            ready: OnceCell::new(),
        }
    }

    /// Loader over just the bundled engine.
    #[must_use]
    pub fn bundled(timeout: Duration) -> Self {
        Self::new(vec![Box::new(BundledSource)], timeout)
    }

    /// Whether a previous [`ensure_ready`](Self::ensure_ready) already
    /// succeeded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// Wait (bounded) for the engine to be ready, loading it if needed.
    ///
    /// Concurrent callers share one in-flight load. Once this returns
    /// `Ok`, it returns `Ok` for the rest of the process lifetime
    /// without re-loading; after a failure the next call retries the
    /// source chain from the top.
    ///
    /// # Errors
    ///
    /// Returns a [`CapabilityError`] if no source produced an engine
    /// within the timeout.
    pub async fn ensure_ready(&self) -> Result<ReadyEngine, CapabilityError> {
        let init = self.ready.get_or_try_init(|| async {
            let sources = Arc::clone(&self.sources);
            // Sources may block (disk, network); keep the async
            // workers free and the caller's timeout enforceable.
            match tokio::task::spawn_blocking(move || try_sources(&sources)).await {
                Ok(result) => result,
                Err(join_error) => Err(CapabilityError::Aborted(join_error.to_string())),
            }
        });

        match tokio::time::timeout(self.timeout, init).await {
            Ok(Ok(ready)) => Ok(ready.clone()),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(CapabilityError::Timeout(self.timeout)),
        }
    }
}

fn try_sources(sources: &[Box<dyn EngineSource>]) -> Result<ReadyEngine, CapabilityError> {
    let mut last_error = "no engine sources configured".to_string();
    for source in sources {
        match source.load() {
            Ok(engine) => {
                let profile = CapabilityProfile::detect(engine.as_ref());
                debug!(source = source.label(), ?profile, "engine ready");
                return Ok(ReadyEngine { engine, profile });
            }
            Err(error) => {
                warn!(source = source.label(), %error, "engine source failed");
                last_error = error.to_string();
            }
        }
    }
    Err(CapabilityError::AllSourcesFailed {
        attempts: sources.len(),
        last_error,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kintsugi_pipeline::DenoiseVariant;

    /// Always fails; counts attempts.
    struct FailingSource(Arc<AtomicUsize>);

    impl EngineSource for FailingSource {
        fn label(&self) -> &'static str {
            "failing"
        }
        fn load(&self) -> Result<Arc<dyn Engine>, EngineError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Malformed("asset missing".to_string()))
        }
    }

    /// Loads the bundled engine; counts how many loads actually ran.
    struct CountingSource(Arc<AtomicUsize>);

    impl EngineSource for CountingSource {
        fn label(&self) -> &'static str {
            "counting"
        }
        fn load(&self) -> Result<Arc<dyn Engine>, EngineError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(BundledEngine::new()))
        }
    }

    /// Blocks long enough to trip a short caller timeout.
    struct SlowSource(Duration);

    impl EngineSource for SlowSource {
        fn label(&self) -> &'static str {
            "slow"
        }
        fn load(&self) -> Result<Arc<dyn Engine>, EngineError> {
            std::thread::sleep(self.0);
            Ok(Arc::new(BundledEngine::new()))
        }
    }

    /// Fails on the first load attempt, succeeds afterwards.
    struct FlakySource(Arc<AtomicUsize>);

    impl EngineSource for FlakySource {
        fn label(&self) -> &'static str {
            "flaky"
        }
        fn load(&self) -> Result<Arc<dyn Engine>, EngineError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EngineError::Malformed("mirror unreachable".to_string()))
            } else {
                Ok(Arc::new(BundledEngine::new()))
            }
        }
    }

    #[tokio::test]
    async fn bundled_loader_becomes_ready() {
        let loader = CapabilityLoader::bundled(Duration::from_secs(5));
        assert!(!loader.is_ready());

        let ready = loader.ensure_ready().await.unwrap();
        assert!(loader.is_ready());
        // The bundled engine has no color NLM; profile selection must
        // have picked the luminance fallback.
        assert_eq!(ready.profile.denoise, DenoiseVariant::LuminanceRecombined);
    }

    #[tokio::test]
    async fn fallback_source_is_used_when_primary_fails() {
        let failures = Arc::new(AtomicUsize::new(0));
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = CapabilityLoader::new(
            vec![
                Box::new(FailingSource(Arc::clone(&failures))),
                Box::new(CountingSource(Arc::clone(&loads))),
            ],
            Duration::from_secs(5),
        );

        assert!(loader.ensure_ready().await.is_ok());
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_sources_failing_reports_last_error() {
        let count = Arc::new(AtomicUsize::new(0));
        let loader = CapabilityLoader::new(
            vec![Box::new(FailingSource(count))],
            Duration::from_secs(5),
        );

        let error = loader.ensure_ready().await.unwrap_err();
        assert!(matches!(
            error,
            CapabilityError::AllSourcesFailed { attempts: 1, .. },
        ));
        assert!(error.to_string().contains("asset missing"));
        assert!(!loader.is_ready());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(CapabilityLoader::new(
            vec![Box::new(CountingSource(Arc::clone(&loads)))],
            Duration::from_secs(5),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let loader = Arc::clone(&loader);
            handles.push(tokio::spawn(async move { loader.ensure_ready().await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1, "load must run exactly once");
    }

    #[tokio::test]
    async fn slow_source_trips_the_timeout() {
        let loader = CapabilityLoader::new(
            vec![Box::new(SlowSource(Duration::from_millis(500)))],
            Duration::from_millis(20),
        );

        let error = loader.ensure_ready().await.unwrap_err();
        assert!(matches!(error, CapabilityError::Timeout(_)));
    }

    #[tokio::test]
    async fn failed_attempt_is_retryable_and_success_is_permanent() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let loader = CapabilityLoader::new(
            vec![Box::new(FlakySource(Arc::clone(&attempts)))],
            Duration::from_secs(5),
        );

        assert!(loader.ensure_ready().await.is_err());
        assert!(loader.ensure_ready().await.is_ok());
        assert!(loader.is_ready());

        // A third call must not load again: readiness is permanent.
        assert!(loader.ensure_ready().await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
