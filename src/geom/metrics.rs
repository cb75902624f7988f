//! Opt-in timing hooks for the recorder core.
//!
//! Timing is only collected when the `recorder_metrics` feature is enabled and
//! the target is not WASM (`std::time::Instant` is unavailable there). In every
//! other configuration the calls compile down to plain closure invocations.
//!
//! ```ignore
//! let mut metrics = RecorderMetrics::default();
//! let cache = metrics.time(TimingBucket::CacheBuild, || build_cache(&a, &b));
//! if let Some(report) = metrics.report() {
//!     log::debug!("cache build took {} ns", report.cache_build_ns);
//! }
//! ```

/// Categories of work worth timing in the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    /// Correspondence cache construction (the expensive once-per-step work).
    CacheBuild,
    /// Per-frame interpolation and write-back.
    Interpolation,
    /// Live-mesh fingerprinting during recording polls.
    Fingerprint,
    /// Scene blob (de)serialization.
    Persistence,
}

/// Cumulative nanoseconds per bucket.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimingReport {
    pub cache_build_ns: u64,
    pub interpolation_ns: u64,
    pub fingerprint_ns: u64,
    pub persistence_ns: u64,
}

impl TimingReport {
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.cache_build_ns
            .saturating_add(self.interpolation_ns)
            .saturating_add(self.fingerprint_ns)
            .saturating_add(self.persistence_ns)
    }

    #[must_use]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }
}

#[derive(Debug, Default)]
pub struct RecorderMetrics {
    #[cfg(all(feature = "recorder_metrics", not(target_arch = "wasm32")))]
    report: TimingReport,
}

impl RecorderMetrics {
    pub fn reset(&mut self) {
        #[cfg(all(feature = "recorder_metrics", not(target_arch = "wasm32")))]
        {
            self.report = TimingReport::default();
        }
    }

    /// Accumulated timings, or `None` when metrics are compiled out.
    #[must_use]
    pub fn report(&self) -> Option<TimingReport> {
        #[cfg(all(feature = "recorder_metrics", not(target_arch = "wasm32")))]
        {
            Some(self.report.clone())
        }
        #[cfg(not(all(feature = "recorder_metrics", not(target_arch = "wasm32"))))]
        {
            None
        }
    }

    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(all(feature = "recorder_metrics", not(target_arch = "wasm32")))]
        {
            let start = std::time::Instant::now();
            let result = f();
            let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
            let slot = match bucket {
                TimingBucket::CacheBuild => &mut self.report.cache_build_ns,
                TimingBucket::Interpolation => &mut self.report.interpolation_ns,
                TimingBucket::Fingerprint => &mut self.report.fingerprint_ns,
                TimingBucket::Persistence => &mut self.report.persistence_ns,
            };
            *slot = slot.saturating_add(nanos);
            result
        }

        #[cfg(not(all(feature = "recorder_metrics", not(target_arch = "wasm32"))))]
        {
            let _ = bucket;
            f()
        }
    }
}
