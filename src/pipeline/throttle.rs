use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

/// Drops frames that arrive sooner than `interval` after the last frame
/// that was let through. Nothing is queued.
#[derive(Debug)]
pub struct FrameThrottle {
    interval: Duration,
    last_processed: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_processed: None,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_processed {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_processed = Some(now);
        true
    }
}

/// Guards the periodic capture: one cycle in flight at a time, and no two
/// captures closer together than the requested interval.
#[derive(Clone, Debug, Default)]
pub struct CaptureGate {
    in_flight: Arc<AtomicBool>,
    last_capture: Arc<Mutex<Option<Instant>>>,
}

impl CaptureGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the gate, or `None` if a capture is still running or the last
    /// one started less than `min_interval` ago. The claim is released when
    /// the returned guard drops.
    pub fn try_begin(&self, now: Instant, min_interval: Duration) -> Option<CaptureGuard> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let mut last = match self.last_capture.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = *last {
            if now.saturating_duration_since(previous) < min_interval {
                self.in_flight.store(false, Ordering::Release);
                return None;
            }
        }
        *last = Some(now);

        Some(CaptureGuard {
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct CaptureGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}
