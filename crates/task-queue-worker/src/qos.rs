//! Prefetch credit (basic.qos) bookkeeping.
//!
//! The desired prefetch count may be changed from anywhere through a
//! [`QosHandle`]; the value is only pushed to the broker when the loop
//! calls [`Qos::update`] between waits, so several changes made while the
//! loop was busy collapse into one broker call.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use task_queue_core::{Result, PREFETCH_COUNT_MAX};
use tracing::{debug, warn};

/// Pushes a prefetch count to the broker.
pub type QosApply = Box<dyn FnMut(u32) -> Result<()> + Send>;

/// Shared, lock-free view of the desired prefetch count.
///
/// A count of 0 means "unlimited"; the eventual increments and decrements
/// leave it alone.
#[derive(Debug, Clone, Default)]
pub struct QosHandle {
    value: Arc<AtomicU32>,
}

impl QosHandle {
    pub fn new(initial: u32) -> Self {
        QosHandle {
            value: Arc::new(AtomicU32::new(initial)),
        }
    }

    pub fn value(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    pub fn set(&self, value: u32) {
        self.value.store(value, Ordering::Release);
    }

    /// Raise the credit by `n`; applied on the loop's next pass.
    pub fn increment_eventually(&self, n: u32) -> u32 {
        self.modify(|v| if v == 0 { v } else { v.saturating_add(n) })
    }

    /// Lower the credit by `n`, never below 1.
    pub fn decrement_eventually(&self, n: u32) -> u32 {
        self.modify(|v| if v == 0 { v } else { v.saturating_sub(n).max(1) })
    }

    fn modify(&self, f: impl Fn(u32) -> u32) -> u32 {
        let prev = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(f(v)))
            .unwrap_or_else(|v| v);
        f(prev)
    }
}

/// Flow-control gate: the last value applied to the broker against the
/// desired one.
pub struct Qos {
    desired: QosHandle,
    previous: Option<u32>,
    apply: QosApply,
}

impl Qos {
    pub fn new(initial: u32, apply: QosApply) -> Self {
        Qos {
            desired: QosHandle::new(initial),
            previous: None,
            apply,
        }
    }

    /// Another handle onto the desired value.
    pub fn handle(&self) -> QosHandle {
        self.desired.clone()
    }

    pub fn value(&self) -> u32 {
        self.desired.value()
    }

    /// Last value successfully applied, `None` before the first update.
    pub fn previous(&self) -> Option<u32> {
        self.previous
    }

    pub fn should_update(&self) -> bool {
        self.previous != Some(self.desired.value())
    }

    /// Push the desired value to the broker if it differs from the last one
    /// applied. Returns the value now in effect.
    pub fn update(&mut self) -> Result<u32> {
        let desired = self.desired.value();
        self.set(desired)
    }

    /// Apply only if the values diverged. Returns whether the broker was called.
    pub fn maybe_update(&mut self) -> Result<bool> {
        if !self.should_update() {
            return Ok(false);
        }
        self.update()?;
        Ok(true)
    }

    fn set(&mut self, pcount: u32) -> Result<u32> {
        if self.previous == Some(pcount) {
            return Ok(pcount);
        }

        let wire_value = if pcount > PREFETCH_COUNT_MAX {
            warn!(
                prefetch_count = pcount,
                "QoS: Disabled: prefetch_count exceeds {}", PREFETCH_COUNT_MAX
            );
            0
        } else {
            pcount
        };

        debug!(prefetch_count = wire_value, "basic.qos");
        (self.apply)(wire_value)?;
        self.previous = Some(pcount);
        Ok(pcount)
    }
}

impl fmt::Debug for Qos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Qos")
            .field("value", &self.desired.value())
            .field("previous", &self.previous)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use task_queue_core::TransportError;

    fn recording_qos(initial: u32) -> (Qos, Arc<Mutex<Vec<u32>>>) {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = applied.clone();
        let qos = Qos::new(
            initial,
            Box::new(move |n| {
                sink.lock().push(n);
                Ok(())
            }),
        );
        (qos, applied)
    }

    #[test]
    fn test_first_update_always_applies() {
        let (mut qos, applied) = recording_qos(10);
        assert!(qos.should_update());
        assert_eq!(qos.update().unwrap(), 10);
        assert_eq!(*applied.lock(), vec![10]);
        assert!(!qos.should_update());
    }

    #[test]
    fn test_changes_are_batched() {
        let (mut qos, applied) = recording_qos(10);
        qos.update().unwrap();

        let handle = qos.handle();
        handle.increment_eventually(5);
        handle.decrement_eventually(2);
        handle.increment_eventually(1);

        assert!(qos.maybe_update().unwrap());
        assert!(!qos.maybe_update().unwrap());
        assert_eq!(*applied.lock(), vec![10, 14]);
    }

    #[test]
    fn test_unlimited_credit_is_left_alone() {
        let handle = QosHandle::new(0);
        assert_eq!(handle.increment_eventually(3), 0);
        assert_eq!(handle.decrement_eventually(3), 0);
    }

    #[test]
    fn test_decrement_floors_at_one() {
        let handle = QosHandle::new(4);
        assert_eq!(handle.decrement_eventually(10), 1);
        assert_eq!(handle.value(), 1);
    }

    #[test]
    fn test_oversized_count_sent_as_unlimited() {
        let (mut qos, applied) = recording_qos(PREFETCH_COUNT_MAX + 1);
        assert_eq!(qos.update().unwrap(), PREFETCH_COUNT_MAX + 1);
        assert_eq!(*applied.lock(), vec![0]);
        assert_eq!(qos.previous(), Some(PREFETCH_COUNT_MAX + 1));
    }

    #[test]
    fn test_failed_apply_keeps_previous() {
        let mut qos = Qos::new(
            8,
            Box::new(|_| Err(TransportError::ConnectionLost("broker went away".into()))),
        );
        assert!(qos.update().is_err());
        assert_eq!(qos.previous(), None);
        assert!(qos.should_update());
    }

    proptest! {
        #[test]
        fn prop_apply_iff_values_diverge(changes in proptest::collection::vec(proptest::option::of(0u32..100), 1..40)) {
            let (mut qos, applied) = recording_qos(1);
            let handle = qos.handle();
            let mut expected_calls = 0;

            for change in changes {
                if let Some(value) = change {
                    handle.set(value);
                }
                let diverged = qos.previous() != Some(handle.value());
                let called = qos.maybe_update().unwrap();
                prop_assert_eq!(called, diverged);
                if called {
                    expected_calls += 1;
                }
                prop_assert_eq!(qos.previous(), Some(handle.value()));
            }

            prop_assert_eq!(applied.lock().len(), expected_calls);
        }
    }
}
