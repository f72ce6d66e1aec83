use super::hub::{HubWaker, MemoryHub};
use crate::hub::{Fd, Hub, Interest};
use crate::qos::QosApply;
use crate::transport::{Connection, Consumer, MessageCallback};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use task_queue_core::{DeliveryTag, Result, TaskMessage, TransportError};
use tracing::{debug, trace};

#[derive(Default)]
struct BrokerState {
    queue: VecDeque<TaskMessage>,
    callbacks: Vec<MessageCallback>,
    consuming: bool,
    disconnected: bool,
    next_tag: DeliveryTag,
    drain_faults: VecDeque<TransportError>,
    heartbeat_faults: VecDeque<TransportError>,
    prefetch_applied: Vec<u32>,
    heartbeat_checks: Vec<f64>,
    drain_calls: usize,
    delivered: usize,
    waker: Option<(Fd, HubWaker)>,
}

impl BrokerState {
    fn notify_hub(&self) {
        if let Some((fd, waker)) = &self.waker {
            waker.wake(*fd, Interest::Readable);
        }
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<BrokerState>,
    arrived: Condvar,
}

/// An in-process message queue with one consumer.
///
/// Clones share the same queue, so a test or another thread can keep a
/// handle to publish messages, inject faults and inspect what the loop did.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message and return the delivery tag it was given.
    pub fn publish(&self, mut message: TaskMessage) -> DeliveryTag {
        let mut state = self.shared.state.lock();
        state.next_tag += 1;
        message.delivery_tag = state.next_tag;
        let tag = message.delivery_tag;
        state.queue.push_back(message);
        state.notify_hub();
        drop(state);

        self.shared.arrived.notify_all();
        trace!(delivery_tag = tag, "Message published");
        tag
    }

    /// Make the next `drain_events` call fail with `err`.
    pub fn fail_next_drain(&self, err: TransportError) {
        self.shared.state.lock().drain_faults.push_back(err);
        self.shared.arrived.notify_all();
    }

    /// Make the next heartbeat check fail with `err`.
    pub fn fail_next_heartbeat(&self, err: TransportError) {
        self.shared.state.lock().heartbeat_faults.push_back(err);
    }

    /// Drop the connection; it reports not-live from now on.
    pub fn disconnect(&self) {
        let mut state = self.shared.state.lock();
        state.disconnected = true;
        state.notify_hub();
        drop(state);
        self.shared.arrived.notify_all();
    }

    pub fn connection(&self) -> MemoryConnection {
        MemoryConnection {
            broker: self.clone(),
            fd: Fd(3),
            heartbeats: true,
            evented: true,
        }
    }

    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
        }
    }

    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn delivered(&self) -> usize {
        self.shared.state.lock().delivered
    }

    pub fn drain_calls(&self) -> usize {
        self.shared.state.lock().drain_calls
    }

    pub fn is_consuming(&self) -> bool {
        self.shared.state.lock().consuming
    }

    /// Every prefetch count pushed by the consumer, in order.
    pub fn prefetch_applied(&self) -> Vec<u32> {
        self.shared.state.lock().prefetch_applied.clone()
    }

    /// The rate passed to each heartbeat check, in order.
    pub fn heartbeat_checks(&self) -> Vec<f64> {
        self.shared.state.lock().heartbeat_checks.clone()
    }

    fn attach_waker(&self, fd: Fd, waker: HubWaker) {
        let mut state = self.shared.state.lock();
        for _ in 0..state.queue.len() {
            waker.wake(fd, Interest::Readable);
        }
        state.waker = Some((fd, waker));
    }

    fn is_live(&self) -> bool {
        !self.shared.state.lock().disconnected
    }

    /// Hand the next queued message to the consumer's callbacks.
    ///
    /// Callbacks run without the lock held so they may publish or inspect
    /// the broker themselves.
    fn deliver_one(&self) -> Result<bool> {
        let (message, mut callbacks) = {
            let mut state = self.shared.state.lock();
            if state.disconnected {
                return Err(TransportError::ConnectionLost("broker connection closed".to_string()));
            }
            if !state.consuming {
                return Ok(false);
            }
            let Some(message) = state.queue.pop_front() else {
                return Ok(false);
            };
            (message, std::mem::take(&mut state.callbacks))
        };

        debug!(delivery_tag = message.delivery_tag, task = %message.name, "Delivering message");
        for callback in callbacks.iter_mut() {
            callback(message.clone());
        }

        let mut state = self.shared.state.lock();
        callbacks.append(&mut state.callbacks);
        state.callbacks = callbacks;
        state.delivered += 1;
        Ok(true)
    }

    fn wait_for_event(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        state.drain_calls += 1;

        loop {
            if let Some(err) = state.drain_faults.pop_front() {
                return Err(err);
            }
            if state.disconnected {
                return Err(TransportError::ConnectionLost("broker connection closed".to_string()));
            }
            if state.consuming && !state.queue.is_empty() {
                return Ok(());
            }
            if self.shared.arrived.wait_until(&mut state, deadline).timed_out() {
                return Err(TransportError::Timeout);
            }
        }
    }
}

impl fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("MemoryBroker")
            .field("pending", &state.queue.len())
            .field("delivered", &state.delivered)
            .field("consuming", &state.consuming)
            .field("disconnected", &state.disconnected)
            .finish()
    }
}

/// Connection to a [`MemoryBroker`].
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    broker: MemoryBroker,
    fd: Fd,
    heartbeats: bool,
    evented: bool,
}

impl MemoryConnection {
    pub fn with_heartbeats(mut self, enabled: bool) -> Self {
        self.heartbeats = enabled;
        self
    }

    /// Whether the connection offers a descriptor to the async loop.
    pub fn with_evented(mut self, evented: bool) -> Self {
        self.evented = evented;
        self
    }

    pub fn fd(&self) -> Fd {
        self.fd
    }

    /// Route readiness for this connection to `hub`, including messages
    /// already waiting.
    pub fn attach(&self, hub: &MemoryHub) {
        self.broker.attach_waker(self.fd, hub.waker());
    }
}

impl Connection for MemoryConnection {
    fn is_live(&self) -> bool {
        self.broker.is_live()
    }

    fn supports_heartbeats(&self) -> bool {
        self.heartbeats
    }

    fn heartbeat_check(&self, rate: f64) -> Result<()> {
        let mut state = self.broker.shared.state.lock();
        state.heartbeat_checks.push(rate);
        if let Some(err) = state.heartbeat_faults.pop_front() {
            return Err(err);
        }
        if state.disconnected {
            return Err(TransportError::ConnectionLost("missed heartbeats".to_string()));
        }
        Ok(())
    }

    fn drain_events(&self, timeout: Duration) -> Result<()> {
        self.broker.wait_for_event(timeout)?;
        self.broker.deliver_one()?;
        Ok(())
    }

    fn is_evented(&self) -> bool {
        self.evented
    }

    fn register_with_event_loop(&self, hub: &mut dyn Hub) -> Result<()> {
        let broker = self.broker.clone();
        hub.add_reader(
            self.fd,
            Box::new(move || broker.deliver_one().map(|_| ())),
        );
        Ok(())
    }
}

/// Consumer bound to a [`MemoryBroker`].
#[derive(Debug, Clone)]
pub struct MemoryConsumer {
    broker: MemoryBroker,
}

impl MemoryConsumer {
    /// Apply callback for a [`crate::qos::Qos`] that records each prefetch
    /// count on the broker.
    pub fn qos_apply(&self) -> QosApply {
        let broker = self.broker.clone();
        Box::new(move |prefetch_count| {
            let mut state = broker.shared.state.lock();
            if state.disconnected {
                return Err(TransportError::ConnectionLost("broker connection closed".to_string()));
            }
            state.prefetch_applied.push(prefetch_count);
            Ok(())
        })
    }
}

impl Consumer for MemoryConsumer {
    fn register_callback(&mut self, callback: MessageCallback) {
        self.broker.shared.state.lock().callbacks.push(callback);
    }

    fn set_callbacks(&mut self, callbacks: Vec<MessageCallback>) {
        self.broker.shared.state.lock().callbacks = callbacks;
    }

    fn consume(&mut self) -> Result<()> {
        let mut state = self.broker.shared.state.lock();
        if state.disconnected {
            return Err(TransportError::ConnectionLost("broker connection closed".to_string()));
        }
        state.consuming = true;
        drop(state);
        self.broker.shared.arrived.notify_all();
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        self.broker.shared.state.lock().consuming = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback(counter: &Arc<AtomicUsize>) -> MessageCallback {
        let counter = counter.clone();
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_publish_assigns_delivery_tags() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.publish(TaskMessage::new("a", &b""[..])), 1);
        assert_eq!(broker.publish(TaskMessage::new("b", &b""[..])), 2);
        assert_eq!(broker.pending(), 2);
    }

    #[test]
    fn test_drain_delivers_one_message() {
        let broker = MemoryBroker::new();
        let conn = broker.connection();
        let mut consumer = broker.consumer();
        let received = Arc::new(AtomicUsize::new(0));
        consumer.register_callback(counting_callback(&received));
        consumer.consume().unwrap();

        broker.publish(TaskMessage::new("a", &b"1"[..]));
        broker.publish(TaskMessage::new("b", &b"2"[..]));

        conn.drain_events(Duration::from_millis(10)).unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(broker.pending(), 1);
    }

    #[test]
    fn test_drain_times_out_when_idle() {
        let broker = MemoryBroker::new();
        let conn = broker.connection();
        broker.consumer().consume().unwrap();

        let err = conn.drain_events(Duration::from_millis(5)).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(broker.drain_calls(), 1);
    }

    #[test]
    fn test_messages_wait_until_consuming() {
        let broker = MemoryBroker::new();
        let conn = broker.connection();
        broker.publish(TaskMessage::new("a", &b""[..]));

        assert!(conn.drain_events(Duration::from_millis(5)).unwrap_err().is_timeout());
        assert_eq!(broker.pending(), 1);
    }

    #[test]
    fn test_injected_faults() {
        let broker = MemoryBroker::new();
        let conn = broker.connection();
        broker.fail_next_drain(TransportError::Channel("boom".into()));
        assert!(matches!(
            conn.drain_events(Duration::from_millis(5)),
            Err(TransportError::Channel(_))
        ));

        broker.fail_next_heartbeat(TransportError::ConnectionLost("gone".into()));
        assert!(conn.heartbeat_check(2.0).is_err());
        assert!(conn.heartbeat_check(2.0).is_ok());
        assert_eq!(broker.heartbeat_checks(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_disconnect() {
        let broker = MemoryBroker::new();
        let conn = broker.connection();
        assert!(conn.is_live());

        broker.disconnect();
        assert!(!conn.is_live());
        assert!(conn.drain_events(Duration::from_millis(5)).unwrap_err().is_connection_error());
        let mut apply = broker.consumer().qos_apply();
        assert!(apply(5).is_err());
    }

    #[test]
    fn test_attach_wakes_for_pending_messages() {
        let broker = MemoryBroker::new();
        let conn = broker.connection();
        let mut consumer = broker.consumer();
        let received = Arc::new(AtomicUsize::new(0));
        consumer.register_callback(counting_callback(&received));
        consumer.consume().unwrap();
        broker.publish(TaskMessage::new("a", &b""[..]));

        let mut hub = MemoryHub::new().with_idle_timeout(Duration::from_millis(5));
        conn.register_with_event_loop(&mut hub).unwrap();
        conn.attach(&hub);
        hub.create_loop();

        hub.step().unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(broker.delivered(), 1);
    }
}
