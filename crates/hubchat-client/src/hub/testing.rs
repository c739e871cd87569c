//! In-process stand-in for the hub, used by manager and page tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HubError;
use crate::hub::transport::{EventSink, HubTransport, TransportEvent, TransportFactory};

#[derive(Default)]
pub(crate) struct FakeHub {
    invocations: Mutex<Vec<(String, Vec<Value>)>>,
    credentials: Mutex<Vec<String>>,
    sinks: Mutex<Vec<EventSink>>,
    fail_invokes: AtomicBool,
    fail_start: AtomicBool,
    invoke_delay: Mutex<Duration>,
    stops: AtomicUsize,
}

impl FakeHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn TransportFactory> {
        Arc::new(FakeFactory(self.clone()))
    }

    pub fn invocations(&self) -> Vec<(String, Vec<Value>)> {
        self.invocations.lock().unwrap().clone()
    }

    /// `SendMessage` invocations as `(receiver, content)`.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.invocations()
            .into_iter()
            .filter(|(target, _)| target == "SendMessage")
            .map(|(_, args)| {
                (
                    args[0].as_i64().unwrap(),
                    args[1].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn set_fail_invokes(&self, fail: bool) {
        self.fail_invokes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_invoke_delay(&self, delay: Duration) {
        *self.invoke_delay.lock().unwrap() = delay;
    }

    /// Deliver `event` on the most recently created transport.
    pub fn push(&self, event: TransportEvent) {
        let sinks = self.sinks.lock().unwrap();
        let sink = sinks.last().expect("no transport created yet");
        let _ = sink.send(event);
    }

    pub fn push_invocation(&self, target: &str, argument: Value) {
        self.push(TransportEvent::Invocation {
            target: target.to_string(),
            arguments: vec![argument],
        });
    }
}

struct FakeFactory(Arc<FakeHub>);

impl TransportFactory for FakeFactory {
    fn create(&self, credential: &str, events: EventSink) -> Result<Arc<dyn HubTransport>, HubError> {
        self.0.credentials.lock().unwrap().push(credential.to_string());
        self.0.sinks.lock().unwrap().push(events.clone());
        Ok(Arc::new(FakeTransport {
            hub: self.0.clone(),
            events,
        }))
    }
}

struct FakeTransport {
    hub: Arc<FakeHub>,
    events: EventSink,
}

#[async_trait]
impl HubTransport for FakeTransport {
    async fn start(&self) -> Result<(), HubError> {
        if self.hub.fail_start.load(Ordering::SeqCst) {
            return Err(HubError::Handshake("rejected".into()));
        }
        Ok(())
    }

    async fn stop(&self) {
        self.hub.stops.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Closed { error: None });
    }

    async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value, HubError> {
        let delay = *self.hub.invoke_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.hub.fail_invokes.load(Ordering::SeqCst) {
            return Err(HubError::NotConnected);
        }
        self.hub
            .invocations
            .lock()
            .unwrap()
            .push((target.to_string(), arguments));
        Ok(Value::Null)
    }
}

/// Poll `condition` until it holds, yielding to spawned tasks in between.
pub(crate) async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
