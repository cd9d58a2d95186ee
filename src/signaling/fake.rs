//! Hand-written [`SignalingTransport`] test double, in the same style as
//! `rtc::fake`: a scripted responder plus a call log, no mocking crate.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{RoomError, Result};
use crate::signaling::transport::SignalingTransport;

type Responder = Box<dyn Fn(&str, &Value) -> Result<Value> + Send + Sync>;

/// Replies to every `request()` by consulting a per-method script,
/// falling back to `Ok(Value::Null)` for methods nobody scripted a
/// response for (most fire-and-forget notifications-as-requests don't
/// need one). Every call is recorded for assertions.
pub struct FakeSignalingTransport {
    responders: Mutex<std::collections::HashMap<String, Responder>>,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl Default for FakeSignalingTransport {
    fn default() -> Self {
        Self {
            responders: Mutex::new(std::collections::HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeSignalingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a fixed response for every request to `method`.
    pub fn on(&self, method: &str, response: Value) {
        self.responders
            .lock()
            .unwrap()
            .insert(method.to_string(), Box::new(move |_, _| Ok(response.clone())));
    }

    /// Script a request to fail every time.
    pub fn fail(&self, method: &str, err: impl Fn() -> RoomError + Send + Sync + 'static) {
        self.responders
            .lock()
            .unwrap()
            .insert(method.to_string(), Box::new(move |_, _| Err(err())));
    }
}

#[async_trait]
impl SignalingTransport for FakeSignalingTransport {
    async fn request(&self, method: &'static str, data: Value) -> Result<Value> {
        self.calls.lock().unwrap().push((method.to_string(), data.clone()));
        let responders = self.responders.lock().unwrap();
        match responders.get(method) {
            Some(responder) => responder(method, &data),
            None => Ok(Value::Null),
        }
    }

    async fn close(&self) {}
}
