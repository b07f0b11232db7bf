use async_trait::async_trait;
use serde_json::Value;
use sphere_rpc::{EventCapability, RpcError, RpcService, SingleEmitter};

use crate::device::Channel;

pub const MOTION_PROTOCOL: &str = "motion";

/// Channel reporting detected motion.
///
/// Has no methods; `send_motion` emits `state` with `true` once exported.
#[derive(Clone, Default)]
pub struct MotionChannel {
    emitter: SingleEmitter,
}

impl MotionChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report motion. Dropped with a warning before the channel is exported.
    pub async fn send_motion(&self) {
        self.emitter.emit("state", &true).await;
    }
}

#[async_trait]
impl RpcService for MotionChannel {
    fn methods(&self) -> Vec<String> {
        Vec::new()
    }

    async fn call(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
        Err(RpcError::MethodNotFound {
            method: method.to_string(),
        })
    }

    fn event_capability(&self) -> EventCapability {
        EventCapability::SinglePayload(self.emitter.clone())
    }
}

impl Channel for MotionChannel {
    fn protocol(&self) -> &str {
        MOTION_PROTOCOL
    }
}
