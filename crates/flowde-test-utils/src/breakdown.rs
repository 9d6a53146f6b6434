use std::sync::Mutex;

use futures::future::BoxFuture;
use tokio::sync::Notify;

use flowde_core::error::{FlowError, Result};
use flowde_core::traits::{BreakdownRequest, BreakdownSource};

/// A `{"new_steps": [...]}` reply with the given contents.
pub fn breakdown_reply(steps: &[&str]) -> String {
    let items: Vec<_> = steps
        .iter()
        .map(|content| serde_json::json!({ "content": content }))
        .collect();
    serde_json::json!({ "new_steps": items }).to_string()
}

/// Replies with a fixed text and records every request it receives.
pub struct StaticBreakdown {
    reply: String,
    requests: Mutex<Vec<BreakdownRequest>>,
}

impl StaticBreakdown {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn steps(steps: &[&str]) -> Self {
        Self::new(breakdown_reply(steps))
    }

    pub fn requests(&self) -> Vec<BreakdownRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl BreakdownSource for StaticBreakdown {
    fn breakdown(&self, request: BreakdownRequest) -> BoxFuture<'_, Result<String>> {
        self.requests.lock().unwrap().push(request);
        let reply = self.reply.clone();
        Box::pin(async move { Ok(reply) })
    }
}

/// Always fails, like an unreachable model endpoint.
pub struct FailingBreakdown;

impl BreakdownSource for FailingBreakdown {
    fn breakdown(&self, _request: BreakdownRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async { Err(FlowError::Breakdown("model unavailable".into())) })
    }
}

/// Holds its reply until [`GatedBreakdown::release`] is called.
pub struct GatedBreakdown {
    reply: String,
    gate: Notify,
    entered: Notify,
}

impl GatedBreakdown {
    pub fn new(steps: &[&str]) -> Self {
        Self {
            reply: breakdown_reply(steps),
            gate: Notify::new(),
            entered: Notify::new(),
        }
    }

    /// Resolves once a breakdown call is waiting on the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

impl BreakdownSource for GatedBreakdown {
    fn breakdown(&self, _request: BreakdownRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(self.reply.clone())
        })
    }
}
