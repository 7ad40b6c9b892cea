//! In-memory transport with scripted hub replies

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::transport::Transport;
use crate::error::HubError;
use crate::models::{HubRequest, HubResponse};

#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<Value, HubError>>>,
    sent: Mutex<Vec<HubRequest>>,
    opens: AtomicUsize,
    reply_delay: Mutex<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply body; its `id` is filled in from the request it answers
    pub fn push_reply(&self, reply: Value) {
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn push_replies(&self, reply: Value, count: usize) {
        for _ in 0..count {
            self.push_reply(reply.clone());
        }
    }

    /// Make every reply take `delay` to arrive
    pub fn set_reply_delay(&self, delay: Duration) {
        *self.reply_delay.lock().unwrap() = delay;
    }

    pub fn push_failure(&self, error: HubError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn sent(&self) -> Vec<HubRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self) -> Result<(), HubError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_packed(&self, request: &HubRequest) -> Result<(), HubError> {
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn next_message(&self, request_id: &str) -> Result<HubResponse, HubError> {
        let delay = *self.reply_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(mut reply)) => {
                if let Some(obj) = reply.as_object_mut() {
                    obj.insert("id".to_string(), Value::String(request_id.to_string()));
                }
                Ok(serde_json::from_value(reply)?)
            }
            Some(Err(e)) => Err(e),
            None => Err(HubError::Transport("no scripted reply".to_string())),
        }
    }
}
