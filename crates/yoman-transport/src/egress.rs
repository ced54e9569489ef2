use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::sync::{watch, Notify};
use tracing::{info, warn};

use yoman_core::config::TransportConfig;
use yoman_core::types::Phone;
use yoman_kv::MemoryKv;

use crate::channel::Transport;
use crate::error::{Result, TransportError};

/// The sole path to the transport.
///
/// Enforces the per-recipient bucket, queues outbound messages while the
/// transport is down (bounded, oldest dropped) and drains the queue with
/// exponential backoff that resets on the first successful dispatch.
pub struct Egress {
    transport: Arc<dyn Transport>,
    kv: Arc<MemoryKv>,
    config: TransportConfig,
    pending: Mutex<VecDeque<(Phone, String)>>,
    kick: Notify,
}

impl Egress {
    pub fn new(transport: Arc<dyn Transport>, kv: Arc<MemoryKv>, config: TransportConfig) -> Self {
        Self {
            transport,
            kv,
            config,
            pending: Mutex::new(VecDeque::new()),
            kick: Notify::new(),
        }
    }

    /// Send text to a recipient, applying the rate bucket.
    ///
    /// On a disconnect-class failure the message is queued for the flush
    /// loop and a synthetic `queued:` id is returned.
    pub async fn send_text(&self, recipient: &Phone, text: &str) -> Result<String> {
        let bucket = yoman_kv::egress_rate(recipient);
        let count = self.kv.incr(&bucket, ChronoDuration::minutes(1));
        if count > i64::from(self.config.recipient_per_minute) {
            warn!(recipient = %recipient, count, "egress bucket exceeded");
            return Err(TransportError::RateLimited);
        }

        match self.transport.send_text(recipient, text).await {
            Ok(id) => Ok(id),
            Err(TransportError::Disconnected(reason)) => {
                warn!(recipient = %recipient, %reason, "transport down — queueing outbound");
                self.enqueue(recipient.clone(), text.to_string());
                Ok(format!("queued:{recipient}"))
            }
            Err(e) => Err(e),
        }
    }

    /// React to an inbound message. Reactions are best-effort — a failure
    /// is logged, never queued.
    pub async fn react(&self, recipient: &Phone, message_id: &str, emoji: &str) {
        if let Err(e) = self.transport.react(recipient, message_id, emoji).await {
            warn!(recipient = %recipient, error = %e, "reaction failed");
        }
    }

    fn enqueue(&self, recipient: Phone, text: String) {
        let mut pending = self.pending.lock().unwrap();
        while pending.len() >= self.config.outbound_queue_size {
            // Oldest entries dropped when full.
            pending.pop_front();
        }
        pending.push_back((recipient, text));
        drop(pending);
        self.kick.notify_one();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Background drain loop. Retries the queue head with exponential
    /// backoff (base/cap from config); the backoff resets on the first
    /// successful dispatch.
    pub async fn run_flush_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("egress flush loop started");
        let mut backoff_secs = self.config.send_backoff_base_secs;
        loop {
            let head = self.pending.lock().unwrap().front().cloned();
            let Some((recipient, text)) = head else {
                tokio::select! {
                    _ = self.kick.notified() => continue,
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }
            };

            match self.transport.send_text(&recipient, &text).await {
                Ok(_) => {
                    self.pending.lock().unwrap().pop_front();
                    backoff_secs = self.config.send_backoff_base_secs;
                }
                Err(e) => {
                    warn!(error = %e, delay_secs = backoff_secs, "flush attempt failed");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                    backoff_secs = (backoff_secs * 2).min(self.config.send_backoff_cap_secs);
                }
            }
        }
        info!("egress flush loop stopped");
    }
}
