use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use yoman_core::message::InboundMessage;

use crate::pipeline::Router;

/// Per-sender lane buffer: messages queued behind a slow turn.
const LANE_BUFFER: usize = 32;

/// Fans inbound messages into per-sender serial lanes.
///
/// Within a lane the reply to message N is emitted before message N+1 is
/// touched; across senders lanes run concurrently. This is the
/// single-flight guarantee the pipeline's ordering contract needs.
pub struct Dispatcher {
    router: Arc<Router>,
    lanes: DashMap<String, mpsc::Sender<InboundMessage>>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            lanes: DashMap::new(),
        }
    }

    /// Consume the ingress channel until shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("dispatcher started");
        loop {
            let msg = tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("dispatcher shutting down");
                        break;
                    }
                    continue;
                }
            };
            self.route(msg).await;
        }
    }

    async fn route(&self, msg: InboundMessage) {
        let lane_key = msg.sender_id.as_str().to_string();
        let tx = self
            .lanes
            .entry(lane_key.clone())
            .or_insert_with(|| {
                let (tx, mut lane_rx) = mpsc::channel::<InboundMessage>(LANE_BUFFER);
                let router = Arc::clone(&self.router);
                tokio::spawn(async move {
                    while let Some(msg) = lane_rx.recv().await {
                        router.handle(msg).await;
                    }
                });
                tx
            })
            .clone();

        if tx.send(msg).await.is_err() {
            warn!(sender = %lane_key, "sender lane closed — message dropped");
            self.lanes.remove(&lane_key);
        }
    }
}
