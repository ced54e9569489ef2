//! Construction and wiring of every subsystem.

use std::sync::Arc;

use anyhow::Context;
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use yoman_core::clock::Clock;
use yoman_core::config::YomanConfig;
use yoman_core::types::Phone;
use yoman_domain::{ContactService, EventService, MessageLog, ReminderService, TaskService};
use yoman_kv::MemoryKv;
use yoman_nlu::compare::ComparisonLog;
use yoman_nlu::{CostAccountant, NluEnsemble};
use yoman_router::jobs::next_rollout_at;
use yoman_router::{DeliveryHandler, Dispatcher, Router, RouterDeps};
use yoman_scheduler::{JobKind, SchedulerEngine, SchedulerHandle, WorkerPool};
use yoman_sessions::SessionManager;
use yoman_transport::{Egress, Ingress, Transport};
use yoman_users::{AuthManager, UserService};

/// The assembled application: spawned loops plus the ingress entry point.
pub struct App {
    pub ingress: Ingress,
    pub shutdown_tx: watch::Sender<bool>,
}

/// Build every subsystem and spawn the long-running loops.
pub fn build(
    config: YomanConfig,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<App> {
    let db_path = config.database.path.clone();
    if let Some(dir) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(dir).context("creating database directory")?;
    }
    let open = || Connection::open(&db_path).context("opening sqlite database");

    let kv = Arc::new(MemoryKv::new(Arc::clone(&clock)));
    let sessions = Arc::new(SessionManager::new(Arc::clone(&kv), Arc::clone(&clock)));

    let users = Arc::new(UserService::new(open()?, Arc::clone(&clock))?);
    let auth = Arc::new(AuthManager::new(
        Arc::clone(&users),
        Arc::clone(&kv),
        Arc::clone(&clock),
        config.auth.clone(),
    ));

    let domain_db = yoman_domain::open_shared(open()?)?;
    let events = Arc::new(EventService::new(
        domain_db.clone(),
        Arc::clone(&clock),
        config.events.clone(),
    ));
    let reminders = Arc::new(ReminderService::new(domain_db.clone(), Arc::clone(&clock)));
    let tasks = Arc::new(TaskService::new(domain_db.clone(), Arc::clone(&clock)));
    let contacts = Arc::new(ContactService::new(domain_db.clone()));
    let message_log = Arc::new(MessageLog::new(domain_db, Arc::clone(&clock)));

    let egress = Arc::new(Egress::new(
        Arc::clone(&transport),
        Arc::clone(&kv),
        config.transport.clone(),
    ));

    // Operator cost alerts flow through a channel into egress.
    let (alert_tx, mut alert_rx) = mpsc::channel::<String>(16);
    let operator_phone = Phone::normalize(&config.operator.alert_phone);
    {
        let egress = Arc::clone(&egress);
        tokio::spawn(async move {
            while let Some(alert) = alert_rx.recv().await {
                match &operator_phone {
                    Some(phone) => {
                        if let Err(e) = egress.send_text(phone, &alert).await {
                            warn!(error = %e, "operator alert send failed");
                        }
                    }
                    None => warn!(%alert, "operator alert dropped — no phone configured"),
                }
            }
        });
    }

    let costs = Arc::new(CostAccountant::new(
        open()?,
        Arc::clone(&clock),
        config.operator.clone(),
        Some(alert_tx),
    )?);
    let compare = Arc::new(ComparisonLog::new(open()?)?);
    let nlu = Arc::new(NluEnsemble::from_config(
        &config.nlu,
        Arc::clone(&clock),
        Some(costs),
        Some(compare),
    ));

    let scheduler = SchedulerHandle::new(open()?, Arc::clone(&clock))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Scheduler engine + worker pool.
    let (fired_tx, fired_rx) = mpsc::channel(64);
    let engine = SchedulerEngine::new(scheduler.clone(), fired_tx);
    tokio::spawn(engine.run(shutdown_rx.clone()));

    let handler = Arc::new(DeliveryHandler {
        clock: Arc::clone(&clock),
        users: Arc::clone(&users),
        events: Arc::clone(&events),
        reminders: Arc::clone(&reminders),
        tasks: Arc::clone(&tasks),
        message_log: Arc::clone(&message_log),
        scheduler: scheduler.clone(),
        egress: Arc::clone(&egress),
        config: config.scheduler.clone(),
    });
    let pool = WorkerPool::new(
        scheduler.clone(),
        handler,
        config.scheduler.clone(),
        Arc::clone(&clock),
    );
    tokio::spawn(pool.run(fired_rx, shutdown_rx.clone()));

    // Seed the daily rollout if none is pending.
    let has_rollout = scheduler
        .list_pending()?
        .iter()
        .any(|j| j.kind == JobKind::DailyRollout);
    if !has_rollout {
        let at = next_rollout_at(clock.now_utc(), config.scheduler.daily_hour_utc);
        scheduler.enqueue(JobKind::DailyRollout, at)?;
        info!(next_rollout = %at, "daily rollout seeded");
    }

    // Egress flush loop (queued messages while the transport is down).
    tokio::spawn(Arc::clone(&egress).run_flush_loop(shutdown_rx.clone()));

    // Hourly kv housekeeping.
    {
        let kv = Arc::clone(&kv);
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let purged = kv.purge_expired();
                        if purged > 0 {
                            info!(purged, "ephemeral store swept");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    // The router and its per-sender dispatcher.
    let router = Arc::new(Router::new(RouterDeps {
        config,
        clock,
        kv,
        sessions,
        auth,
        users,
        events,
        reminders,
        tasks,
        contacts,
        message_log,
        nlu,
        scheduler,
        egress,
    }));
    let (ingress, inbound_rx) = Ingress::new(256);
    let dispatcher = Arc::new(Dispatcher::new(router));
    tokio::spawn(dispatcher.run(inbound_rx, shutdown_rx));

    Ok(App {
        ingress,
        shutdown_tx,
    })
}
