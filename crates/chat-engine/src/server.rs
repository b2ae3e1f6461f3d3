//! Long-running engine host
//!
//! [`SupportServer`] owns a [`ChatEngine`] and drives its housekeeping in
//! the background: the periodic queue drain, the stale-presence sweep, the
//! idle-session sweep, and a monitor loop that logs statistics. The engine
//! itself stays usable directly; the server only adds the clock.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::gateway::ResponderGateway;
use crate::orchestrator::ChatEngine;
use crate::storage::Repository;

/// Builder for [`SupportServer`].
pub struct SupportServerBuilder {
    config: EngineConfig,
    gateway: Option<Arc<dyn ResponderGateway>>,
    repository: Option<Arc<dyn Repository>>,
}

impl SupportServerBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            gateway: None,
            repository: None,
        }
    }

    /// Use an external text-generation backend instead of the built-in
    /// pattern-table responder.
    pub fn with_gateway(mut self, gateway: Arc<dyn ResponderGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Use a durable storage backend instead of in-memory storage.
    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn build(self) -> SupportServer {
        let engine = match (self.gateway, self.repository) {
            (Some(gateway), Some(repository)) => {
                ChatEngine::new(self.config, gateway, repository)
            }
            (Some(gateway), None) => ChatEngine::new(
                self.config,
                gateway,
                Arc::new(crate::storage::InMemoryRepository::new()),
            ),
            (None, Some(repository)) => ChatEngine::new(
                self.config,
                Arc::new(crate::gateway::IntentResponder::new()),
                repository,
            ),
            (None, None) => ChatEngine::with_defaults(self.config),
        };
        SupportServer::new(Arc::new(engine))
    }
}

/// Hosts the engine's background loops.
pub struct SupportServer {
    engine: Arc<ChatEngine>,
    shutdown: watch::Sender<bool>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl SupportServer {
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            shutdown,
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn builder(config: EngineConfig) -> SupportServerBuilder {
        SupportServerBuilder::new(config)
    }

    /// Handle to the hosted engine.
    pub fn engine(&self) -> Arc<ChatEngine> {
        self.engine.clone()
    }

    /// Spawn the background loops. Idempotent only in the sense that the
    /// caller should invoke it once; a second call spawns duplicate loops.
    pub fn start(&self) {
        let config = self.engine.config().server.clone();
        let presence = self.engine.config().presence.clone();
        tracing::info!("Starting support server background loops");

        let mut tasks = self.tasks.lock();

        {
            let engine = self.engine.clone();
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(config.queue_drain_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            if let Err(e) = engine.drain_pending().await {
                                tracing::warn!("Queue drain failed: {}", e);
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        {
            let engine = self.engine.clone();
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(presence.sweep_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            if let Err(e) = engine.sweep_stale_presence(Utc::now()).await {
                                tracing::warn!("Stale-presence sweep failed: {}", e);
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        {
            let engine = self.engine.clone();
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(config.idle_sweep_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            match engine.sweep_idle_sessions(Utc::now()).await {
                                Ok(0) => {}
                                Ok(n) => tracing::info!("Idle sweep resolved {} session(s)", n),
                                Err(e) => tracing::warn!("Idle sweep failed: {}", e),
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        {
            let engine = self.engine.clone();
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(config.monitor_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            let stats = engine.stats().await;
                            tracing::info!(
                                "sessions={} (open={} in_progress={} escalated={} resolved={}) queued={} agents={}/{} eligible",
                                stats.total_sessions,
                                stats.open_sessions,
                                stats.in_progress_sessions,
                                stats.escalated_sessions,
                                stats.resolved_sessions,
                                stats.queued_escalations,
                                stats.eligible_agents,
                                stats.total_agents,
                            );
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }
    }

    /// Signal the loops to stop and wait for them to finish.
    pub async fn stop(&self) -> Result<()> {
        tracing::info!("Stopping support server");
        let _ = self.shutdown.send(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}
