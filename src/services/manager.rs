use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::services::{Service, ServiceResult};
use crate::state::{ServiceStatus, ServiceStatusRegistry};

/// Owns every service task and fans a single shutdown signal out to all of them.
pub struct ServiceManager {
    registered: Vec<Box<dyn Service>>,
    running: HashMap<&'static str, JoinHandle<ServiceResult>>,
    shutdown_tx: broadcast::Sender<()>,
    statuses: ServiceStatusRegistry,
}

impl ServiceManager {
    pub fn new(statuses: ServiceStatusRegistry) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            registered: Vec::new(),
            running: HashMap::new(),
            shutdown_tx,
            statuses,
        }
    }

    pub fn register_service(&mut self, service: Box<dyn Service>) {
        self.statuses.set(service.name(), ServiceStatus::Starting);
        self.registered.push(service);
    }

    pub fn has_services(&self) -> bool {
        !self.registered.is_empty() || !self.running.is_empty()
    }

    /// Spawn every registered service on its own task.
    pub fn spawn_all(&mut self) {
        for mut service in self.registered.drain(..) {
            let name = service.name();
            let shutdown_rx = self.shutdown_tx.subscribe();
            let statuses = self.statuses.clone();

            let handle = tokio::spawn(async move {
                let mut shutdown_check = shutdown_rx.resubscribe();
                let result = service.run(shutdown_rx).await;
                let shutting_down = !matches!(
                    shutdown_check.try_recv(),
                    Err(broadcast::error::TryRecvError::Empty)
                );

                match result {
                    Ok(()) if shutting_down => {
                        statuses.set(name, ServiceStatus::Disabled);
                        ServiceResult::GracefulShutdown
                    }
                    Ok(()) => {
                        warn!(service = name, "Service completed unexpectedly");
                        statuses.set(name, ServiceStatus::Disabled);
                        ServiceResult::NormalCompletion
                    }
                    Err(e) => {
                        error!(service = name, error = ?e, "Service failed");
                        statuses.set(name, ServiceStatus::Error);
                        ServiceResult::Error(e)
                    }
                }
            });
            debug!(service = name, "Service spawned");
            self.running.insert(name, handle);
        }
        info!(count = self.running.len(), "All services spawned");
    }

    /// Wait until any service exits on its own. Never resolves with nothing running.
    pub async fn run(&mut self) -> (&'static str, ServiceResult) {
        if self.running.is_empty() {
            return std::future::pending().await;
        }

        let (name, joined) = {
            let (names, handles): (Vec<&'static str>, Vec<&mut JoinHandle<ServiceResult>>) =
                self.running.iter_mut().map(|(name, handle)| (*name, handle)).unzip();
            let (joined, index, _) = futures::future::select_all(handles).await;
            (names[index], joined)
        };
        self.running.remove(name);

        let result = joined.unwrap_or_else(|e| ServiceResult::Error(anyhow::anyhow!("task panicked: {e}")));
        (name, result)
    }

    /// Signal every service to stop and wait up to `timeout` for them all.
    ///
    /// Returns the names of services that did not stop in time; those tasks are aborted.
    pub async fn shutdown(&mut self, timeout: Duration) -> Vec<&'static str> {
        let _ = self.shutdown_tx.send(());

        let mut timed_out = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        for (name, mut handle) in self.running.drain() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(result)) => debug!(service = name, result = ?result, "Service stopped"),
                Ok(Err(e)) => warn!(service = name, error = ?e, "Service task failed during shutdown"),
                Err(_) => {
                    warn!(service = name, "Service did not stop in time, aborting");
                    handle.abort();
                    timed_out.push(name);
                }
            }
        }
        timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct UntilShutdown;

    #[async_trait]
    impl Service for UntilShutdown {
        fn name(&self) -> &'static str {
            "idle"
        }

        async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), anyhow::Error> {
            let _ = shutdown_rx.recv().await;
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Service for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(&mut self, _shutdown_rx: broadcast::Receiver<()>) -> Result<(), anyhow::Error> {
            Err(anyhow::anyhow!("boom"))
        }
    }

    #[tokio::test]
    async fn run_reports_first_exited_service() {
        let statuses = ServiceStatusRegistry::new();
        let mut manager = ServiceManager::new(statuses.clone());
        manager.register_service(Box::new(UntilShutdown));
        manager.register_service(Box::new(Failing));
        manager.spawn_all();

        let (name, result) = manager.run().await;
        assert_eq!(name, "failing");
        assert!(matches!(result, ServiceResult::Error(_)));
        assert_eq!(statuses.get("failing"), Some(ServiceStatus::Error));

        let stuck = manager.shutdown(Duration::from_secs(1)).await;
        assert!(stuck.is_empty());
        assert_eq!(statuses.get("idle"), Some(ServiceStatus::Disabled));
    }
}
