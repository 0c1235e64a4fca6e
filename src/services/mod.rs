use async_trait::async_trait;
use tokio::sync::broadcast;

pub mod bot;
pub mod manager;
pub mod signals;
pub mod warmer;

/// A long-running component of the application.
///
/// `run` must return promptly once `shutdown_rx` fires; returning for any
/// other reason is treated as the service dying.
#[async_trait]
pub trait Service: Send {
    fn name(&self) -> &'static str;

    async fn run(&mut self, shutdown_rx: broadcast::Receiver<()>) -> Result<(), anyhow::Error>;
}

/// How a service task ended.
#[derive(Debug)]
pub enum ServiceResult {
    /// Stopped after a shutdown signal.
    GracefulShutdown,
    /// Returned `Ok` without being asked to stop.
    NormalCompletion,
    Error(anyhow::Error),
}
