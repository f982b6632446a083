//! Dev orchestration
//!
//! Composes discovery, bundling, supervision and watching into a dev session:
//! - `DevSession`: constructor inputs and output layout
//! - `DevOrchestrator`: initial start, rebuild-and-restart cycles, shutdown
//! - `CycleGate`: the single-slot marker serializing cycles

mod dev;
mod gate;
mod session;

use log::{error, info};

pub use dev::{BuildOutput, CycleOutcome, DevOrchestrator};
pub use gate::CycleGate;
pub use session::{DEFAULT_PORT, DEFAULT_SERVER_TEMPLATE, DEFAULT_WORK_DIR, DevSession};

/// Resolves on Ctrl+C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = term.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    }

    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received interrupt"),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
