//! Shutdown signal plumbing, adapted from the teacher's actor-runtime
//! version to plain `tokio`: there is no actor system to stop here, the
//! broadcast send alone is what every subscribed task reacts to.

use std::sync::atomic::{AtomicI32, Ordering};

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::SendError;
use tracing::{info, warn};

static SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Tests a stored signal value against the set this binary reacts to.
pub fn is_matching_signal() -> bool {
    let signal_value: SignalKind = SIGNAL.load(Ordering::SeqCst).into();

    match signal_value {
        val if val == SignalKind::interrupt() => true,
        val if val == SignalKind::terminate() => true,
        val if val == SignalKind::hangup() => true,
        _ => false,
    }
}

pub async fn handle_term(shutdown_tx: tokio::sync::broadcast::Sender<()>) -> anyhow::Result<()> {
    let sigterm = SignalKind::terminate();
    let mut term_signal_stream = signal(sigterm)?;
    info!("Signal handler for SIGTERM installed");

    term_signal_stream.recv().await;

    info!("Signal handler for SIGTERM triggered");
    SIGNAL.store(sigterm.into(), Ordering::SeqCst);
    match shutdown_tx.send(()) {
        Ok(_) => info!("Originated by SIGTERM shutdown signal sent successfully"),
        Err(SendError(_)) => warn!("No active receivers for shutdown signal originated by SIGTERM"),
    }

    Ok(())
}

pub async fn handle_hup(shutdown_tx: tokio::sync::broadcast::Sender<()>) -> anyhow::Result<()> {
    let sighup = SignalKind::hangup();
    let mut hup_signal_stream = signal(sighup)?;
    info!("Signal handler for SIGHUP installed");

    hup_signal_stream.recv().await;

    info!("Signal handler for SIGHUP triggered");
    SIGNAL.store(sighup.into(), Ordering::SeqCst);
    match shutdown_tx.send(()) {
        Ok(_) => info!("Originated by SIGHUP shutdown signal sent successfully"),
        Err(SendError(_)) => warn!("No active receivers for shutdown signal originated by SIGHUP"),
    }

    Ok(())
}

pub async fn handle_ctrl_c(shutdown_tx: tokio::sync::broadcast::Sender<()>) -> anyhow::Result<()> {
    let sigint = SignalKind::interrupt();
    info!("Signal handler for Ctrl-C installed");

    tokio::signal::ctrl_c().await?;

    info!("Signal handler for Ctrl-C triggered");
    SIGNAL.store(sigint.into(), Ordering::SeqCst);
    match shutdown_tx.send(()) {
        Ok(_) => info!("Originated by Ctrl-C shutdown signal sent successfully"),
        Err(SendError(_)) => warn!("No active receivers for shutdown signal originated by Ctrl-C"),
    }

    Ok(())
}

/// Races every handled signal and returns once any one of them fires.
/// SSE connections observe the resulting broadcast on their next gate
/// wake (spec §5's "observe disconnection within one gate wake").
pub async fn handle_all_signals(shutdown_tx: tokio::sync::broadcast::Sender<()>) -> anyhow::Result<()> {
    info!("Installing signal handlers");

    let mut term = Box::pin(handle_term(shutdown_tx.clone()));
    let mut hup = Box::pin(handle_hup(shutdown_tx.clone()));
    let mut ctrl_c = Box::pin(handle_ctrl_c(shutdown_tx));

    tokio::select! {
        result = &mut term => {
            if let Err(e) = result {
                warn!("Error handling TERM signal: {}", e);
            }
        }
        result = &mut hup => {
            if let Err(e) = result {
                warn!("Error handling HUP signal: {}", e);
            }
        }
        result = &mut ctrl_c => {
            if let Err(e) = result {
                warn!("Error handling Ctrl-C signal: {}", e);
            }
        }
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_matching_signal() {
        SIGNAL.store(602437500, Ordering::SeqCst);
        assert!(!is_matching_signal());

        SIGNAL.store(SignalKind::interrupt().into(), Ordering::SeqCst);
        assert!(is_matching_signal());

        SIGNAL.store(SignalKind::terminate().into(), Ordering::SeqCst);
        assert!(is_matching_signal());

        SIGNAL.store(SignalKind::hangup().into(), Ordering::SeqCst);
        assert!(is_matching_signal());
    }
}
