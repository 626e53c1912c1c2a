/// Signal handling for graceful shutdown.
///
/// SIGINT (Ctrl-C) and SIGTERM both request shutdown. The write loop notices the
/// request at the start of an iteration or while sleeping between writes, stops,
/// and returns so the target file is closed and its lock released.
use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

/// Receiving side of a shutdown request.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<Option<Signal>>,
}

impl Shutdown {
    /// A manually triggered shutdown, plus the sender that triggers it.
    pub fn channel() -> (watch::Sender<Option<Signal>>, Shutdown) {
        let (tx, rx) = watch::channel(None);
        (tx, Shutdown { rx })
    }

    /// The signal that requested shutdown, if any has arrived.
    pub fn requested(&self) -> Option<Signal> {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested. Never resolves if the sender is gone
    /// without having requested it.
    pub async fn wait(&mut self) -> Signal {
        let received = self.rx.wait_for(Option::is_some).await.map(|s| *s);
        match received {
            Ok(signal) => signal.unwrap_or(Signal::SIGINT),
            Err(_) => std::future::pending().await,
        }
    }
}

/// Installs SIGINT/SIGTERM listeners on the current tokio runtime.
pub struct SignalHandler {
    shutdown: Shutdown,
}

impl SignalHandler {
    pub fn install() -> std::io::Result<SignalHandler> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let (tx, shutdown) = Shutdown::channel();

        tokio::spawn(async move {
            let received = tokio::select! {
                _ = sigint.recv() => Signal::SIGINT,
                _ = sigterm.recv() => Signal::SIGTERM,
            };
            tracing::info!(signal = %received, "shutdown requested");
            let _ = tx.send(Some(received));
        });

        Ok(SignalHandler { shutdown })
    }

    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }
}

/// Conventional shell exit status for a process stopped by `signal`.
pub fn exit_status(signal: Signal) -> u8 {
    128u8.saturating_add(signal as i32 as u8)
}
