use tokio::sync::watch;

/// A minimal cooperative-cancellation token over `tokio::sync::watch`,
/// standing in for a `CancellationToken` dependency the teacher's stack
/// does not carry on its server binaries (see `SPEC_FULL.md` §5).
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    pub fn new() -> (ShutdownHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (ShutdownHandle { tx }, Self { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered. Callers `tokio::select!`
    /// this against whatever blocking I/O is in flight.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|v| *v).await;
    }

    /// Install a listener on SIGINT/ctrl-c that triggers shutdown.
    pub fn on_ctrl_c(handle: ShutdownHandle) {
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            handle.trigger();
        });
    }
}
