use log::info;
use tokio::io;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancels `cancellation_token` on the first SIGINT, SIGTERM or SIGHUP.
///
/// The handlers are installed before this returns, so a signal arriving right
/// after the call is not lost.
pub fn cancel_on_shutdown_signal(
    cancellation_token: CancellationToken,
) -> io::Result<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        let received = tokio::select! {
            _ = sigint.recv() => "interrupt",
            _ = sigterm.recv() => "termination",
            _ = sighup.recv() => "hangup",
            () = cancellation_token.cancelled() => return,
        };
        info!("Received {received} signal, shutting down");
        cancellation_token.cancel();
    }))
}
