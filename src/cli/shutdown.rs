use tokio::select;
use tokio_util::sync::CancellationToken;

/// Cancels `cancelation` once the process receives Ctrl-C, so a running timer gets stopped and
/// recorded before exit.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
