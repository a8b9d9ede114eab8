//! The two independent ways a run gets cancelled: Ctrl+C and pressing Enter.

use std::io::{self, BufRead};
use std::thread;

use fetch_logging::{fetch_debug, fetch_warn};
use tokio_util::sync::CancellationToken;

pub fn spawn_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            fetch_warn!("Interrupt received, cancelling...");
            token.cancel();
        }
    });
}

/// Cancels on the first line read from stdin. End of input does not cancel.
///
/// Runs on a plain thread: a blocked stdin read must not hold up runtime shutdown.
pub fn spawn_key_listener(token: CancellationToken) {
    let spawned = thread::Builder::new()
        .name("cancel-listener".to_string())
        .spawn(move || {
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) => fetch_debug!("stdin closed; Enter-to-cancel disabled"),
                Ok(_) if !token.is_cancelled() => {
                    fetch_warn!("Cancellation requested, finishing in-flight chunks...");
                    token.cancel();
                }
                Ok(_) => {}
                Err(err) => fetch_debug!("stdin listener stopped: {}", err),
            }
        });
    if let Err(err) = spawned {
        fetch_warn!("Could not start the cancel listener: {}", err);
    }
}
