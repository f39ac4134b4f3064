//! TCP port allocation for server instances.
//!
//! A preferred port is honored when free; an occupied preferred port falls
//! back silently (logged, not erred) to an OS-assigned one. Callers must read
//! the actual port back from the running instance rather than assume the
//! preferred one was used.

use tokio::net::TcpListener;
use tracing::debug;

use crate::error::{Error, Result};

/// Acquire a free TCP port on the loopback interface.
///
/// With `preferred` set, that port is probed first; if it is already in use
/// the fallback to an OS-assigned port is silent apart from a debug log.
///
/// # Errors
///
/// Returns [`Error::NoPortAvailable`] if the OS refuses to hand out any port.
pub async fn acquire(preferred: Option<u16>) -> Result<u16> {
    if let Some(port) = preferred {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(_) => return Ok(port),
            Err(err) => {
                debug!(port, %err, "preferred port unavailable, falling back to OS-assigned");
            }
        }
    }

    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|source| Error::NoPortAvailable { source })?;
    let port = listener
        .local_addr()
        .map_err(|source| Error::NoPortAvailable { source })?
        .port();
    Ok(port)
}
