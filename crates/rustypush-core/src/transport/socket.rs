//! Unix domain socket transport (Content-Length framed only).

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Detection, FrameMode, serve_connection};
use crate::protocol::NotifyServer;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// `$TMPDIR/rustypush-<pid>.sock`
pub fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("rustypush-{}.sock", std::process::id()))
}

/// Removes the socket file when dropped.
#[derive(Debug)]
pub struct SocketGuard {
    path: PathBuf,
}

impl SocketGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove socket file"),
        }
    }
}

/// Bind a listener at `path`, replacing any stale file, and restrict it to the owner.
///
/// Must be called from within a tokio runtime.
pub fn bind_socket(path: &Path) -> std::io::Result<(UnixListener, SocketGuard)> {
    if path.exists() {
        warn!(path = %path.display(), "Removing stale socket file");
        std::fs::remove_file(path)?;
    }

    let listener = bind_owner_only(path)?;
    let guard = SocketGuard {
        path: path.to_path_buf(),
    };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

    info!(path = %path.display(), "Socket server listening");
    Ok((listener, guard))
}

/// `UnixListener::bind` under a 0177 umask.
#[allow(unsafe_code)]
fn bind_owner_only(path: &Path) -> std::io::Result<UnixListener> {
    // SAFETY: umask only swaps the process file-creation mask.
    let previous = unsafe { libc::umask(0o177) };
    let bound = UnixListener::bind(path);
    unsafe { libc::umask(previous) };
    bound
}

/// Accept connections until `cancel` fires. Each connection gets its own task.
pub async fn serve_socket(server: Arc<NotifyServer>, listener: UnixListener, cancel: CancellationToken) {
    let mut next_id: u64 = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Socket server stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    next_id += 1;
                    let conn = next_id;
                    debug!(conn, "Accepted connection");
                    let server = Arc::clone(&server);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        handle_stream(&server, stream, conn, &cancel).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Socket accept failed");
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                    }
                }
            }
        }
    }
}

async fn handle_stream(server: &NotifyServer, stream: UnixStream, conn: u64, cancel: &CancellationToken) {
    let (read_half, write_half) = stream.into_split();
    let reader = BufReader::new(read_half);
    match serve_connection(server, reader, write_half, Detection::FramedOnly, FrameMode::Framed, cancel).await {
        Ok(()) => debug!(conn, "Connection closed"),
        Err(e) => error!(conn, error = %e, "Connection failed"),
    }
}
