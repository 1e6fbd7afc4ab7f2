//! Connection loop shared by all transports, and the stdio entry point.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Detection, FrameError, FrameMode, FrameReader, write_frame};
use crate::protocol::{NotifyServer, parse_error};

/// Serve one bidirectional byte stream until EOF, a fatal error or cancellation.
///
/// Requests are handled strictly in order. Replies use the request's own
/// encoding, except replies flagged as fallback (parse and framing errors),
/// which use `fallback`.
pub async fn serve_connection<R, W>(
    server: &NotifyServer,
    reader: R,
    mut writer: W,
    detection: Detection,
    fallback: FrameMode,
    cancel: &CancellationToken,
) -> Result<(), FrameError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FrameReader::new(reader, detection);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Connection cancelled");
                return Ok(());
            }
            next = frames.next_frame() => next,
        };

        match next {
            Ok(None) => {
                debug!("Peer closed the stream");
                return Ok(());
            }
            Ok(Some(frame)) => {
                let Some(out) = server.handle(&frame.body).await else {
                    continue;
                };
                let mode = if out.fallback { fallback } else { frame.mode };
                write_frame(&mut writer, mode, &out.payload).await?;
            }
            Err(e) if e.is_fatal() => {
                warn!(error = %e, "Closing connection");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "Rejected frame");
                write_frame(&mut writer, fallback, &parse_error(&e).payload).await?;
            }
        }
    }
}

/// Serve the protocol over stdin/stdout with per-message encoding detection.
pub async fn serve_stdio(server: Arc<NotifyServer>, cancel: CancellationToken) -> Result<(), FrameError> {
    info!("Serving on stdio");
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve_connection(&server, stdin, stdout, Detection::Auto, FrameMode::Line, &cancel).await
}
