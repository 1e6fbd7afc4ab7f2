use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{FrameError, FrameMode, InboundFrame, MAX_FRAME_SIZE};

/// How the reader decides the encoding of each message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// A `Content-Length` line starts a framed message, anything else is a JSON line
    Auto,
    /// Every message is a header block plus body
    FramedOnly,
}

/// Pulls messages off a buffered byte stream.
pub struct FrameReader<R> {
    reader: R,
    detection: Detection,
    line: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, detection: Detection) -> Self {
        Self {
            reader,
            detection,
            line: Vec::with_capacity(256),
        }
    }

    /// Read the next message.
    ///
    /// Returns `Ok(None)` on a clean end of stream. After a non-fatal error
    /// (see [`FrameError::is_fatal`]) the reader is positioned after the
    /// offending header block and may be called again.
    pub async fn next_frame(&mut self) -> Result<Option<InboundFrame>, FrameError> {
        // Skip blank lines between messages
        let first = loop {
            if !self.read_line().await? {
                return Ok(None);
            }
            let line = trim_eol(&self.line);
            if !line.iter().all(u8::is_ascii_whitespace) {
                break line.to_vec();
            }
        };

        let framed = match self.detection {
            Detection::FramedOnly => true,
            Detection::Auto => parse_header(&first)
                .is_some_and(|(name, _)| name.eq_ignore_ascii_case("content-length")),
        };

        if !framed {
            return Ok(Some(InboundFrame {
                body: first,
                mode: FrameMode::Line,
            }));
        }

        let length = self.read_headers(first).await?;
        let mut body = vec![0u8; length];
        self.reader.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FrameError::Truncated
            } else {
                FrameError::Io(e)
            }
        })?;

        Ok(Some(InboundFrame {
            body,
            mode: FrameMode::Framed,
        }))
    }

    /// Consume the header block that starts with `first`, returning the body length.
    async fn read_headers(&mut self, first: Vec<u8>) -> Result<usize, FrameError> {
        let mut content_length: Option<Result<usize, FrameError>> = None;
        let mut pending = Some(first);

        loop {
            let line = match pending.take() {
                Some(line) => line,
                None => {
                    if !self.read_line().await? {
                        return Err(FrameError::Truncated);
                    }
                    trim_eol(&self.line).to_vec()
                }
            };
            if line.is_empty() {
                break;
            }
            // Later duplicates win; non-header lines are ignored
            if let Some((name, value)) = parse_header(&line) {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = Some(parse_length(value));
                }
            }
        }

        content_length.unwrap_or(Err(FrameError::MissingContentLength))
    }

    /// Read one raw line into `self.line`. Returns false at end of stream.
    ///
    /// A line longer than [`MAX_FRAME_SIZE`] is skipped through its newline
    /// and reported as [`FrameError::FrameTooLarge`].
    async fn read_line(&mut self) -> Result<bool, FrameError> {
        self.line.clear();
        let n = (&mut self.reader)
            .take(MAX_FRAME_SIZE as u64 + 1)
            .read_until(b'\n', &mut self.line)
            .await?;
        if n == 0 {
            return Ok(false);
        }
        if self.line.len() > MAX_FRAME_SIZE && !self.line.ends_with(b"\n") {
            let size = self.line.len() as u64 + self.discard_line().await?;
            self.line.clear();
            return Err(FrameError::FrameTooLarge {
                size,
                limit: MAX_FRAME_SIZE,
            });
        }
        Ok(true)
    }

    /// Drop input up to and including the next newline, returning the bytes skipped.
    async fn discard_line(&mut self) -> Result<u64, FrameError> {
        let mut skipped = 0u64;
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(skipped);
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.reader.consume(i + 1);
                    return Ok(skipped + i as u64 + 1);
                }
                None => {
                    let len = buf.len();
                    self.reader.consume(len);
                    skipped += len as u64;
                }
            }
        }
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Split a `Name: value` header line. The name must be a non-empty HTTP token.
fn parse_header(line: &[u8]) -> Option<(&str, &str)> {
    let colon = line.iter().position(|&b| b == b':')?;
    let (name, rest) = line.split_at(colon);
    if name.is_empty() || !name.iter().copied().all(is_token_char) {
        return None;
    }
    let name = std::str::from_utf8(name).ok()?;
    let value = std::str::from_utf8(&rest[1..]).ok()?;
    Some((name, value.trim()))
}

fn parse_length(value: &str) -> Result<usize, FrameError> {
    let size: u64 = value
        .parse()
        .map_err(|_| FrameError::InvalidContentLength(value.to_string()))?;
    if size > MAX_FRAME_SIZE as u64 {
        return Err(FrameError::FrameTooLarge {
            size,
            limit: MAX_FRAME_SIZE,
        });
    }
    Ok(size as usize)
}

/// Encode `payload` in `mode` and flush it.
pub async fn write_frame<W>(writer: &mut W, mode: FrameMode, payload: &Value) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(payload)?;
    match mode {
        FrameMode::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        FrameMode::Framed => {
            let header = format!("Content-Length: {}\r\n\r\n", body.len());
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await
}
