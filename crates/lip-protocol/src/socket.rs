//! Line-framed socket
//!
//! Wraps a bidirectional byte stream with newline (or arbitrary separator)
//! framed reads and CRLF-terminated writes.

use crate::types::ProtocolError;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};

/// Default read timeout. Longer than the ~30s a repeater can take to
/// identify itself after accepting a connection.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(45);

/// Terminator appended to every outbound command
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Line-oriented reader/writer over a stream
pub struct LineSocket<S> {
    reader: BufReader<ReadHalf<S>>,
    /// Bytes of a line still being received
    pending: Vec<u8>,
    /// `None` once closed
    writer: Option<WriteHalf<S>>,
}

impl<S> LineSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    #[must_use]
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            writer: Some(writer),
        }
    }

    /// Read one newline-terminated line
    ///
    /// Returns `Ok(None)` at end of stream. Bytes of a partial line are
    /// discarded if the timeout fires. Dropping the future before it
    /// completes keeps the partial line for the next call, so this can be
    /// used as a `select!` branch.
    pub async fn readline(&mut self, timeout: Duration) -> Result<Option<String>, ProtocolError> {
        self.readuntil(b"\n", timeout).await
    }

    /// Read until `separator` has been received
    ///
    /// The returned string includes the separator.
    pub async fn readuntil(
        &mut self,
        separator: &[u8],
        timeout: Duration,
    ) -> Result<Option<String>, ProtocolError> {
        let Some(&last) = separator.last() else {
            return Ok(Some(String::new()));
        };

        let read = read_until_separator(&mut self.reader, &mut self.pending, separator, last);

        match tokio::time::timeout(timeout, read).await {
            Ok(Ok(Some(bytes))) => Ok(Some(String::from_utf8(bytes)?)),
            Ok(Ok(None)) => Ok(None),
            Ok(Err(e)) => Err(ProtocolError::Io(e)),
            Err(_) => {
                self.pending.clear();
                Err(ProtocolError::Timeout)
            }
        }
    }

    /// Write `text` followed by CRLF and flush
    pub async fn write_command(&mut self, text: &str) -> Result<(), ProtocolError> {
        let writer = self.writer.as_mut().ok_or(ProtocolError::NotConnected)?;
        let mut data = Vec::with_capacity(text.len() + LINE_TERMINATOR.len());
        data.extend_from_slice(text.as_bytes());
        data.extend_from_slice(LINE_TERMINATOR);
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Shut down the write half. Later calls do nothing.
    pub async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Error shutting down socket: {}", e);
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

async fn read_until_separator<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    separator: &[u8],
    last: u8,
) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncBufReadExt + Unpin,
{
    loop {
        let n = reader.read_until(last, buf).await?;
        if n == 0 {
            if !buf.is_empty() {
                tracing::debug!("Discarding {} bytes of unterminated input", buf.len());
                buf.clear();
            }
            return Ok(None);
        }
        if buf.ends_with(separator) {
            return Ok(Some(std::mem::take(buf)));
        }
    }
}

impl<S> Drop for LineSocket<S> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            tracing::warn!("LineSocket dropped without close()");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn pair() -> (LineSocket<DuplexStream>, DuplexStream) {
        let (a, b) = tokio::io::duplex(1024);
        (LineSocket::new(a), b)
    }

    #[tokio::test]
    async fn test_readline() {
        let (mut socket, mut remote) = pair();
        remote.write_all(b"~OUTPUT,1,1,0.00\r\n~OUTPUT,2").await.unwrap();

        let line = socket.readline(Duration::from_secs(1)).await.unwrap();
        assert_eq!(line.as_deref(), Some("~OUTPUT,1,1,0.00\r\n"));
        socket.close().await;
    }

    #[tokio::test]
    async fn test_readline_eof() {
        let (mut socket, remote) = pair();
        drop(remote);
        assert_eq!(socket.readline(Duration::from_secs(1)).await.unwrap(), None);
        socket.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_readline_timeout() {
        let (mut socket, _remote) = pair();
        let err = socket.readline(Duration::from_secs(45)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Timeout));
        socket.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_discards_partial_line() {
        let (mut socket, mut remote) = pair();
        remote.write_all(b"~OUTPUT,3,1,").await.unwrap();

        let err = socket.readline(Duration::from_secs(45)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Timeout));

        remote.write_all(b"~OUTPUT,4,1,0\r\n").await.unwrap();
        let line = socket.readline(Duration::from_secs(45)).await.unwrap();
        assert_eq!(line.as_deref(), Some("~OUTPUT,4,1,0\r\n"));
        socket.close().await;
    }

    #[tokio::test]
    async fn test_cancelled_read_keeps_partial_line() {
        let (mut socket, mut remote) = pair();
        remote.write_all(b"~OUTPUT,3,1,").await.unwrap();

        tokio::select! {
            _ = socket.readline(Duration::from_secs(5)) => panic!("line is incomplete"),
            () = tokio::time::sleep(Duration::from_millis(20)) => {}
        }

        remote.write_all(b"25.00\r\n").await.unwrap();
        let line = socket.readline(Duration::from_secs(1)).await.unwrap();
        assert_eq!(line.as_deref(), Some("~OUTPUT,3,1,25.00\r\n"));
        socket.close().await;
    }

    #[tokio::test]
    async fn test_readuntil_multibyte_separator() {
        let (mut socket, mut remote) = pair();
        remote
            .write_all(b"\r\nLutron: ok: then login: ")
            .await
            .unwrap();

        let prompt = socket
            .readuntil(b"login: ", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(prompt.as_deref(), Some("\r\nLutron: ok: then login: "));
        socket.close().await;
    }

    #[tokio::test]
    async fn test_readline_rejects_invalid_utf8() {
        let (mut socket, mut remote) = pair();
        remote.write_all(&[0xFF, 0xFE, b'\n']).await.unwrap();
        let err = socket.readline(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
        socket.close().await;
    }

    #[tokio::test]
    async fn test_write_command_appends_crlf() {
        let (mut socket, mut remote) = pair();
        socket.write_command("?SYSTEM,10").await.unwrap();
        socket.close().await;

        let mut received = Vec::new();
        remote.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"?SYSTEM,10\r\n");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut socket, _remote) = pair();
        socket.close().await;
        socket.close().await;
        assert!(socket.is_closed());
        let err = socket.write_command("#OUTPUT,1,1,0").await.unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected));
    }
}
