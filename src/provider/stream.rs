//! Line framing shared by the streaming adapters: SSE (`data: ...` lines)
//! for Gemini and OpenAI, newline-delimited JSON for Ollama.

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

/// What one decoded line means for the stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Skip,
    Done,
}

/// Reassembles lines across arbitrary byte-chunk boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every line completed by them, without the
    /// trailing `\n` / `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left once the body ends without a final newline.
    pub fn finish(self) -> Option<String> {
        if self.buf.iter().all(|b| b.is_ascii_whitespace()) {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buf).into_owned())
        }
    }
}

/// Payload of an SSE `data:` line; comments, `event:` and blank lines are `None`.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Drive a byte stream through `decode`, forwarding text frames to `tx`.
///
/// Returns `Ok(())` on `Frame::Done`, at end of body, or as soon as the
/// receiver is gone.
pub async fn forward_lines<S, E, F>(body: S, tx: &mpsc::Sender<String>, mut decode: F) -> Result<()>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
    F: FnMut(&str) -> Result<Frame>,
{
    let mut body = Box::pin(body);
    let mut lines = LineBuffer::default();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("stream read failed")?;
        for line in lines.push(&chunk) {
            match decode(&line)? {
                Frame::Text(t) => {
                    if tx.send(t).await.is_err() {
                        return Ok(());
                    }
                }
                Frame::Skip => {}
                Frame::Done => return Ok(()),
            }
        }
    }
    if let Some(rest) = lines.finish() {
        if let Frame::Text(t) = decode(&rest)? {
            let _ = tx.send(t).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn lines_survive_split_chunks() {
        let mut lb = LineBuffer::default();
        assert!(lb.push(b"data: {\"a\"").is_empty());
        assert_eq!(lb.push(b":1}\r\n\r\ndata: x\npartial"), vec!["data: {\"a\":1}", "", "data: x"]);
        assert_eq!(lb.finish().as_deref(), Some("partial"));
    }

    #[test]
    fn multibyte_split_is_reassembled() {
        let word = "Глава\n".as_bytes();
        let mut lb = LineBuffer::default();
        assert!(lb.push(&word[..3]).is_empty());
        assert_eq!(lb.push(&word[3..]), vec!["Глава"]);
        assert_eq!(lb.finish(), None);
    }

    #[test]
    fn sse_data_extraction() {
        assert_eq!(sse_data("data: hello"), Some("hello"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data("event: message"), None);
    }

    fn body(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        stream::iter(parts.iter().copied().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect::<Vec<_>>())
    }

    fn upper(line: &str) -> Result<Frame> {
        Ok(match line {
            "" => Frame::Skip,
            "STOP" => Frame::Done,
            l => Frame::Text(l.to_uppercase()),
        })
    }

    #[tokio::test]
    async fn forwards_until_done() {
        let (tx, mut rx) = mpsc::channel(8);
        forward_lines(body(&["a\n\nb", "\nSTOP\nc\n"]), &tx, upper).await.unwrap();
        drop(tx);
        let mut got = Vec::new();
        while let Some(t) = rx.recv().await {
            got.push(t);
        }
        assert_eq!(got, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn decode_errors_propagate() {
        let (tx, _rx) = mpsc::channel(8);
        let res = forward_lines(body(&["bad\n"]), &tx, |_| Err(anyhow::anyhow!("boom"))).await;
        assert!(res.is_err());
    }
}
