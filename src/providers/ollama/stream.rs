use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::core::{ManagerError, Result};

struct Decoder<S> {
    body: S,
    buffer: Vec<u8>,
    exhausted: bool,
}

impl<S> Decoder<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    /// Next complete line, reading more chunks as needed. `None` once the
    /// body is drained.
    async fn next_line(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Some(Ok(line));
            }

            if self.exhausted {
                if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    self.buffer.clear();
                    return None;
                }
                return Some(Ok(std::mem::take(&mut self.buffer)));
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.exhausted = true;
                    self.buffer.clear();
                    return Some(Err(e));
                }
                None => self.exhausted = true,
            }
        }
    }
}

/// Split a chunked body into newline-delimited JSON frames. Frames may span
/// chunk boundaries; the last frame may lack its newline.
pub fn ndjson_frames<T, S>(body: S) -> BoxStream<'static, Result<T>>
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    let decoder = Decoder {
        body,
        buffer: Vec::new(),
        exhausted: false,
    };

    stream::unfold(decoder, |mut decoder| async move {
        let line = decoder.next_line().await?;
        let frame = line.and_then(|line| {
            serde_json::from_slice::<T>(&line).map_err(|e| {
                ManagerError::StreamDecode(format!(
                    "{e}: {:?}",
                    String::from_utf8_lossy(&line).trim()
                ))
            })
        });
        Some((frame, decoder))
    })
    .boxed()
}
