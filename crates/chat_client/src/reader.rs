//! Pull loop over a streamed response body.

use std::fmt::Display;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use wire_protocol::{FrameDecoder, WireFrame};

use crate::cancel::{await_or_cancel, is_cancelled, CancelSignal};
use crate::decoder::Utf8ChunkDecoder;
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The body ended.
    Completed,
    /// The cancel signal fired; remaining frames were not applied.
    Cancelled,
}

/// Re-buffers body chunks into complete frames.
#[derive(Debug, Default)]
pub struct StreamReader {
    text: Utf8ChunkDecoder,
    frames: FrameDecoder,
}

impl StreamReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every frame completed by `chunk`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<WireFrame> {
        let text = self.text.push(chunk);
        self.frames.push(&text)
    }

    /// Flushes a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Vec<WireFrame> {
        let mut tail = self.text.finish();
        if tail.is_empty() && self.frames.is_empty_buffer() {
            return Vec::new();
        }
        tail.push('\n');
        self.frames.push(&tail)
    }

    /// Drives `body` to the end, handing each frame to `on_frame` in order.
    ///
    /// The cancel signal is checked before every frame, so frames already
    /// buffered are not applied once it fires. An error from `on_frame` stops
    /// the loop and is returned.
    pub async fn read<S, E, F>(
        mut self,
        mut body: S,
        cancel: &CancelSignal,
        mut on_frame: F,
    ) -> Result<ReadOutcome, ClientError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
        F: FnMut(WireFrame) -> Result<(), ClientError>,
    {
        loop {
            let next = match await_or_cancel(body.next(), cancel).await {
                Ok(next) => next,
                Err(ClientError::Cancelled) => return Ok(ReadOutcome::Cancelled),
                Err(error) => return Err(error),
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|error| ClientError::Stream(error.to_string()))?;

            for frame in self.feed(&chunk) {
                if is_cancelled(cancel) {
                    return Ok(ReadOutcome::Cancelled);
                }
                on_frame(frame)?;
            }
        }

        for frame in self.finish() {
            if is_cancelled(cancel) {
                return Ok(ReadOutcome::Cancelled);
            }
            on_frame(frame)?;
        }

        if is_cancelled(cancel) {
            return Ok(ReadOutcome::Cancelled);
        }
        Ok(ReadOutcome::Completed)
    }
}
