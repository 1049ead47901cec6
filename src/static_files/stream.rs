//! Bounded file body with single-shot cleanup.
//!
//! The file handle is released exactly once: after the last byte, on the
//! first read error, or when the body is dropped because the client went
//! away. Whichever happens first is reported to the waiting sender.

use std::io::{self, SeekFrom};
use std::path::Path;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::oneshot;

const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks of the requested byte window.
pub type FileBody = BoxStream<'static, io::Result<Bytes>>;

/// How a file body ended.
#[derive(Debug)]
pub enum StreamOutcome {
    /// Every byte of the window was read.
    Finished,
    /// Reading failed; the error was also yielded to the body.
    Failed(io::Error),
    /// The body was dropped before it finished.
    Aborted,
}

struct Cleanup {
    file: Option<File>,
    done: Option<oneshot::Sender<StreamOutcome>>,
}

impl Cleanup {
    fn finish(&mut self, outcome: StreamOutcome) {
        // Dropping the handle closes it.
        self.file.take();
        if let Some(done) = self.done.take() {
            let _ = done.send(outcome);
        }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.finish(StreamOutcome::Aborted);
    }
}

struct ReadState {
    cleanup: Cleanup,
    remaining: u64,
}

/// Opens `path` and streams `len` bytes starting at `offset`.
pub async fn open(
    path: &Path,
    offset: u64,
    len: u64,
) -> io::Result<(FileBody, oneshot::Receiver<StreamOutcome>)> {
    let mut file = File::open(path).await?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }

    let (tx, rx) = oneshot::channel();
    let state = ReadState {
        cleanup: Cleanup {
            file: Some(file),
            done: Some(tx),
        },
        remaining: len,
    };

    Ok((stream::unfold(state, read_chunk).boxed(), rx))
}

async fn read_chunk(mut state: ReadState) -> Option<(io::Result<Bytes>, ReadState)> {
    if state.remaining == 0 {
        state.cleanup.finish(StreamOutcome::Finished);
        return None;
    }
    let file = state.cleanup.file.as_mut()?;

    let want = state.remaining.min(CHUNK_SIZE as u64) as usize;
    let mut buf = vec![0u8; want];
    match file.read(&mut buf).await {
        Ok(0) => {
            // File shrank underneath us.
            state.cleanup.finish(StreamOutcome::Failed(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file ended before the expected length",
            )));
            Some((
                Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                state,
            ))
        }
        Ok(n) => {
            buf.truncate(n);
            state.remaining -= n as u64;
            if state.remaining == 0 {
                state.cleanup.finish(StreamOutcome::Finished);
            }
            Some((Ok(Bytes::from(buf)), state))
        }
        Err(err) => {
            let copy = io::Error::new(err.kind(), err.to_string());
            state.cleanup.finish(StreamOutcome::Failed(copy));
            Some((Err(err), state))
        }
    }
}
