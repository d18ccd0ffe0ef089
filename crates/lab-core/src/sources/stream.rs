//! Two-channel discovery stream.
//!
//! A producer owns a [`StreamSender`]; dropping it closes both the files and
//! the errors channel, so each channel is closed exactly once and only by the
//! producer. Consumers drain both through [`Stream::next`].

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::DiscoveryError;
use super::file::File;

/// Buffer size of each stream channel.
pub const STREAM_CAPACITY: usize = 16;

/// One item pulled from a [`Stream`].
#[derive(Debug)]
pub enum Discovered {
    File(File),
    Error(DiscoveryError),
}

/// Receiving half of a discovery: files and errors.
#[derive(Debug)]
pub struct Stream {
    files: mpsc::Receiver<File>,
    errors: mpsc::Receiver<DiscoveryError>,
    files_done: bool,
    errors_done: bool,
}

/// Producing half of a discovery.
///
/// Sends race against the cancellation token so a producer never blocks on a
/// consumer that has gone away or a run that was cancelled. Once the token is
/// cancelled every send fails, even when the channel has room.
#[derive(Debug, Clone)]
pub struct StreamSender {
    files: mpsc::Sender<File>,
    errors: mpsc::Sender<DiscoveryError>,
    cancel: CancellationToken,
}

impl Stream {
    /// Create a connected sender/stream pair bound to `cancel`.
    pub fn channel(cancel: CancellationToken) -> (StreamSender, Stream) {
        let (files_tx, files_rx) = mpsc::channel(STREAM_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::channel(STREAM_CAPACITY);

        let sender = StreamSender {
            files: files_tx,
            errors: errors_tx,
            cancel,
        };
        let stream = Stream {
            files: files_rx,
            errors: errors_rx,
            files_done: false,
            errors_done: false,
        };

        (sender, stream)
    }

    /// A stream that is already closed on both channels.
    pub fn empty() -> Stream {
        let (_, stream) = Stream::channel(CancellationToken::new());
        stream
    }

    /// A stream holding a single error.
    pub fn failed(err: DiscoveryError) -> Stream {
        let (tx, stream) = Stream::channel(CancellationToken::new());
        // Capacity is non-zero, so the first send never waits.
        let _ = tx.errors.try_send(err);
        stream
    }

    /// Pull the next file or error. Returns `None` once both channels are
    /// closed and drained.
    ///
    /// Pending errors are preferred over pending files.
    pub async fn next(&mut self) -> Option<Discovered> {
        loop {
            if self.files_done && self.errors_done {
                return None;
            }

            tokio::select! {
                biased;
                err = self.errors.recv(), if !self.errors_done => match err {
                    Some(err) => return Some(Discovered::Error(err)),
                    None => self.errors_done = true,
                },
                file = self.files.recv(), if !self.files_done => match file {
                    Some(file) => return Some(Discovered::File(file)),
                    None => self.files_done = true,
                },
            }
        }
    }

    /// Drain the whole stream.
    pub async fn collect(mut self) -> (Vec<File>, Vec<DiscoveryError>) {
        let mut files = Vec::new();
        let mut errors = Vec::new();

        while let Some(item) = self.next().await {
            match item {
                Discovered::File(file) => files.push(file),
                Discovered::Error(err) => errors.push(err),
            }
        }

        (files, errors)
    }

    /// Take the first item as a single-file answer. Used for reference
    /// resolution, where a stream carries exactly one file or one error.
    ///
    /// A file carrying its own error is returned as that error.
    pub async fn single(mut self, name: &str) -> Result<File, DiscoveryError> {
        match self.next().await {
            Some(Discovered::File(file)) => match file.error {
                Some(err) => Err(err),
                None => Ok(file),
            },
            Some(Discovered::Error(err)) => Err(err),
            None => Err(DiscoveryError::new(name, "file not found")),
        }
    }
}

impl StreamSender {
    /// Whether the producer should stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The token this sender observes.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Emit a file. Returns `false` when the producer should stop.
    pub async fn file(&self, file: File) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            res = self.files.send(file) => res.is_ok(),
        }
    }

    /// Emit an error. Returns `false` when the producer should stop.
    pub async fn error(&self, err: DiscoveryError) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            res = self.errors.send(err) => res.is_ok(),
        }
    }

    /// Blocking variant of [`StreamSender::file`] for producers running on a
    /// blocking thread.
    pub fn blocking_file(&self, file: File) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.files.blocking_send(file).is_ok()
    }

    /// Blocking variant of [`StreamSender::error`].
    pub fn blocking_error(&self, err: DiscoveryError) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.errors.blocking_send(err).is_ok()
    }
}
