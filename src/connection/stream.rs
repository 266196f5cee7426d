//! Result Streams
//!
//! A [`ResultStream`] is the caller's end of one dispatched command. Values
//! arrive in the order the output decoder produced them, and all values of
//! an earlier command arrive before any value of a later one.
//!
//! The stream is the single dispatch result; the consumption styles below
//! are thin adapters over it:
//!
//! - `next().await` / `collect().await` / `single().await` for async callers
//! - `blocking_next()` / `blocking_single()` for synchronous callers
//! - `cancel()` (or dropping the stream) when the caller loses interest

use crate::connection::dispatcher::CommandError;
use tokio::sync::mpsc;

/// Ordered, asynchronous sequence of decoded values for one command.
#[derive(Debug)]
pub struct ResultStream<T> {
    sequence: u64,
    rx: mpsc::UnboundedReceiver<Result<T, CommandError>>,
}

impl<T> ResultStream<T> {
    pub(crate) fn new(sequence: u64, rx: mpsc::UnboundedReceiver<Result<T, CommandError>>) -> Self {
        Self { sequence, rx }
    }

    /// Enqueue sequence number of the command behind this stream.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Waits for the next value. `None` once the command is complete.
    pub async fn next(&mut self) -> Option<Result<T, CommandError>> {
        self.rx.recv().await
    }

    /// Returns an already delivered value without waiting.
    pub fn try_next(&mut self) -> Option<Result<T, CommandError>> {
        self.rx.try_recv().ok()
    }

    /// Waits for the first value, for commands that reply exactly once.
    pub async fn single(mut self) -> Result<T, CommandError> {
        self.next().await.unwrap_or(Err(CommandError::NoValue))
    }

    /// Waits for the command to complete and returns every value.
    ///
    /// Stops at the first error.
    pub async fn collect(mut self) -> Result<Vec<T>, CommandError> {
        let mut values = Vec::new();
        while let Some(item) = self.next().await {
            values.push(item?);
        }
        Ok(values)
    }

    /// Blocking variant of [`next`](Self::next).
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime.
    pub fn blocking_next(&mut self) -> Option<Result<T, CommandError>> {
        self.rx.blocking_recv()
    }

    /// Blocking variant of [`single`](Self::single).
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime.
    pub fn blocking_single(mut self) -> Result<T, CommandError> {
        self.blocking_next().unwrap_or(Err(CommandError::NoValue))
    }

    /// Stops delivery to this stream.
    ///
    /// The command still occupies its slot in the pipeline and its replies
    /// are still decoded; the values are discarded.
    pub fn cancel(&mut self) {
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}
