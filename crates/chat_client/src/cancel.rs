use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ClientError;

/// Cancellation signal shared by the request and the body reader.
pub type CancelSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[must_use]
pub fn new_cancel_signal() -> CancelSignal {
    Arc::new(AtomicBool::new(false))
}

pub fn is_cancelled(cancel: &CancelSignal) -> bool {
    cancel.load(Ordering::Acquire)
}

pub fn raise(cancel: &CancelSignal) {
    cancel.store(true, Ordering::Release);
}

/// Awaits `future` while polling `cancel`; returns [`ClientError::Cancelled`] once it is raised.
pub async fn await_or_cancel<F>(future: F, cancel: &CancelSignal) -> Result<F::Output, ClientError>
where
    F: Future,
{
    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancel) {
            return Err(ClientError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancel) {
                return Err(ClientError::Cancelled);
            }
            return Ok(output);
        }
    }
}
