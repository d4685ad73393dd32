//! Deadline-bounded execution helpers.
//!
//! The task runs on its own thread. Whichever comes first, the task's result
//! or the context finishing, decides the return value. A task that loses the
//! race is not interrupted; it keeps running and its result is discarded.

use super::Context;
use crate::ContextError;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

enum Outcome<T, E> {
    Finished(Result<T, E>),
    Done,
}

/// Run `f` with a context that expires `timeout` from now.
///
/// # Errors
///
/// Returns `f`'s error, or [`ContextError::DeadlineExceeded`] converted into
/// `E` when the deadline fires first.
///
/// ```
/// use ruleq::{with_timeout, ContextError};
/// use std::time::Duration;
///
/// let res: Result<(), ContextError> = with_timeout(Duration::from_secs(1), |_ctx| Ok(()));
/// assert!(res.is_ok());
/// ```
pub fn with_timeout<F, E>(timeout: Duration, f: F) -> Result<(), E>
where
    F: FnOnce(Arc<Context>) -> Result<(), E> + Send + 'static,
    E: From<ContextError> + Send + 'static,
{
    with_timeout_value(timeout, f)
}

/// Like [`with_timeout`], returning the task's value.
///
/// # Errors
///
/// See [`with_timeout`].
pub fn with_timeout_value<T, F, E>(timeout: Duration, f: F) -> Result<T, E>
where
    T: Send + 'static,
    F: FnOnce(Arc<Context>) -> Result<T, E> + Send + 'static,
    E: From<ContextError> + Send + 'static,
{
    with_timeout_in(&Arc::new(Context::background()), timeout, f)
}

/// Like [`with_timeout_value`], deriving the task's context from `parent`.
///
/// Cancelling `parent` also ends the wait, with the parent's error.
///
/// # Errors
///
/// Returns `f`'s error, or the derived context's error when it finishes
/// first.
pub fn with_timeout_in<T, F, E>(parent: &Arc<Context>, timeout: Duration, f: F) -> Result<T, E>
where
    T: Send + 'static,
    F: FnOnce(Arc<Context>) -> Result<T, E> + Send + 'static,
    E: From<ContextError> + Send + 'static,
{
    let ctx = Arc::new(Context::child_of(Arc::clone(parent)));
    ctx.with_timeout(timeout);

    let (tx, rx) = mpsc::sync_channel::<Outcome<T, E>>(2);
    let done_tx = tx.clone();
    let _guard = ctx.on_done(Arc::new(move || {
        let _ = done_tx.try_send(Outcome::Done);
    }));

    let task_ctx = Arc::clone(&ctx);
    thread::spawn(move || {
        let _ = tx.send(Outcome::Finished(f(task_ctx)));
    });

    let result = wait_outcome(&ctx, &rx);
    ctx.cancel();
    result
}

fn wait_outcome<T, E>(ctx: &Context, rx: &mpsc::Receiver<Outcome<T, E>>) -> Result<T, E>
where
    E: From<ContextError>,
{
    loop {
        let wait = ctx
            .deadline()
            .map_or(Duration::from_secs(3600), |d| {
                d.saturating_duration_since(Instant::now())
            });
        match rx.recv_timeout(wait) {
            Ok(Outcome::Finished(result)) => return result,
            Ok(Outcome::Done) | Err(RecvTimeoutError::Timeout) => {
                if let Some(err) = ctx.err() {
                    tracing::debug!(error = %err, "timed task abandoned");
                    return Err(err.into());
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ContextError::TaskPanicked.into());
            }
        }
    }
}

/// Return `ctx` if it is still live, otherwise a fresh root context.
///
/// Shutdown paths use this so that background writes still get a usable
/// context after the request context was cancelled.
pub fn or_background(ctx: Arc<Context>) -> Arc<Context> {
    if ctx.is_expired() {
        Arc::new(Context::background())
    } else {
        ctx
    }
}
