//! Async borrowing on top of the blocking pool API

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::entry::Entry;
use crate::errors::{PoolError, PoolResult};
use crate::pool::{Pool, return_quietly};

/// Borrow from a shared pool without blocking the async runtime
///
/// The wait for capacity runs on tokio's blocking thread pool. Dropping the
/// returned future does not leak capacity: an entry obtained after the
/// caller has gone away is returned to the pool straight away.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{AsyncPoolExt, BoxError, CorePool, NoopValidator, Pool, PoolConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = Arc::new(CorePool::new(
///     PoolConfig::default(),
///     Arc::new(|| Ok::<_, BoxError>(42u64)),
///     Arc::new(NoopValidator),
/// ).unwrap());
///
/// let entry = pool.borrow_async(true, Duration::from_secs(1)).await.unwrap().unwrap();
/// assert_eq!(**entry, 42);
/// pool.return_entry(Some(entry)).unwrap();
/// # }
/// ```
pub trait AsyncPoolExt<T> {
    /// Async counterpart of [`Pool::borrow_entry`]
    ///
    /// # Errors
    ///
    /// As [`Pool::borrow_entry`]; [`PoolError::Interrupted`] if the blocking
    /// task died before producing a result.
    fn borrow_async(
        &self,
        create_if_empty: bool,
        timeout: Duration,
    ) -> impl Future<Output = PoolResult<Option<Entry<T>>>> + Send;
}

impl<T, P> AsyncPoolExt<T> for Arc<P>
where
    T: Send + Sync + 'static,
    P: Pool<T> + ?Sized + 'static,
{
    fn borrow_async(
        &self,
        create_if_empty: bool,
        timeout: Duration,
    ) -> impl Future<Output = PoolResult<Option<Entry<T>>>> + Send {
        let pool = Arc::clone(self);

        async move {
            let (sender, receiver) = oneshot::channel();
            tokio::task::spawn_blocking(move || {
                let borrowed = pool.borrow_entry(create_if_empty, timeout);
                if let Err(Ok(Some(entry))) = sender.send(borrowed) {
                    // the caller stopped waiting
                    return_quietly(&*pool, entry);
                }
            });

            receiver.await.unwrap_or(Err(PoolError::Interrupted))
        }
    }
}
