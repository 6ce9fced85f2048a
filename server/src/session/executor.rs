use lodge_engine::{Executor, Job};
use tokio::sync::mpsc;

/// Executor that runs jobs on one session's own loop.
///
/// Jobs spawned after the session has ended are dropped, which breaks any
/// promise they carry.
#[derive(Debug, Clone)]
pub struct SessionExecutor {
    jobs: mpsc::UnboundedSender<Job>,
}

impl SessionExecutor {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (jobs, rx) = mpsc::unbounded_channel();
        (Self { jobs }, rx)
    }
}

impl Executor for SessionExecutor {
    fn spawn(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            tracing::trace!("session gone, job dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodge_engine::make_promise;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn jobs_wait_for_the_loop() {
        let (executor, mut rx) = SessionExecutor::channel();
        let (future, promise) = make_promise::<u32>();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        let done = future.then(executor, move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            v + 1
        });
        promise.resolve(1);

        // Nothing runs until the loop picks the job up.
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(!done.is_ready());

        let job = rx.try_recv().unwrap();
        job();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(done.get(), 2);
    }

    #[test]
    fn jobs_after_shutdown_are_dropped() {
        let (executor, rx) = SessionExecutor::channel();
        drop(rx);

        let (future, promise) = make_promise::<u32>();
        let done = future.then(executor, |v| v);
        promise.resolve(1);

        assert!(!done.is_ready());
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| done.get()));
        assert!(outcome.is_err());
    }
}
