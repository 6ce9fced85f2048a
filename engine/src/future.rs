//! Future/promise pairs with executor-dispatched continuations.
//!
//! A [`Promise`] is the producing end of a single-assignment cell and a
//! [`Future`] is the consuming end. The consumer either blocks on
//! [`Future::get`] or chains a transform with [`Future::then`], which returns
//! a new future for the transform's result. Chained transforms never run on
//! the resolving thread's stack; they are handed to the executor passed to
//! `then`.
//!
//! ```rust
//! use lodge_engine::{make_promise, InlineExecutor};
//!
//! let (future, promise) = make_promise::<u32>();
//! let doubled = future.then(InlineExecutor, |v| v * 2);
//!
//! promise.resolve(21);
//! assert_eq!(doubled.get(), 42);
//! ```
//!
//! Misuse is a bug in the caller and panics: resolving one state twice,
//! chaining twice onto one state, using a reset future, or reading the value
//! of a promise that was dropped without being resolved.

use std::any::Any;
use std::cell::RefCell;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::executor::Executor;

/// The step run once a state has its value.
trait Continuation<T>: Send {
    fn resume(self: Box<Self>, value: T);
}

struct Slot<T> {
    value: Option<T>,
    resolved: bool,
    broken: bool,
    continuation: Option<Box<dyn Continuation<T>>>,
}

/// Shared result state between one promise and one future.
struct State<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T: Send + 'static> State<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                resolved: false,
                broken: false,
                continuation: None,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_ready(&self) -> bool {
        self.lock().resolved
    }

    fn is_broken(&self) -> bool {
        self.lock().broken
    }

    fn set_value(&self, value: T) {
        let pending = {
            let mut slot = self.lock();
            assert!(!slot.resolved, "promise resolved twice");
            slot.resolved = true;
            match slot.continuation.take() {
                Some(continuation) => Some((continuation, value)),
                None => {
                    slot.value = Some(value);
                    None
                }
            }
        };
        self.ready.notify_all();

        if let Some((continuation, value)) = pending {
            continuation.resume(value);
        }
    }

    fn chain(&self, continuation: Box<dyn Continuation<T>>) {
        let value = {
            let mut slot = self.lock();
            assert!(
                slot.continuation.is_none(),
                "future already has a continuation"
            );
            if slot.resolved {
                match slot.value.take() {
                    Some(value) => value,
                    None => panic!("future value was already taken"),
                }
            } else if slot.broken {
                drop(slot);
                // Dropping the continuation breaks the downstream promise too.
                drop_unwound(Box::new(continuation));
                return;
            } else {
                slot.continuation = Some(continuation);
                return;
            }
        };
        continuation.resume(value);
    }

    fn wait(&self) -> T {
        let mut slot = self.lock();
        while !slot.resolved && !slot.broken {
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        match slot.value.take() {
            Some(value) => value,
            None if slot.broken => panic!("promise dropped without resolving"),
            None => panic!("future value was already taken"),
        }
    }

    fn break_promise(&self) {
        let continuation = {
            let mut slot = self.lock();
            if slot.resolved {
                return;
            }
            slot.broken = true;
            slot.continuation.take()
        };
        self.ready.notify_all();
        if let Some(continuation) = continuation {
            drop_unwound(Box::new(continuation));
        }
    }
}

thread_local! {
    static DROP_QUEUE: RefCell<Option<Vec<Box<dyn Any>>>> = const { RefCell::new(None) };
}

/// Drop a discarded continuation without recursing down its chain.
///
/// A continuation owns the next promise, whose drop breaks the next state and
/// discards its continuation in turn. The outermost call on a thread drains
/// a thread-local queue; drops started while it runs are queued instead.
fn drop_unwound(item: Box<dyn Any>) {
    let first = DROP_QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        match queue.as_mut() {
            Some(pending) => {
                pending.push(item);
                None
            }
            None => {
                *queue = Some(Vec::new());
                Some(item)
            }
        }
    });

    let Some(first) = first else {
        return;
    };

    struct Drain;
    impl Drop for Drain {
        fn drop(&mut self) {
            let rest = DROP_QUEUE.with(|queue| queue.borrow_mut().take());
            drop(rest);
        }
    }
    let _drain = Drain;

    drop(first);
    while let Some(item) =
        DROP_QUEUE.with(|queue| queue.borrow_mut().as_mut().and_then(Vec::pop))
    {
        drop(item);
    }
}

/// Continuation produced by [`Future::then`].
struct Then<E, F, U: Send + 'static> {
    executor: E,
    transform: F,
    promise: Promise<U>,
}

impl<T, U, E, F> Continuation<T> for Then<E, F, U>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Executor,
    F: FnOnce(T) -> U + Send + 'static,
{
    fn resume(self: Box<Self>, value: T) {
        let Then {
            executor,
            transform,
            promise,
        } = *self;
        executor.spawn(Box::new(move || promise.resolve(transform(value))));
    }
}

/// Create a connected future/promise pair.
pub fn make_promise<T: Send + 'static>() -> (Future<T>, Promise<T>) {
    let state = Arc::new(State::new());
    let future = Future {
        state: Some(Arc::clone(&state)),
    };
    let promise = Promise { state: Some(state) };
    (future, promise)
}

/// Consuming end of a future/promise pair.
#[must_use = "a future does nothing unless read or chained"]
pub struct Future<T: Send + 'static> {
    state: Option<Arc<State<T>>>,
}

impl<T: Send + 'static> Future<T> {
    /// A future that already holds `value`.
    pub fn ready(value: T) -> Self {
        let (future, promise) = make_promise();
        promise.resolve(value);
        future
    }

    /// Whether this future still refers to a result state.
    pub fn is_valid(&self) -> bool {
        self.state.is_some()
    }

    /// Non-blocking check for a value.
    pub fn is_ready(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_ready())
    }

    /// Whether the promise was dropped without a value.
    ///
    /// A broken future never becomes ready.
    pub fn is_broken(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.is_broken())
    }

    /// Drop the reference to the result state.
    ///
    /// This does not cancel anything: the producer still runs and resolves
    /// its promise, the value is simply discarded.
    pub fn reset(&mut self) {
        self.state = None;
    }

    /// Block until the value is available and take it.
    ///
    /// Never call this from a session loop; chain with [`then`](Self::then)
    /// instead.
    ///
    /// # Panics
    /// If the future was reset, or the promise was dropped unresolved.
    pub fn get(self) -> T {
        self.into_state().wait()
    }

    /// Chain `transform` to run on `executor` once the value is available.
    ///
    /// If the value is already there the transform is scheduled right away,
    /// otherwise it is stored and scheduled by whichever thread resolves the
    /// promise. The returned future resolves to the transform's output.
    pub fn then<U, E, F>(self, executor: E, transform: F) -> Future<U>
    where
        U: Send + 'static,
        E: Executor,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let state = self.into_state();
        let (future, promise) = make_promise::<U>();
        state.chain(Box::new(Then {
            executor,
            transform,
            promise,
        }));
        future
    }

    fn into_state(self) -> Arc<State<T>> {
        match self.state {
            Some(state) => state,
            None => panic!("use of a reset future"),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("valid", &self.is_valid())
            .field("ready", &self.is_ready())
            .field("broken", &self.is_broken())
            .finish()
    }
}

/// Producing end of a future/promise pair.
///
/// `resolve` consumes the promise, so a second resolution does not compile.
/// Dropping an unresolved promise breaks the pair: pending continuations are
/// discarded and [`Future::get`] panics instead of blocking forever.
pub struct Promise<T: Send + 'static> {
    state: Option<Arc<State<T>>>,
}

impl<T: Send + 'static> Promise<T> {
    /// Set the value and fire the chained continuation, if any.
    pub fn resolve(mut self, value: T) {
        if let Some(state) = self.state.take() {
            state.set_value(value);
        }
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.break_promise();
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}
