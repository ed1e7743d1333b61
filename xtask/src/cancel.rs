use std::{
    io,
    process::Child,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

use log::warn;
use parking_lot::Mutex;

/// A child process shared between the driver and whoever may cancel it.
pub(crate) type SharedChild = Arc<Mutex<Child>>;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    child: Mutex<Option<SharedChild>>,
}

/// Cancellation flag for one pipeline run. Cancelling also kills the
/// compiler currently attached to the token, which unblocks a driver waiting
/// on its output.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(child) = self.inner.child.lock().as_ref() {
            let _ = child.lock().kill();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn attach(&self, child: SharedChild) {
        let mut slot = self.inner.child.lock();
        if self.is_cancelled() {
            let _ = child.lock().kill();
        }
        *slot = Some(child);
    }

    pub(crate) fn detach(&self) {
        self.inner.child.lock().take();
    }

    /// Cancels this token on SIGINT or SIGTERM until the returned watcher is
    /// dropped.
    #[cfg(unix)]
    pub fn watch_signals(&self) -> io::Result<SignalWatcher> {
        use signal_hook::{
            consts::{SIGINT, SIGTERM},
            iterator::Signals,
        };

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let token = self.clone();
        let thread = std::thread::Builder::new()
            .name("xtask-signals".into())
            .spawn(move || {
                for signal in signals.forever() {
                    warn!("received signal {}, cancelling", signal);
                    token.cancel();
                }
            })?;

        Ok(SignalWatcher {
            handle,
            thread: Some(thread),
        })
    }

    #[cfg(not(unix))]
    pub fn watch_signals(&self) -> io::Result<SignalWatcher> {
        Ok(SignalWatcher { thread: None })
    }
}

/// Keeps signal delivery hooked up; unregisters on drop.
pub struct SignalWatcher {
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        #[cfg(unix)]
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
