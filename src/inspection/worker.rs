use crate::inspection::notify::VmNotifier;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

/// Cooperative cancellation flag for background work.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.0.store(true, Ordering::SeqCst)
    }
}

/// Long-running work on a dedicated thread (for example scanning all known code).
///
/// The work polls its [`StopFlag`] and uses the notifier to get back to the inspection thread
/// for anything that touches the focus or the actions.
pub struct BackgroundJob {
    name: String,
    stop: StopFlag,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundJob {
    pub fn spawn<F>(name: &str, notifier: VmNotifier, work: F) -> std::io::Result<Self>
    where
        F: FnOnce(StopFlag, VmNotifier) + Send + 'static,
    {
        let stop = StopFlag::default();
        let handle = {
            let stop = stop.clone();
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || work(stop, notifier))?
        };
        debug!(target: "inspection", "background job `{name}` started");
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the job to stop, does not wait.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Ask the job to stop and wait for it.
    pub fn join(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(target: "inspection", "background job `{}` panicked", self.name);
            }
        }
    }
}

impl Drop for BackgroundJob {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
