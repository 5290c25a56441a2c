use crate::engine::loader::LoaderBridge;
use crate::engine::roots::RootRegistry;
use crate::engine::watch;
use crate::model::{ChangeEvent, Transition};
use crate::reload::ReloadBroker;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// The reload pipeline: classify → load/swap → dispatch, driven by a single
/// background thread so module loads are serialized.
///
/// Every per-module failure is reduced to a log entry at the boundary where
/// it occurs; the thread only exits when the event channel closes.
pub struct ReloadEngine {
    roots: Arc<RootRegistry>,
    bridge: Arc<LoaderBridge>,
    broker: Arc<ReloadBroker>,
    debounce: Duration,
}

impl ReloadEngine {
    pub fn new(
        roots: Arc<RootRegistry>,
        bridge: Arc<LoaderBridge>,
        broker: Arc<ReloadBroker>,
        debounce: Duration,
    ) -> Self {
        Self {
            roots,
            bridge,
            broker,
            debounce,
        }
    }

    pub fn roots(&self) -> &Arc<RootRegistry> {
        &self.roots
    }

    /// Run one event through the pipeline. A bad compile must never take
    /// down routing or persistence, so load failures end the cycle for that
    /// one module and nothing else.
    pub fn process_event(&self, event: ChangeEvent) {
        let Some(pending) = self.roots.classify(&event) else {
            return;
        };
        log::info!("compiled module detected: {}", pending.name);
        match self.bridge.load(&pending) {
            Ok(module) => {
                self.broker.dispatch(&module, Transition::Discovered);
            }
            Err(e) => {
                log::error!("failed to load module '{}': {}", pending.name, e);
            }
        }
    }

    /// Drain the event channel until it closes, coalescing bursts per path
    /// before classification.
    pub fn run(&self, rx: Receiver<ChangeEvent>) {
        let mut pending: Vec<ChangeEvent> = Vec::new();
        loop {
            if pending.is_empty() {
                match rx.recv() {
                    Ok(event) => pending.push(event),
                    Err(_) => break,
                }
                continue;
            }
            match rx.recv_timeout(self.debounce) {
                Ok(event) => pending.push(event),
                Err(RecvTimeoutError::Timeout) => {
                    for event in watch::coalesce(pending.drain(..)) {
                        self.process_event(event);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for event in watch::coalesce(pending.drain(..)) {
            self.process_event(event);
        }
    }

    /// Spawn the background reload thread.
    pub fn start(self: Arc<Self>, rx: Receiver<ChangeEvent>) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("hotmod-reload".to_string())
            .spawn(move || {
                log::info!("reload thread started");
                self.run(rx);
                log::info!("reload thread stopped");
            })
    }
}
