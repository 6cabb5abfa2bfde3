//! Change transports
//!
//! A transport delivers lists of patch batches through a registered
//! callback, many times over its lifetime and with entities interleaved.
//! [`ChannelTransport`] is the in-process implementation: a host bridge
//! (socket reader, storage poller, broadcast listener) owns the
//! [`ChangeSender`] half and pushes decoded batches, and a delivery thread
//! hands them to the callback.

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tether_ir::PatchBatch;
use thiserror::Error;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Consumer of batch deliveries
pub type ChangeCallback = Box<dyn FnMut(Vec<PatchBatch>) + Send>;

/// Source of patch batches
pub trait ChangeTransport: Send {
    /// Register the consumer of deliveries, replacing any previous one
    fn on_changes(&mut self, callback: ChangeCallback) -> TransportResult<()>;

    /// Release resources.
    ///
    /// No callback invocation begins after this returns; one already in
    /// progress completes first. Must not be called from the callback.
    fn disconnect(&mut self);

    /// Check if deliveries can still arrive
    fn is_connected(&self) -> bool;
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Deliveries handed to the callback
    pub deliveries: u64,
    /// Batches handed to the callback
    pub batches_delivered: u64,
    /// Deliveries dropped because no callback was registered or the transport closed
    pub deliveries_dropped: u64,
}

struct Shared {
    callback: Mutex<Option<ChangeCallback>>,
    connected: AtomicBool,
    stats: Mutex<TransportStats>,
}

impl Shared {
    fn deliver(&self, batches: Vec<PatchBatch>) {
        let mut slot = self.callback.lock();
        match slot.as_mut() {
            Some(callback) if self.connected.load(Ordering::SeqCst) => {
                let count = batches.len() as u64;
                callback(batches);
                let mut stats = self.stats.lock();
                stats.deliveries += 1;
                stats.batches_delivered += count;
            }
            _ => {
                self.stats.lock().deliveries_dropped += 1;
            }
        }
    }
}

/// In-process transport backed by a bounded channel
pub struct ChannelTransport {
    shared: Arc<Shared>,
    /// Held until the delivery thread starts
    receiver: Option<Receiver<Vec<PatchBatch>>>,
    /// Dropping this stops the delivery thread
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ChannelTransport {
    /// Create a transport and the sender that feeds it.
    ///
    /// `capacity` bounds how many deliveries may wait; `send` blocks beyond it.
    pub fn new(capacity: usize) -> (Self, ChangeSender) {
        let (sender, receiver) = bounded(capacity.max(1));
        let shared = Arc::new(Shared {
            callback: Mutex::new(None),
            connected: AtomicBool::new(true),
            stats: Mutex::new(TransportStats::default()),
        });

        let transport = Self {
            shared: shared.clone(),
            receiver: Some(receiver),
            shutdown: None,
            worker: None,
        };
        (transport, ChangeSender { sender, shared })
    }

    /// Get transport statistics
    pub fn stats(&self) -> TransportStats {
        self.shared.stats.lock().clone()
    }

    fn start(&mut self) -> TransportResult<()> {
        let Some(batches) = self.receiver.take() else {
            return Ok(());
        };
        let (shutdown, stop) = bounded::<()>(0);
        let shared = self.shared.clone();

        let worker = thread::Builder::new()
            .name("tether-transport".into())
            .spawn(move || delivery_loop(batches, stop, shared))?;

        self.shutdown = Some(shutdown);
        self.worker = Some(worker);
        log::debug!("Channel transport delivery started");
        Ok(())
    }
}

fn delivery_loop(batches: Receiver<Vec<PatchBatch>>, stop: Receiver<()>, shared: Arc<Shared>) {
    loop {
        select! {
            recv(batches) -> delivery => match delivery {
                Ok(delivery) => shared.deliver(delivery),
                // Every sender is gone
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }
    log::debug!("Channel transport delivery stopped");
}

impl ChangeTransport for ChannelTransport {
    fn on_changes(&mut self, callback: ChangeCallback) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        *self.shared.callback.lock() = Some(callback);
        self.start()
    }

    fn disconnect(&mut self) {
        if !self.shared.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        // Waits for an in-flight delivery
        self.shared.callback.lock().take();
        self.shutdown.take();
        self.receiver.take();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Channel transport delivery thread panicked");
            }
        }
        log::debug!("Channel transport disconnected");
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Wire forms accepted by [`ChangeSender::send_json`]
#[derive(Deserialize)]
#[serde(untagged)]
enum WireBatches {
    Many(Vec<PatchBatch>),
    One(PatchBatch),
}

/// Feeding half of a [`ChannelTransport`]
#[derive(Clone)]
pub struct ChangeSender {
    sender: Sender<Vec<PatchBatch>>,
    shared: Arc<Shared>,
}

impl ChangeSender {
    /// Queue one delivery
    pub fn send(&self, batches: Vec<PatchBatch>) -> TransportResult<()> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sender.send(batches).map_err(|_| TransportError::Closed)
    }

    /// Decode a batch or a list of batches from JSON and queue it
    pub fn send_json(&self, json: &str) -> TransportResult<()> {
        let batches = match serde_json::from_str(json)? {
            WireBatches::Many(batches) => batches,
            WireBatches::One(batch) => vec![batch],
        };
        self.send(batches)
    }

    /// Check if the transport still accepts deliveries
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}
