use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use formats::NodeSet;
use foundation::time::Clock;
use gpu::{ParticleBuffer, ParticleDevice};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use runtime::epoch::{Epoch, EpochCounter};
use streaming::{Envelope, ParticleSpec, WorkerMessage, WorkerRequest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::particles::generate_trajectories;

/// Outcome of one applied worker message.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorEvent {
    Progress { epoch: Epoch, progress: f32 },
    Completed { epoch: Epoch, records: usize },
    Failed { epoch: Epoch, message: String },
}

impl GeneratorEvent {
    pub fn epoch(&self) -> Epoch {
        match self {
            GeneratorEvent::Progress { epoch, .. }
            | GeneratorEvent::Completed { epoch, .. }
            | GeneratorEvent::Failed { epoch, .. } => *epoch,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GeneratorEvent::Progress { .. })
    }
}

struct ActiveWorker {
    epoch: Epoch,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Render-ready flag plus the view-transition latch that can hold it back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ReadyState {
    ready: bool,
    transitioning: bool,
    pending: bool,
}

/// Decrements the live-worker count when the worker body exits.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Produces particle buffers on a background worker, one generation at a time.
///
/// Each [`generate`](Self::generate) call terminates the previous worker and
/// tags the new one with a fresh epoch. Worker output reaches the buffer only
/// through [`pump`](Self::pump) or [`next_event`](Self::next_event), which drop
/// any message whose epoch is no longer current.
pub struct ParticleBufferGenerator<D, C> {
    buffer: ParticleBuffer<D>,
    clock: C,
    epochs: EpochCounter,
    active: Option<ActiveWorker>,
    state: ReadyState,
    progress: Option<f32>,
    live: Arc<AtomicUsize>,
    /// Held by a worker body for its whole run. A successor blocks on it
    /// until the terminated predecessor has observed its cancel flag.
    slot: Arc<Mutex<()>>,
    seed: Option<u64>,
    tx: mpsc::UnboundedSender<Envelope<WorkerMessage>>,
    rx: mpsc::UnboundedReceiver<Envelope<WorkerMessage>>,
}

impl<D: ParticleDevice, C: Clock> ParticleBufferGenerator<D, C> {
    pub fn new(buffer: ParticleBuffer<D>, clock: C) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            buffer,
            clock,
            epochs: EpochCounter::new(),
            active: None,
            state: ReadyState::default(),
            progress: None,
            live: Arc::new(AtomicUsize::new(0)),
            slot: Arc::new(Mutex::new(())),
            seed: None,
            tx,
            rx,
        }
    }

    /// Makes worker output reproducible. Each generation derives its seed
    /// from this one and its epoch.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn buffer(&self) -> &ParticleBuffer<D> {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ParticleBuffer<D> {
        &mut self.buffer
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn current_epoch(&self) -> Epoch {
        self.epochs.current()
    }

    pub fn is_ready(&self) -> bool {
        self.state.ready
    }

    pub fn is_generating(&self) -> bool {
        self.active.is_some()
    }

    /// Latest progress of the running generation.
    pub fn progress(&self) -> Option<f32> {
        self.progress
    }

    /// Workers currently running a body, terminated ones included. Never
    /// more than one.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_view_transitioning(&self) -> bool {
        self.state.transitioning
    }

    pub fn begin_view_transition(&mut self) {
        self.state.transitioning = true;
    }

    /// Ends a zoom gesture, publishing a buffer that completed during it.
    pub fn end_view_transition(&mut self) {
        self.state.transitioning = false;
        if self.state.pending {
            self.state.pending = false;
            self.state.ready = true;
        }
    }

    /// Starts generating `spec.count` records, terminating any running worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn generate(&mut self, nodes: NodeSet, spec: ParticleSpec) -> Epoch {
        self.terminate();
        let epoch = self.epochs.advance();
        let cancel = Arc::new(AtomicBool::new(false));
        let request = WorkerRequest::Start { spec, nodes };
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ epoch.0),
            None => StdRng::from_entropy(),
        };

        let live = self.live.clone();
        let slot = self.slot.clone();
        let tx = self.tx.clone();
        let flag = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _slot = slot.lock();
            live.fetch_add(1, Ordering::AcqRel);
            let _guard = LiveGuard(live);
            if flag.load(Ordering::Relaxed) {
                return;
            }
            run_worker(epoch, request, rng, &flag, &tx);
        });

        info!(%epoch, count = spec.count, "particle generation started");
        self.progress = Some(0.0);
        self.active = Some(ActiveWorker {
            epoch,
            cancel,
            handle,
        });
        epoch
    }

    /// Terminates the running worker, if any. Its pending output is ignored.
    pub fn terminate(&mut self) {
        if let Some(worker) = self.active.take() {
            worker.cancel.store(true, Ordering::Relaxed);
            worker.handle.abort();
            debug!(epoch = %worker.epoch, "particle worker terminated");
            self.progress = None;
        }
    }

    /// Applies every worker message already received, without waiting.
    pub fn pump(&mut self) -> Vec<GeneratorEvent> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            events.extend(self.apply(envelope));
        }
        events
    }

    /// Waits for the next message of the running generation and applies it.
    ///
    /// Returns `None` once no generation is running.
    pub async fn next_event(&mut self) -> Option<GeneratorEvent> {
        while self.active.is_some() {
            let envelope = self.rx.recv().await?;
            if let Some(event) = self.apply(envelope) {
                return Some(event);
            }
        }
        None
    }

    fn apply(&mut self, envelope: Envelope<WorkerMessage>) -> Option<GeneratorEvent> {
        let epoch = envelope.epoch;
        if !self.epochs.is_current(epoch) {
            debug!(%epoch, "dropping message from superseded particle worker");
            return None;
        }

        match envelope.message {
            WorkerMessage::Progress { progress } => {
                self.progress = Some(progress);
                Some(GeneratorEvent::Progress { epoch, progress })
            }
            WorkerMessage::Complete { buffer } => {
                self.release();
                match self.buffer.replace(&buffer, self.clock.now()) {
                    Ok(records) => {
                        self.mark_ready();
                        info!(%epoch, records, "particle buffer replaced");
                        Some(GeneratorEvent::Completed { epoch, records })
                    }
                    Err(err) => {
                        warn!(%epoch, error = %err, "particle buffer rejected");
                        Some(GeneratorEvent::Failed {
                            epoch,
                            message: err.to_string(),
                        })
                    }
                }
            }
            WorkerMessage::Error { message } => {
                self.release();
                warn!(%epoch, %message, "particle generation failed");
                Some(GeneratorEvent::Failed { epoch, message })
            }
        }
    }

    fn release(&mut self) {
        self.active = None;
        self.progress = None;
    }

    fn mark_ready(&mut self) {
        if self.state.transitioning {
            // Hide the new buffer until the gesture ends.
            self.state.ready = false;
            self.state.pending = true;
        } else {
            self.state.ready = true;
        }
    }
}

impl<D, C> Drop for ParticleBufferGenerator<D, C> {
    fn drop(&mut self) {
        if let Some(worker) = self.active.take() {
            worker.cancel.store(true, Ordering::Relaxed);
            worker.handle.abort();
        }
    }
}

fn run_worker(
    epoch: Epoch,
    request: WorkerRequest,
    mut rng: StdRng,
    cancel: &AtomicBool,
    tx: &mpsc::UnboundedSender<Envelope<WorkerMessage>>,
) {
    let WorkerRequest::Start { spec, nodes } = request;
    let send = |message| {
        // The receiver only goes away with the generator itself.
        let _ = tx.send(Envelope::new(epoch, message));
    };

    let result = generate_trajectories(&nodes, spec, &mut rng, cancel, |progress| {
        send(WorkerMessage::Progress { progress })
    });
    if cancel.load(Ordering::Relaxed) {
        return;
    }
    match result {
        Ok(Some(records)) => send(WorkerMessage::Complete {
            buffer: bytemuck::cast_slice(&records).to_vec(),
        }),
        Ok(None) => {}
        Err(err) => send(WorkerMessage::Error {
            message: err.to_string(),
        }),
    }
}
