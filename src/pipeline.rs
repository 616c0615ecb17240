// THEORY:
// The `pipeline` module is the top-level API of the engine. It wraps the synchronous
// `AggregationSession` in a single tokio actor so that every state change happens on one
// sequential timeline, and hands callers a cheap, cloneable `MosaicHandle`.
//
// The actor loop `select!`s over three sources:
// 1.  **Commands** from handles: observations, pause/resume, stats, drain.
// 2.  **The coalescer deadline**: the only point where a recomputation pass starts.
// 3.  **Finished compositions**: jobs run as their own tasks on detached snapshots and
//     report back here. A result is delivered only if it still matches the current epoch
//     and the cluster's signature is still confirmed; anything else is stale and dropped.
//
// Composites and failures leave the pipeline as `MosaicEvent`s on an unbounded channel.

use crate::core_modules::coalescer::Coalescer;
use crate::core_modules::compositor::{Composite, CompositionJob, Compositor};
use crate::core_modules::emit_controller::Signature;
use crate::core_modules::geometry::Direction;
use crate::core_modules::image_ops::{ImageOps, RasterOps};
use crate::core_modules::observation::{Observation, PixelExtractor, RawRgba};
use crate::error::{ImageOpError, MosaicError};
use crate::session::{AggregationSession, SessionStats, Trigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Configuration for the MosaicPipeline.
#[derive(Debug, Clone)]
pub struct MosaicConfig {
    /// Edge length of one square tile in pixels.
    pub tile_size: u32,
    /// How long the pipeline waits for the observation stream to go quiet before recomputing.
    pub debounce: Duration,
    /// Largest per-axis gap between two tiles of the same cluster.
    pub link_distance: u32,
    /// Upper bound on concurrently running tile rotations.
    pub rotation_workers: usize,
    /// Whether the session starts paused (observations are dropped until `resume`).
    pub start_paused: bool,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            tile_size: 128,
            debounce: Duration::from_millis(10),
            link_distance: 1,
            rotation_workers: num_cpus::get(),
            start_paused: false,
        }
    }
}

/// The externally observable output of the pipeline.
#[derive(Debug)]
pub enum MosaicEvent {
    /// A cluster was composed.
    Composite(Composite),
    /// The image collaborator failed for one cluster; other clusters are unaffected.
    Failed {
        direction: Direction,
        signature: Signature,
        error: MosaicError,
    },
}

enum Command {
    Observe(Observation, oneshot::Sender<Result<Trigger, MosaicError>>),
    SetPaused(bool, oneshot::Sender<bool>),
    Stats(oneshot::Sender<SessionStats>),
    Drain(oneshot::Sender<()>),
}

struct JobOutcome {
    epoch: u64,
    direction: Direction,
    signature: Signature,
    result: Result<Composite, ImageOpError>,
}

/// Entry point that spawns the aggregation actor.
pub struct MosaicPipeline;

impl MosaicPipeline {
    /// Spawns a pipeline with the default `image`-backed collaborator and raw RGBA payloads.
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: MosaicConfig) -> (MosaicHandle, mpsc::UnboundedReceiver<MosaicEvent>) {
        Self::spawn_with(config, Arc::new(RasterOps), Arc::new(RawRgba))
    }

    pub fn spawn_with(
        config: MosaicConfig,
        ops: Arc<dyn ImageOps>,
        extractor: Arc<dyn PixelExtractor>,
    ) -> (MosaicHandle, mpsc::UnboundedReceiver<MosaicEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let aggregator = Aggregator {
            coalescer: Coalescer::new(config.debounce),
            compositor: Compositor::new(ops, config.tile_size, config.rotation_workers),
            paused: config.start_paused,
            session: AggregationSession::new(config, extractor),
            in_flight: 0,
            drain_waiters: Vec::new(),
            events: event_tx,
            outcomes: outcome_tx,
        };
        tokio::spawn(aggregator.run(command_rx, outcome_rx));

        (MosaicHandle { commands: command_tx }, event_rx)
    }
}

/// Cloneable handle to a running pipeline. The actor stops once every handle is dropped.
#[derive(Clone)]
pub struct MosaicHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl MosaicHandle {
    /// Feeds one observation. Malformed observations are rejected without mutating state.
    pub async fn observe(&self, observation: Observation) -> Result<Trigger, MosaicError> {
        self.request(|reply| Command::Observe(observation, reply)).await?
    }

    /// Pauses aggregation. Returns true if this changed the state (and reset the session).
    pub async fn pause(&self) -> Result<bool, MosaicError> {
        self.request(|reply| Command::SetPaused(true, reply)).await
    }

    /// Resumes aggregation. Returns true if this changed the state (and reset the session).
    pub async fn resume(&self) -> Result<bool, MosaicError> {
        self.request(|reply| Command::SetPaused(false, reply)).await
    }

    pub async fn stats(&self) -> Result<SessionStats, MosaicError> {
        self.request(Command::Stats).await
    }

    /// Runs any pending pass immediately and waits until no composition is in flight.
    pub async fn drain(&self) -> Result<(), MosaicError> {
        self.request(Command::Drain).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, MosaicError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| MosaicError::SessionClosed)?;
        reply_rx.await.map_err(|_| MosaicError::SessionClosed)
    }
}

struct Aggregator {
    session: AggregationSession,
    coalescer: Coalescer,
    compositor: Compositor,
    paused: bool,
    in_flight: usize,
    drain_waiters: Vec<oneshot::Sender<()>>,
    events: mpsc::UnboundedSender<MosaicEvent>,
    outcomes: mpsc::UnboundedSender<JobOutcome>,
}

impl Aggregator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut outcomes: mpsc::UnboundedReceiver<JobOutcome>,
    ) {
        loop {
            let deadline = self.coalescer.deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(outcome) = outcomes.recv() => self.handle_outcome(outcome),
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fire();
                }
            }
        }
        log::debug!("aggregation actor stopped with {} compositions in flight", self.in_flight);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Observe(observation, reply) => {
                let _ = reply.send(self.observe(observation));
            }
            Command::SetPaused(paused, reply) => {
                let changed = self.paused != paused;
                if changed {
                    self.paused = paused;
                    self.coalescer.cancel();
                    self.session.reset();
                    self.notify_if_drained();
                }
                let _ = reply.send(changed);
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.session.stats());
            }
            Command::Drain(reply) => {
                if self.coalescer.is_pending() {
                    self.fire();
                }
                self.drain_waiters.push(reply);
                self.notify_if_drained();
            }
        }
    }

    fn observe(&mut self, observation: Observation) -> Result<Trigger, MosaicError> {
        if self.paused {
            log::debug!("dropping observation while paused: {:?}", observation.direction());
            return Ok(Trigger::NoOp);
        }

        let trigger = self.session.apply(observation)?;
        if let Trigger::Recompute { forced } = trigger {
            self.coalescer.schedule(forced);
            log::trace!(
                "recompute scheduled in {:?} (forced: {:?})",
                self.coalescer.delay(),
                forced
            );
        }
        Ok(trigger)
    }

    /// Consumes the coalescer slot and dispatches one recomputation pass.
    fn fire(&mut self) {
        let Some(forced) = self.coalescer.take() else {
            return;
        };
        for job in self.session.plan_pass(&forced) {
            self.dispatch(job);
        }
        self.notify_if_drained();
    }

    fn dispatch(&mut self, job: CompositionJob) {
        let compositor = self.compositor.clone();
        let outcomes = self.outcomes.clone();
        let (epoch, direction, signature) = (job.epoch, job.direction, job.signature.clone());

        self.in_flight += 1;
        tokio::spawn(async move {
            let result = compositor.compose(job).await;
            let _ = outcomes.send(JobOutcome {
                epoch,
                direction,
                signature,
                result,
            });
        });
    }

    fn handle_outcome(&mut self, outcome: JobOutcome) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let JobOutcome {
            epoch,
            direction,
            signature,
            result,
        } = outcome;

        if !self.session.is_current(epoch, direction, &signature) {
            self.session.stats_mut().discarded += 1;
            log::debug!("discarding stale {} composition from epoch {}", direction, epoch);
        } else {
            match result {
                Ok(composite) => {
                    self.session.stats_mut().delivered += 1;
                    log::info!(
                        "composite ready for {} ({}x{})",
                        direction,
                        composite.image.width(),
                        composite.image.height()
                    );
                    let _ = self.events.send(MosaicEvent::Composite(composite));
                }
                Err(source) => {
                    self.session.stats_mut().failed += 1;
                    self.session.forget_emission(direction, &signature);
                    log::warn!("composition failed for {}: {}", direction, source);
                    let _ = self.events.send(MosaicEvent::Failed {
                        direction,
                        signature,
                        error: MosaicError::Collaborator { direction, source },
                    });
                }
            }
        }

        self.notify_if_drained();
    }

    fn notify_if_drained(&mut self) {
        if self.in_flight > 0 || self.coalescer.is_pending() {
            return;
        }
        for waiter in self.drain_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
