//! Backend controller
//!
//! One tokio task owns the plate queue, the displayed plate, the in-flight
//! pipeline and the debounce timer. Everything else talks to it through a
//! [`BackendHandle`], which sends [`Command`]s and observes the state and
//! progress watch channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use rotaslice_core::event_bus::{BackendEvent, ErrorEvent};
use rotaslice_core::{
    emit, AppEvent, BackendState, BuildPlateId, CancelToken, EventBus, PipelineError, ResultCode,
};
use rotaslice_settings::Config;

use crate::output::SliceOutputSink;
use crate::pipeline::{Pipeline, PipelineRun, PlateOutcome};
use crate::queue::BuildPlateQueue;
use crate::scene::SceneSource;
use crate::state::StateMachine;
use crate::strategy::EngineStrategy;

/// Requests accepted by the controller task
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Slice `plate` as soon as possible
    RequestSlice(BuildPlateId),
    /// Something on `plate` changed; structural changes invalidate a running slice
    SceneChanged { plate: BuildPlateId, structural: bool },
    /// Stop the running slice and forget queued work
    Cancel,
    /// Queue every plate
    ForceAll,
    ToolOperationStarted,
    ToolOperationFinished,
    /// Plate shown in the viewport, `None` to visualize every plate
    SetDisplayedPlate(Option<BuildPlateId>),
    /// Ask the scene again whether slicing is blocked
    RecheckBlockers,
    Shutdown,
}

/// Builder for the controller task
pub struct Backend {
    config: Config,
    scene: Arc<dyn SceneSource>,
    sink: Arc<dyn SliceOutputSink>,
    bus: Arc<EventBus>,
    strategy: Option<Arc<dyn EngineStrategy>>,
}

impl Backend {
    pub fn new(config: Config, scene: Arc<dyn SceneSource>, sink: Arc<dyn SliceOutputSink>) -> Self {
        Self {
            config,
            scene,
            sink,
            bus: Arc::new(EventBus::new()),
            strategy: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn EngineStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Start the controller task; must be called inside a tokio runtime
    pub fn spawn(self) -> BackendHandle {
        let mut pipeline = Pipeline::new(
            &self.config,
            Arc::clone(&self.scene),
            self.sink,
            Arc::clone(&self.bus),
        );
        if let Some(strategy) = self.strategy {
            pipeline = pipeline.with_strategy(strategy);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = watch::channel(0.0);
        let machine = StateMachine::new(Arc::clone(&self.bus));
        let state_rx = machine.subscribe();

        let controller = Controller {
            pipeline: Arc::new(pipeline),
            scene: self.scene,
            bus: Arc::clone(&self.bus),
            machine,
            queue: BuildPlateQueue::new(),
            pending: BuildPlateQueue::new(),
            tool_buffer: Vec::new(),
            tool_active: false,
            displayed: None,
            debounce: self.config.backend.debounce(),
            deadline: None,
            auto_slice: self.config.backend.auto_slice,
            plate_count: self.config.backend.plate_count,
            current: None,
            progress: Arc::new(progress_tx),
        };
        let task = tokio::spawn(controller.run(rx));

        BackendHandle {
            tx,
            state: state_rx,
            progress: progress_rx,
            bus: self.bus,
            task: Some(task),
        }
    }
}

/// Control surface of a running backend
#[derive(Debug)]
pub struct BackendHandle {
    tx: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<BackendState>,
    progress: watch::Receiver<f64>,
    bus: Arc<EventBus>,
    task: Option<JoinHandle<()>>,
}

impl BackendHandle {
    fn send(&self, command: Command) -> Result<(), PipelineError> {
        self.tx
            .send(command)
            .map_err(|_| PipelineError::ControllerGone)
    }

    pub fn request_slice(&self, plate: BuildPlateId) -> Result<(), PipelineError> {
        self.send(Command::RequestSlice(plate))
    }

    pub fn notify_change(&self, plate: BuildPlateId, structural: bool) -> Result<(), PipelineError> {
        self.send(Command::SceneChanged { plate, structural })
    }

    pub fn cancel(&self) -> Result<(), PipelineError> {
        self.send(Command::Cancel)
    }

    pub fn force_all(&self) -> Result<(), PipelineError> {
        self.send(Command::ForceAll)
    }

    pub fn begin_tool_operation(&self) -> Result<(), PipelineError> {
        self.send(Command::ToolOperationStarted)
    }

    pub fn end_tool_operation(&self) -> Result<(), PipelineError> {
        self.send(Command::ToolOperationFinished)
    }

    pub fn set_displayed_plate(&self, plate: Option<BuildPlateId>) -> Result<(), PipelineError> {
        self.send(Command::SetDisplayedPlate(plate))
    }

    pub fn recheck(&self) -> Result<(), PipelineError> {
        self.send(Command::RecheckBlockers)
    }

    pub fn state(&self) -> BackendState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BackendState> {
        self.state.clone()
    }

    /// Overall progress of the running plate in `[0, 1]`
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress.clone()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for_state<F>(&self, predicate: F) -> Result<BackendState, PipelineError>
    where
        F: Fn(BackendState) -> bool,
    {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|state| predicate(*state))
            .await
            .map_err(|_| PipelineError::ControllerGone)?;
        Ok(*state)
    }

    /// Cancel any running slice and stop the controller task
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Backend controller ended abnormally: {}", e);
            }
        }
    }
}

struct InFlight {
    plate: BuildPlateId,
    cancel: CancelToken,
    visualize: Arc<AtomicBool>,
    task: JoinHandle<PlateOutcome>,
}

enum Wake {
    Command(Option<Command>),
    Finished(Result<PlateOutcome, tokio::task::JoinError>),
    Debounce,
}

struct Controller {
    pipeline: Arc<Pipeline>,
    scene: Arc<dyn SceneSource>,
    bus: Arc<EventBus>,
    machine: StateMachine,
    /// Plates waiting to be sliced, FIFO
    queue: BuildPlateQueue,
    /// Changed plates waiting for the debounce timer or a settled pipeline
    pending: BuildPlateQueue,
    tool_buffer: Vec<(BuildPlateId, bool)>,
    tool_active: bool,
    displayed: Option<BuildPlateId>,
    debounce: Duration,
    deadline: Option<Instant>,
    auto_slice: bool,
    plate_count: u32,
    current: Option<InFlight>,
    progress: Arc<watch::Sender<f64>>,
}

async fn wait_current(current: &mut Option<InFlight>) -> Result<PlateOutcome, tokio::task::JoinError> {
    match current {
        Some(in_flight) => (&mut in_flight.task).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Controller {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Backend controller started");
        self.recheck();

        loop {
            let wake = tokio::select! {
                command = rx.recv() => Wake::Command(command),
                outcome = wait_current(&mut self.current) => Wake::Finished(outcome),
                _ = sleep_until(self.deadline) => Wake::Debounce,
            };

            match wake {
                Wake::Command(None) | Wake::Command(Some(Command::Shutdown)) => {
                    self.stop().await;
                    break;
                }
                Wake::Command(Some(command)) => self.handle(command),
                Wake::Finished(outcome) => self.finished(outcome),
                Wake::Debounce => self.debounce_elapsed(),
            }
        }
        tracing::debug!("Backend controller stopped");
    }

    fn handle(&mut self, command: Command) {
        tracing::debug!("Backend command: {:?}", command);
        match command {
            Command::RequestSlice(plate) => {
                self.enqueue(plate);
                self.try_start();
            }
            Command::SceneChanged { plate, structural } => self.scene_changed(plate, structural),
            Command::Cancel => {
                self.queue.clear();
                self.pending.clear();
                self.deadline = None;
                self.cancel_current();
                self.reset();
            }
            Command::ForceAll => {
                self.deadline = None;
                for plate in 0..self.plate_count {
                    self.pending.remove(plate);
                    self.enqueue(plate);
                }
                self.try_start();
            }
            Command::ToolOperationStarted => {
                self.tool_active = true;
                self.deadline = None;
            }
            Command::ToolOperationFinished => {
                self.tool_active = false;
                for (plate, structural) in std::mem::take(&mut self.tool_buffer) {
                    self.scene_changed(plate, structural);
                }
            }
            Command::SetDisplayedPlate(plate) => {
                self.displayed = plate;
                if let Some(current) = &self.current {
                    if !self.should_visualize(current.plate) {
                        current.visualize.store(false, Ordering::SeqCst);
                    }
                }
            }
            Command::RecheckBlockers => self.recheck(),
            Command::Shutdown => {}
        }
    }

    fn enqueue(&mut self, plate: BuildPlateId) {
        if self.queue.push(plate) {
            self.bus
                .publish(AppEvent::Backend(BackendEvent::PlateQueued { plate }));
        }
    }

    fn should_visualize(&self, plate: BuildPlateId) -> bool {
        self.displayed.is_none_or(|displayed| displayed == plate)
            && !self.pending.contains(plate)
            && !self.queue.contains(plate)
    }

    fn scene_changed(&mut self, plate: BuildPlateId, structural: bool) {
        if self.tool_active {
            self.tool_buffer.push((plate, structural));
            return;
        }

        self.pending.push(plate);
        if let Some(current) = &self.current {
            current.visualize.store(false, Ordering::SeqCst);
            if structural && current.plate == plate {
                self.cancel_current();
                self.reset();
            }
            // coalesced until the pipeline settles
            return;
        }

        if matches!(self.machine.state(), BackendState::Done | BackendState::Error) {
            self.machine.transition(BackendState::NotStarted);
        }
        self.arm_debounce();
    }

    fn arm_debounce(&mut self) {
        if !self.auto_slice
            || self.tool_active
            || self.pending.is_empty()
            || self.machine.state() == BackendState::Disabled
        {
            return;
        }
        self.deadline = Some(Instant::now() + self.debounce);
    }

    fn debounce_elapsed(&mut self) {
        self.deadline = None;
        self.recheck();
        if self.machine.state() == BackendState::Disabled {
            return;
        }
        while let Some(plate) = self.pending.pop() {
            self.enqueue(plate);
        }
        self.try_start();
    }

    /// Enter or leave `Disabled` depending on the scene's blocker
    fn recheck(&mut self) {
        match self.scene.slicing_blocker() {
            Some(reason) => {
                if self.machine.state() == BackendState::Processing {
                    return;
                }
                if self.machine.state() != BackendState::Disabled {
                    tracing::warn!("Slicing blocked: {}", reason);
                    self.machine.transition(BackendState::NotStarted);
                    self.machine.transition(BackendState::Disabled);
                    self.deadline = None;
                }
            }
            None => {
                if self.machine.state() == BackendState::Disabled {
                    tracing::info!("Slicing unblocked");
                    self.machine.unblock();
                    self.arm_debounce();
                    self.try_start();
                }
            }
        }
    }

    fn try_start(&mut self) {
        if self.current.is_some() || self.machine.state() == BackendState::Disabled {
            return;
        }
        if self.queue.is_empty() {
            return;
        }
        if self.scene.slicing_blocker().is_some() {
            self.recheck();
            return;
        }
        let Some(plate) = self.queue.pop() else {
            return;
        };

        if self.machine.state() == BackendState::Error {
            self.machine.transition(BackendState::NotStarted);
        }
        self.machine.transition(BackendState::Processing);
        self.progress.send_replace(0.0);

        let mut run = PipelineRun::new(plate);
        run.visualize.store(self.should_visualize(plate), Ordering::SeqCst);
        run.progress = Some(Arc::clone(&self.progress));
        let cancel = run.cancel.clone();
        let visualize = Arc::clone(&run.visualize);

        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::spawn(async move { pipeline.run(run).await });
        self.current = Some(InFlight {
            plate,
            cancel,
            visualize,
            task,
        });
    }

    fn cancel_current(&self) {
        if let Some(current) = &self.current {
            tracing::info!("Cancelling plate {}", current.plate);
            current.cancel.cancel();
        }
    }

    fn finished(&mut self, outcome: Result<PlateOutcome, tokio::task::JoinError>) {
        let Some(current) = self.current.take() else {
            return;
        };
        let outcome = outcome.unwrap_or_else(|e| PlateOutcome {
            plate: current.plate,
            code: ResultCode::Error,
            message: Some(
                PipelineError::StageAborted {
                    stage: "pipeline".into(),
                    reason: e.to_string(),
                }
                .to_string(),
            ),
        });

        let code = if current.cancel.is_cancelled() {
            ResultCode::Cancelled
        } else {
            outcome.code
        };
        match code {
            ResultCode::Finished => {
                self.machine.transition(BackendState::Done);
            }
            ResultCode::Cancelled => self.reset(),
            _ => self.failed(outcome),
        }

        // blockers raised while processing take effect once settled
        self.recheck();
        self.arm_debounce();
        self.try_start();
    }

    fn failed(&mut self, outcome: PlateOutcome) {
        if !self.scene.has_placed_content(outcome.plate) {
            tracing::debug!(
                "Plate {} has no placed content, {} not reported",
                outcome.plate,
                outcome.code
            );
            self.reset();
            return;
        }

        let message = outcome
            .message
            .unwrap_or_else(|| outcome.code.description().to_string());
        let event = AppEvent::Error(ErrorEvent::SliceFailed {
            plate: outcome.plate,
            code: outcome.code,
            message,
        });
        self.bus.publish(event.clone());
        emit!(event);
        self.machine.transition(BackendState::Error);
    }

    async fn stop(&mut self) {
        self.deadline = None;
        self.cancel_current();
        if let Some(current) = self.current.take() {
            if let Err(e) = current.task.await {
                tracing::warn!("Plate {} task failed during shutdown: {}", current.plate, e);
            }
        }
        self.reset();
    }

    /// Back to idle, unless slicing is blocked
    fn reset(&mut self) {
        if self.machine.state() != BackendState::Disabled {
            self.machine.transition(BackendState::NotStarted);
        }
    }
}
