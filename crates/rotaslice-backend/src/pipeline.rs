//! Job pipeline
//!
//! `Prepare → Execute → ExtractToolpath → ExtractVisualization`, run once
//! per plate. Each stage ends with a [`ResultCode`]; the first code other
//! than `Finished` ends the run. Everything a run creates (request files,
//! engine output, synthesis state) lives in a per-run work directory and
//! per-run values, and is dropped with the run.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use rotaslice_core::event_bus::{BackendEvent, EngineEvent, SliceEvent};
use rotaslice_core::{
    AppEvent, BuildPlateId, CancelToken, EventBus, PipelineError, ResultCode, StageKind,
    SynthesisError,
};
use rotaslice_engine::{spawn, wait_or_cancel, EngineMessage, EngineOutcome, MessageDispatcher};
use rotaslice_settings::{Config, EngineSettings, SettingsSnapshot};
use rotaslice_toolpath::{SynthesisOutput, SynthesisRun, SynthesisSettings};

use crate::output::{SliceOutput, SliceOutputSink, Visualization};
use crate::request::{gather_objects, prepare_request, SliceRequest};
use crate::scene::SceneSource;
use crate::strategy::{strategy_for, EngineStrategy, SubEngine};

/// Final result of one plate
#[derive(Debug, Clone, PartialEq)]
pub struct PlateOutcome {
    pub plate: BuildPlateId,
    pub code: ResultCode,
    /// Why the run failed, naming keys or extruders where possible
    pub message: Option<String>,
}

/// Inputs of one run that the controller keeps a hold on
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub plate: BuildPlateId,
    pub cancel: CancelToken,
    /// Cleared when the plate stops being displayed or is superseded
    pub visualize: Arc<AtomicBool>,
    pub progress: Option<Arc<watch::Sender<f64>>>,
}

impl PipelineRun {
    pub fn new(plate: BuildPlateId) -> Self {
        Self {
            plate,
            cancel: CancelToken::new(),
            visualize: Arc::new(AtomicBool::new(true)),
            progress: None,
        }
    }
}

/// Maps stage-local progress onto the overall `[0, 1]` range
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    plate: BuildPlateId,
    bus: Arc<EventBus>,
    tx: Option<Arc<watch::Sender<f64>>>,
}

impl ProgressReporter {
    pub fn new(plate: BuildPlateId, bus: Arc<EventBus>, tx: Option<Arc<watch::Sender<f64>>>) -> Self {
        Self { plate, bus, tx }
    }

    pub fn report(&self, stage: StageKind, fraction: f64) {
        let (start, span) = stage.progress_span();
        let value = (start + span * fraction.clamp(0.0, 1.0)).clamp(0.0, 1.0);
        if let Some(tx) = &self.tx {
            tx.send_replace(value);
        }
        self.bus.publish(AppEvent::Backend(BackendEvent::Progress {
            plate: self.plate,
            fraction: value,
        }));
    }
}

#[derive(Debug)]
struct Stop {
    code: ResultCode,
    message: Option<String>,
}

impl Stop {
    fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    fn cancelled() -> Self {
        Self {
            code: ResultCode::Cancelled,
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Error, message)
    }

    fn aborted(stage: StageKind, err: tokio::task::JoinError) -> Self {
        Self::error(
            PipelineError::StageAborted {
                stage: stage.to_string(),
                reason: err.to_string(),
            }
            .to_string(),
        )
    }
}

impl From<SynthesisError> for Stop {
    fn from(err: SynthesisError) -> Self {
        match err {
            SynthesisError::Cancelled => Stop::cancelled(),
            other => Stop::error(other.to_string()),
        }
    }
}

impl From<PipelineError> for Stop {
    fn from(err: PipelineError) -> Self {
        Stop::error(err.to_string())
    }
}

struct Prepared {
    request: SliceRequest,
    settings: SynthesisSettings,
    strategy: Arc<dyn EngineStrategy>,
    subs: Vec<SubEngine>,
    work_dir: tempfile::TempDir,
}

/// The stage chain shared by every kinematic mode
pub struct Pipeline {
    scene: Arc<dyn SceneSource>,
    sink: Arc<dyn SliceOutputSink>,
    profile: SettingsSnapshot,
    engine: EngineSettings,
    work_root: Option<PathBuf>,
    visualize: bool,
    bus: Arc<EventBus>,
    strategy: Option<Arc<dyn EngineStrategy>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("engine", &self.engine)
            .field("work_root", &self.work_root)
            .field("visualize", &self.visualize)
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        config: &Config,
        scene: Arc<dyn SceneSource>,
        sink: Arc<dyn SliceOutputSink>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            scene,
            sink,
            profile: config.snapshot(),
            engine: config.engine.clone(),
            work_root: config.backend.work_dir.clone(),
            visualize: config.backend.visualize,
            bus,
            strategy: None,
        }
    }

    /// Use `strategy` for every plate instead of the one for the plate's mode
    pub fn with_strategy(mut self, strategy: Arc<dyn EngineStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn scene(&self) -> &Arc<dyn SceneSource> {
        &self.scene
    }

    /// Run every stage for one plate
    pub async fn run(&self, run: PipelineRun) -> PlateOutcome {
        let plate = run.plate;
        let progress = ProgressReporter::new(plate, Arc::clone(&self.bus), run.progress.clone());
        tracing::info!("Plate {}: slicing started", plate);

        match self.stages(&run, &progress).await {
            Ok(()) => {
                progress.report(StageKind::ExtractVisualization, 1.0);
                tracing::info!("Plate {}: slicing finished", plate);
                PlateOutcome {
                    plate,
                    code: ResultCode::Finished,
                    message: None,
                }
            }
            Err(stop) => {
                match stop.code {
                    ResultCode::Cancelled => tracing::info!("Plate {}: cancelled", plate),
                    ResultCode::Error => tracing::error!(
                        "Plate {}: {}",
                        plate,
                        stop.message.as_deref().unwrap_or("failed")
                    ),
                    code => tracing::info!("Plate {}: {}", plate, code.description()),
                }
                PlateOutcome {
                    plate,
                    code: stop.code,
                    message: stop.message,
                }
            }
        }
    }

    async fn stages(&self, run: &PipelineRun, progress: &ProgressReporter) -> Result<(), Stop> {
        let plate = run.plate;

        self.begin(plate, StageKind::Prepare, progress);
        let prepared = self.end(plate, StageKind::Prepare, self.prepare(run).await)?;

        self.begin(plate, StageKind::Execute, progress);
        let streams = self.end(
            plate,
            StageKind::Execute,
            self.execute(run, &prepared, progress).await,
        )?;

        self.begin(plate, StageKind::ExtractToolpath, progress);
        let synthesized = self.end(
            plate,
            StageKind::ExtractToolpath,
            self.extract_toolpath(run, &prepared.settings, streams).await,
        )?;

        self.begin(plate, StageKind::ExtractVisualization, progress);
        let visualization = self.end(
            plate,
            StageKind::ExtractVisualization,
            self.extract_visualization(run, &synthesized),
        )?;

        run.cancel.check()?;
        self.publish(plate, &prepared.settings, synthesized, visualization);
        Ok(())
    }

    fn begin(&self, plate: BuildPlateId, stage: StageKind, progress: &ProgressReporter) {
        tracing::debug!("Plate {}: {} started", plate, stage);
        self.bus
            .publish(AppEvent::Slice(SliceEvent::StageStarted { plate, stage }));
        progress.report(stage, 0.0);
    }

    fn end<T>(&self, plate: BuildPlateId, stage: StageKind, result: Result<T, Stop>) -> Result<T, Stop> {
        let code = match &result {
            Ok(_) => ResultCode::Finished,
            Err(stop) => stop.code,
        };
        self.bus.publish(AppEvent::Slice(SliceEvent::StageFinished {
            plate,
            stage,
            result: code,
        }));
        result
    }

    async fn prepare(&self, run: &PipelineRun) -> Result<Prepared, Stop> {
        let scene = Arc::clone(&self.scene);
        let profile = self.profile.clone();
        let cancel = run.cancel.clone();
        let plate = run.plate;

        let request = tokio::task::spawn_blocking(move || {
            let mut request = prepare_request(plate, &profile, scene.as_ref());
            gather_objects(&mut request, scene.as_ref(), &cancel).map(|_| request)
        })
        .await
        .map_err(|e| Stop::aborted(StageKind::Prepare, e))??;

        if !request.is_ok() {
            return Err(Stop {
                code: request.result,
                message: request.message(),
            });
        }

        let settings = request
            .synthesis_settings()
            .map_err(|e| Stop::new(ResultCode::SettingError, e.to_string()))?;
        let strategy = self
            .strategy
            .clone()
            .unwrap_or_else(|| strategy_for(settings.mode));
        let work_dir = self.work_dir()?;

        let mut codes = Vec::new();
        let mut subs = Vec::new();
        for sub in strategy.sub_engines(&settings) {
            run.cancel.check()?;
            let code = strategy
                .prepare_request(&sub, &request, work_dir.path())
                .await?;
            tracing::debug!("Plate {}: sub-engine {} prepared: {}", plate, sub.name, code);
            codes.push(code);
            if code.is_finished() {
                subs.push(sub);
            }
        }

        let code = ResultCode::combine(codes);
        if !code.is_finished() {
            return Err(Stop::new(
                code,
                format!("Plate {}: {}", plate, code.description()),
            ));
        }

        tracing::info!(
            "Plate {}: {} objects, {} strategy, {} engine runs",
            plate,
            request.objects.len(),
            strategy.name(),
            subs.len()
        );
        Ok(Prepared {
            request,
            settings,
            strategy,
            subs,
            work_dir,
        })
    }

    fn work_dir(&self) -> Result<tempfile::TempDir, PipelineError> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("rotaslice-");
            builder
        };
        let dir = match &self.work_root {
            Some(root) => std::fs::create_dir_all(root).and_then(|_| builder.tempdir_in(root)),
            None => builder.tempdir(),
        };
        dir.map_err(|e| PipelineError::WorkDir {
            reason: e.to_string(),
        })
    }

    async fn execute(
        &self,
        run: &PipelineRun,
        prepared: &Prepared,
        progress: &ProgressReporter,
    ) -> Result<Vec<(SubEngine, PathBuf)>, Stop> {
        let total = prepared.subs.len().max(1) as f64;
        let mut streams = Vec::with_capacity(prepared.subs.len());

        for (index, sub) in prepared.subs.iter().enumerate() {
            run.cancel.check()?;
            let command = prepared
                .strategy
                .spawn_command(sub, &self.engine, prepared.work_dir.path());
            let dispatcher = MessageDispatcher::new(prepared.strategy.message_handlers());
            let (tx, rx) = mpsc::unbounded_channel();

            let handle = spawn(&command, dispatcher, Some(tx), run.cancel.clone())
                .map_err(|e| Stop::error(e.to_string()))?;
            let pid = handle.pid();
            self.bus.publish(AppEvent::Engine(EngineEvent::Spawned {
                executable: command.executable.display().to_string(),
                pid,
            }));

            let forwarder = tokio::spawn(forward_messages(
                rx,
                Arc::clone(&self.bus),
                progress.clone(),
                index as f64,
                total,
            ));
            let outcome = wait_or_cancel(handle).await;
            if let Err(e) = forwarder.await {
                tracing::warn!("Engine message forwarding failed: {}", e);
            }

            match outcome {
                Ok(EngineOutcome::Finished { output }) => {
                    self.bus
                        .publish(AppEvent::Engine(EngineEvent::Exited { code: Some(0) }));
                    streams.push((sub.clone(), output));
                }
                Ok(EngineOutcome::Cancelled) => {
                    self.bus
                        .publish(AppEvent::Engine(EngineEvent::Terminated { pid }));
                    return Err(Stop::cancelled());
                }
                Err(e) => {
                    if let rotaslice_core::EngineError::Exited { code } = &e {
                        self.bus
                            .publish(AppEvent::Engine(EngineEvent::Exited { code: *code }));
                    }
                    return Err(Stop::error(format!("{} ({})", e, sub.name)));
                }
            }
            progress.report(StageKind::Execute, (index as f64 + 1.0) / total);
        }
        Ok(streams)
    }

    async fn extract_toolpath(
        &self,
        run: &PipelineRun,
        settings: &SynthesisSettings,
        streams: Vec<(SubEngine, PathBuf)>,
    ) -> Result<SynthesisOutput, Stop> {
        let settings = settings.clone();
        let cancel = run.cancel.clone();
        let output = tokio::task::spawn_blocking(move || synthesize_streams(&settings, &streams, cancel))
            .await
            .map_err(|e| Stop::aborted(StageKind::ExtractToolpath, e))??;
        // the engine may have finished just before a cancel
        run.cancel.check()?;
        Ok(output)
    }

    fn extract_visualization(
        &self,
        run: &PipelineRun,
        output: &SynthesisOutput,
    ) -> Result<Option<Visualization>, Stop> {
        if !self.visualize || !run.visualize.load(Ordering::SeqCst) {
            tracing::debug!("Plate {}: visualization skipped", run.plate);
            self.bus
                .publish(AppEvent::Slice(SliceEvent::VisualizationSkipped { plate: run.plate }));
            return Ok(None);
        }
        let mut layers = Vec::with_capacity(output.layers.len());
        for (index, layer) in &output.layers {
            run.cancel.check()?;
            layers.push((*index, layer.polylines()));
        }
        Ok(Some(layers))
    }

    fn publish(
        &self,
        plate: BuildPlateId,
        settings: &SynthesisSettings,
        synthesized: SynthesisOutput,
        visualization: Option<Visualization>,
    ) {
        let values = synthesized.deferred_values(settings);
        let mut gcode = synthesized.gcode;
        values.resolve_all(&mut gcode);

        let output = SliceOutput {
            plate,
            gcode,
            layers: synthesized.layers,
            time: synthesized.time,
            material: synthesized.material,
            filament_m: values.filament_amount,
            filament_g: values.filament_weight,
            visualization,
        };
        self.bus.publish(AppEvent::Slice(SliceEvent::OutputReady {
            plate,
            layer_count: output.layer_count(),
            print_time_seconds: output.print_time_seconds(),
        }));
        self.sink.publish(output);
    }
}

/// Feed every engine stream into one synthesis run, in print order
pub fn synthesize_streams(
    settings: &SynthesisSettings,
    streams: &[(SubEngine, PathBuf)],
    cancel: CancelToken,
) -> Result<SynthesisOutput, SynthesisError> {
    let mut synthesis = SynthesisRun::new(settings, cancel);
    synthesis.basement()?;
    for (sub, path) in streams {
        let reader = open_stream(path)?;
        tracing::debug!("Synthesizing {} from {}", sub.name, path.display());
        synthesis.feed(sub.mapping, reader)?;
    }
    Ok(synthesis.finish())
}

fn open_stream(path: &Path) -> Result<BufReader<File>, SynthesisError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| SynthesisError::Io {
            reason: format!("{}: {}", path.display(), e),
        })
}

async fn forward_messages(
    mut rx: mpsc::UnboundedReceiver<EngineMessage>,
    bus: Arc<EventBus>,
    progress: ProgressReporter,
    index: f64,
    total: f64,
) {
    while let Some(message) = rx.recv().await {
        if let EngineMessage::Progress { fraction, .. } = &message {
            progress.report(StageKind::Execute, (index + fraction) / total);
        }
        bus.publish(AppEvent::Engine(EngineEvent::from(&message)));
    }
}
