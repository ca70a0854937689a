//! Event type definitions for the event bus.
//!
//! Events are cloneable and serializable so they can be logged or replayed.

use serde::{Deserialize, Serialize};

use crate::data::{BackendState, BuildPlateId, StageKind};
use crate::result_code::ResultCode;

/// Root event enum for all backend events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    /// Controller state, queue and progress
    Backend(BackendEvent),
    /// Per-plate pipeline stages and results
    Slice(SliceEvent),
    /// Engine subprocess lifecycle and messages
    Engine(EngineEvent),
    /// User-facing errors and diagnostics
    Error(ErrorEvent),
}

impl AppEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::Backend(_) => EventCategory::Backend,
            AppEvent::Slice(_) => EventCategory::Slice,
            AppEvent::Engine(_) => EventCategory::Engine,
            AppEvent::Error(_) => EventCategory::Error,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            AppEvent::Backend(e) => e.description(),
            AppEvent::Slice(e) => e.description(),
            AppEvent::Engine(e) => e.description(),
            AppEvent::Error(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Controller events.
    Backend,
    /// Pipeline events.
    Slice,
    /// Engine subprocess events.
    Engine,
    /// Error and diagnostic events.
    Error,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Backend => write!(f, "Backend"),
            EventCategory::Slice => write!(f, "Slice"),
            EventCategory::Engine => write!(f, "Engine"),
            EventCategory::Error => write!(f, "Error"),
        }
    }
}

/// Controller events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackendEvent {
    /// Controller state transition.
    StateChanged {
        /// State before the transition.
        from: BackendState,
        /// State after the transition.
        to: BackendState,
    },
    /// A plate was added to the slicing queue.
    PlateQueued {
        /// The queued plate.
        plate: BuildPlateId,
    },
    /// Overall progress of the running plate changed.
    Progress {
        /// The plate being sliced.
        plate: BuildPlateId,
        /// Fraction in `[0, 1]`.
        fraction: f64,
    },
}

impl BackendEvent {
    fn description(&self) -> String {
        match self {
            BackendEvent::StateChanged { from, to } => {
                format!("Backend state: {} -> {}", from, to)
            }
            BackendEvent::PlateQueued { plate } => format!("Plate {} queued", plate),
            BackendEvent::Progress { plate, fraction } => {
                format!("Plate {} progress {:.0}%", plate, fraction * 100.0)
            }
        }
    }
}

/// Pipeline events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SliceEvent {
    /// A pipeline stage started.
    StageStarted {
        /// The plate being sliced.
        plate: BuildPlateId,
        /// The stage.
        stage: StageKind,
    },
    /// A pipeline stage completed with a result code.
    StageFinished {
        /// The plate being sliced.
        plate: BuildPlateId,
        /// The stage.
        stage: StageKind,
        /// The stage outcome.
        result: ResultCode,
    },
    /// Synthesized output was handed to the sink.
    OutputReady {
        /// The plate that was sliced.
        plate: BuildPlateId,
        /// Number of layers published.
        layer_count: usize,
        /// Estimated print time in seconds.
        print_time_seconds: f64,
    },
    /// Visualization extraction was skipped for a plate.
    VisualizationSkipped {
        /// The plate that was not visualized.
        plate: BuildPlateId,
    },
}

impl SliceEvent {
    fn description(&self) -> String {
        match self {
            SliceEvent::StageStarted { plate, stage } => {
                format!("Plate {}: {} started", plate, stage)
            }
            SliceEvent::StageFinished {
                plate,
                stage,
                result,
            } => format!("Plate {}: {} finished with {}", plate, stage, result),
            SliceEvent::OutputReady {
                plate,
                layer_count,
                print_time_seconds,
            } => format!(
                "Plate {}: {} layers, {:.0}s",
                plate, layer_count, print_time_seconds
            ),
            SliceEvent::VisualizationSkipped { plate } => {
                format!("Plate {}: visualization skipped", plate)
            }
        }
    }
}

/// Engine subprocess events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// An engine process was launched.
    Spawned {
        /// Executable path.
        executable: String,
        /// Operating system process id, when known.
        pid: Option<u32>,
    },
    /// Engine reported progress within one of its own stages.
    Progress {
        /// Engine stage name.
        stage: String,
        /// Fraction in `[0, 1]`.
        fraction: f64,
    },
    /// Engine printed a warning.
    Warning {
        /// Warning text.
        text: String,
    },
    /// Engine announced its layer count.
    LayerCount {
        /// Number of layers.
        count: usize,
    },
    /// Engine process exited on its own.
    Exited {
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },
    /// Engine process was terminated by the backend.
    Terminated {
        /// Operating system process id, when known.
        pid: Option<u32>,
    },
}

impl EngineEvent {
    fn description(&self) -> String {
        match self {
            EngineEvent::Spawned { executable, pid } => {
                format!("Engine {} spawned (pid {:?})", executable, pid)
            }
            EngineEvent::Progress { stage, fraction } => {
                format!("Engine {}: {:.0}%", stage, fraction * 100.0)
            }
            EngineEvent::Warning { text } => format!("Engine warning: {}", text),
            EngineEvent::LayerCount { count } => format!("Engine layer count: {}", count),
            EngineEvent::Exited { code } => format!("Engine exited: {:?}", code),
            EngineEvent::Terminated { pid } => format!("Engine terminated (pid {:?})", pid),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Non-critical warning that does not block operation.
    Warning,
    /// Error that may be recoverable.
    Error,
}

/// Error and diagnostic events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ErrorEvent {
    /// Message shown to the user for a failed plate with placed content.
    SliceFailed {
        /// The failing plate.
        plate: BuildPlateId,
        /// The failure code.
        code: ResultCode,
        /// Human-readable message naming the offending keys or extruders.
        message: String,
    },
    /// Warning (non-blocking).
    Warning {
        /// Warning code identifier.
        code: String,
        /// Human-readable warning message.
        message: String,
    },
}

impl ErrorEvent {
    fn description(&self) -> String {
        match self {
            ErrorEvent::SliceFailed {
                plate,
                code,
                message,
            } => format!("Plate {} failed [{}]: {}", plate, code, message),
            ErrorEvent::Warning { code, message } => {
                format!("Warning [{}]: {}", code, message)
            }
        }
    }

    /// Get the severity of this error event
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ErrorEvent::SliceFailed { .. } => ErrorSeverity::Error,
            ErrorEvent::Warning { .. } => ErrorSeverity::Warning,
        }
    }
}
