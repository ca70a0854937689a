//! Slice requests and pre-flight validation
//!
//! A [`SliceRequest`] is built when a plate is dequeued. Preparation pulls
//! every object from the [`SceneSource`], checks settings, extruders,
//! materials and the build volume, and records the most severe problem as
//! the request's [`ResultCode`] together with messages that name the
//! offending keys and extruders.

use serde::Serialize;

use rotaslice_core::{BuildPlateId, CancelToken, ResultCode, SynthesisError};
use rotaslice_settings::{SettingsError, SettingsSnapshot};
use rotaslice_toolpath::SynthesisSettings;

use crate::scene::{ObjectSnapshot, SceneSource};

/// Work item for one plate
#[derive(Debug, Clone, Serialize)]
pub struct SliceRequest {
    pub plate: BuildPlateId,
    pub objects: Vec<ObjectSnapshot>,
    pub settings: SettingsSnapshot,
    pub result: ResultCode,
    /// Human readable reasons for `result`
    pub messages: Vec<String>,
}

impl SliceRequest {
    pub fn new(plate: BuildPlateId, settings: SettingsSnapshot) -> Self {
        Self {
            plate,
            objects: Vec::new(),
            settings,
            result: ResultCode::Finished,
            messages: Vec::new(),
        }
    }

    /// Record a problem; the most severe code wins
    pub fn fail(&mut self, code: ResultCode, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("Plate {}: {} ({})", self.plate, code, message);
        self.result = self.result.max_severity(code);
        self.messages.push(message);
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_finished()
    }

    /// All messages joined for display
    pub fn message(&self) -> Option<String> {
        (!self.messages.is_empty()).then(|| self.messages.join("\n"))
    }

    /// Parsed synthesis settings of this request
    pub fn synthesis_settings(&self) -> Result<SynthesisSettings, SettingsError> {
        SynthesisSettings::from_snapshot(&self.settings)
    }
}

#[derive(Debug, Clone, Copy)]
struct BuildVolume {
    width: f64,
    depth: f64,
    height: f64,
}

impl BuildVolume {
    fn from_snapshot(snapshot: &SettingsSnapshot) -> Self {
        let mut reader = snapshot.reader();
        Self {
            width: reader.float_or("machine_width", 200.0),
            depth: reader.float_or("machine_depth", 200.0),
            height: reader.float_or("machine_height", 200.0),
        }
    }

    /// Centered on the rotary axis, Z up from the plate
    fn contains(&self, min: [f64; 3], max: [f64; 3]) -> bool {
        let (hw, hd) = (self.width / 2.0, self.depth / 2.0);
        min[0] >= -hw
            && max[0] <= hw
            && min[1] >= -hd
            && max[1] <= hd
            && min[2] >= 0.0
            && max[2] <= self.height
    }
}

/// Empty request for `plate` with the scene settings merged over `profile`
pub fn prepare_request(
    plate: BuildPlateId,
    profile: &SettingsSnapshot,
    scene: &dyn SceneSource,
) -> SliceRequest {
    let mut settings = profile.clone();
    settings.merge(&scene.settings(plate));
    SliceRequest::new(plate, settings)
}

/// Pull and validate the plate's objects into `request`
///
/// Cancellation is checked before every object pulled from the scene.
pub fn gather_objects(
    request: &mut SliceRequest,
    scene: &dyn SceneSource,
    cancel: &CancelToken,
) -> Result<(), SynthesisError> {
    let global = match request.synthesis_settings() {
        Ok(settings) => Some(settings),
        Err(e) => {
            request.fail(ResultCode::SettingError, e.to_string());
            None
        }
    };
    let volume = BuildVolume::from_snapshot(&request.settings);
    let max_temperature = request
        .settings
        .reader()
        .float_or("machine_max_temperature", f64::INFINITY);

    let mut cursor = scene.objects(request.plate);
    while let Some(object) = cursor.next_sliceable_object() {
        cancel.check()?;
        if !object.is_sliceable() {
            tracing::debug!("Plate {}: '{}' has no mesh, skipped", request.plate, object.name);
            continue;
        }
        if let Some(global) = &global {
            check_object(request, &object, global, volume, max_temperature);
        }
        request.objects.push(object);
    }

    if request.objects.is_empty() {
        request.fail(
            ResultCode::NothingToSlice,
            format!("Plate {} has nothing to slice", request.plate),
        );
    }
    Ok(())
}

fn check_object(
    request: &mut SliceRequest,
    object: &ObjectSnapshot,
    global: &SynthesisSettings,
    volume: BuildVolume,
    max_temperature: f64,
) {
    match global.extruders.get(object.extruder) {
        Some(params) if params.enabled => {
            if params.print_temperature > max_temperature {
                request.fail(
                    ResultCode::MaterialIncompatible,
                    format!(
                        "Extruder {}: print_temperature {} exceeds machine_max_temperature {} ('{}')",
                        object.extruder, params.print_temperature, max_temperature, object.name
                    ),
                );
            }
        }
        _ => request.fail(
            ResultCode::ObjectsWithDisabledExtruder,
            format!(
                "Object '{}' uses extruder {} which is disabled",
                object.name, object.extruder
            ),
        ),
    }

    if !object.overrides.is_empty() {
        let mut merged = request.settings.clone();
        for (key, value) in &object.overrides {
            merged.set(key.clone(), value.clone());
        }
        if let Err(e) = SynthesisSettings::from_snapshot(&merged) {
            request.fail(
                ResultCode::ObjectSettingError,
                format!("Object '{}': {}", object.name, e),
            );
        }
    }

    if let Some((min, max)) = object.bounds() {
        if !volume.contains(min, max) {
            request.fail(
                ResultCode::BuildPlateError,
                format!("Object '{}' is outside the build volume", object.name),
            );
        }
    }
}
