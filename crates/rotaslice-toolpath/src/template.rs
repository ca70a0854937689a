//! Prologue/epilogue templates and deferred tokens
//!
//! Templates use `{key}` placeholders. Settings keys are interpolated when
//! synthesis starts; the deferred tokens below depend on the finished run
//! and are resolved afterwards by [`DeferredValues`].

use regex::{Captures, Regex};
use std::sync::OnceLock;

use rotaslice_core::KinematicMode;

use crate::settings::SynthesisSettings;

/// Tokens resolved only after synthesis completes
pub const DEFERRED_TOKENS: [&str; 6] = [
    "print_time",
    "print_time_seconds",
    "filament_amount",
    "filament_weight",
    "jobname",
    "layer_count",
];

const PLANAR_PROLOGUE: &str = "\
;FLAVOR:Marlin
;JOB:{jobname}
;TIME:{print_time_seconds}
;PRINT_TIME:{print_time}
;Filament used: {filament_amount}m
;Filament weight: {filament_weight}g
;LAYER_COUNT:{layer_count}
M140 S{bed_temperature}
M104 S{print_temperature}
M190 S{bed_temperature}
M109 S{print_temperature}
G21
G90
M82
G92 E0";

const ROTARY_PROLOGUE: &str = "\
;FLAVOR:Marlin
;JOB:{jobname}
;KINEMATICS:{kinematic_mode}
;TIME:{print_time_seconds}
;PRINT_TIME:{print_time}
;Filament used: {filament_amount}m
;Filament weight: {filament_weight}g
;LAYER_COUNT:{layer_count}
M140 S{bed_temperature}
M104 S{print_temperature}
M190 S{bed_temperature}
M109 S{print_temperature}
G21
G90
G55
M82
G92 E0";

const PLANAR_EPILOGUE: &str = "\
M104 S0
M140 S0
M107
M84
;END:{jobname}";

const ROTARY_EPILOGUE: &str = "\
M104 S0
M140 S0
M107
G0 A0 C0
G54
M84
;END:{jobname}";

fn token_regex() -> &'static Regex {
    static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();
    TOKEN_REGEX.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("invalid token regex")
    })
}

/// Replace `{key}` placeholders
///
/// Keys the lookup does not know are left intact and returned. Deferred
/// tokens are left intact silently.
pub fn interpolate<F>(template: &str, lookup: F) -> (String, Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    let mut unknown = Vec::new();
    let rendered = token_regex()
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            match lookup(key) {
                Some(value) => value,
                None => {
                    if !DEFERRED_TOKENS.contains(&key) {
                        unknown.push(key.to_string());
                    }
                    caps[0].to_string()
                }
            }
        })
        .into_owned();
    (rendered, unknown)
}

/// Prologue and epilogue for one run
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSet {
    pub prologue: String,
    pub epilogue: String,
}

impl TemplateSet {
    /// Stock templates for a kinematic mode
    pub fn for_mode(mode: KinematicMode) -> Self {
        if mode.has_rotary_axes() {
            Self {
                prologue: ROTARY_PROLOGUE.to_string(),
                epilogue: ROTARY_EPILOGUE.to_string(),
            }
        } else {
            Self {
                prologue: PLANAR_PROLOGUE.to_string(),
                epilogue: PLANAR_EPILOGUE.to_string(),
            }
        }
    }

    /// Stock templates, replaced by `machine_start_gcode` /
    /// `machine_end_gcode` when those settings are present
    pub fn from_settings(settings: &SynthesisSettings) -> Self {
        let mut set = Self::for_mode(settings.mode);
        if let Some(start) = settings.snapshot.get("machine_start_gcode") {
            set.prologue = unescape_newlines(start);
        }
        if let Some(end) = settings.snapshot.get("machine_end_gcode") {
            set.epilogue = unescape_newlines(end);
        }
        set
    }

    /// Interpolated prologue lines
    pub fn render_prologue(&self, settings: &SynthesisSettings) -> Vec<String> {
        render(&self.prologue, settings)
    }

    /// Interpolated epilogue lines
    pub fn render_epilogue(&self, settings: &SynthesisSettings) -> Vec<String> {
        render(&self.epilogue, settings)
    }
}

fn unescape_newlines(text: &str) -> String {
    text.replace("\\n", "\n")
}

fn render(template: &str, settings: &SynthesisSettings) -> Vec<String> {
    let extruder = settings.active_extruder;
    let (text, unknown) = interpolate(template, |key| {
        if DEFERRED_TOKENS.contains(&key) {
            return None;
        }
        settings
            .snapshot
            .get_extruder(extruder, key)
            .map(str::to_string)
    });
    for key in unknown {
        tracing::warn!("Template references unknown setting '{}'", key);
    }
    text.lines().map(str::to_string).collect()
}

/// Values of the deferred tokens for a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredValues {
    pub print_time_seconds: f64,
    /// Meters of filament
    pub filament_amount: f64,
    /// Grams of filament
    pub filament_weight: f64,
    pub jobname: String,
    pub layer_count: usize,
}

impl DeferredValues {
    fn value(&self, token: &str) -> Option<String> {
        match token {
            "print_time" => Some(format_duration(self.print_time_seconds)),
            "print_time_seconds" => Some(format!("{:.0}", self.print_time_seconds)),
            "filament_amount" => Some(format!("{:.2}", self.filament_amount)),
            "filament_weight" => Some(format!("{:.2}", self.filament_weight)),
            "jobname" => Some(self.jobname.clone()),
            "layer_count" => Some(self.layer_count.to_string()),
            _ => None,
        }
    }

    /// Resolve deferred tokens in one line
    pub fn resolve(&self, line: &str) -> String {
        if !line.contains('{') {
            return line.to_string();
        }
        interpolate(line, |key| self.value(key)).0
    }

    /// Resolve deferred tokens in place
    pub fn resolve_all(&self, lines: &mut [String]) {
        for line in lines.iter_mut() {
            if line.contains('{') {
                *line = self.resolve(line);
            }
        }
    }
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
