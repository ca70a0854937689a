//! Intermediate layer-geometry stream parser
//!
//! Line oriented records written by the engine:
//!
//! ```text
//! ;LAYER:<index>,<height>
//! ;TYPE:<WALL-OUTER|WALL-INNER|SKIN|FILL|SUPPORT|SUPPORT-INTERFACE|SKIRT>
//! POLY:<u0>,<v0>,<u1>,<v1>,...
//! ```
//!
//! Malformed records are never fatal. They are logged, counted and skipped
//! so a partially corrupt stream still yields usable output.

use regex::Regex;
use std::fmt;
use std::io::BufRead;
use std::sync::OnceLock;

use rotaslice_core::{FeatureType, SynthesisError};

/// One parsed stream record
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRecord {
    /// Layer boundary with cumulative height in mm
    Layer { index: i32, height: f64 },
    /// Feature type of the following polylines
    Feature(FeatureType),
    /// Polyline in `(u, v)` stream coordinates
    Polyline(Vec<(f64, f64)>),
}

/// A record that could not be used
#[derive(Debug, Clone, PartialEq)]
pub enum ParseAnomaly {
    /// Polyline field count is odd or below two
    TokenCount { line: usize, fields: usize },
    /// A polyline pair did not parse; only that point is dropped
    BadPoint { line: usize, pair: String },
    /// Layer marker without a valid index and height
    BadLayer { line: usize, text: String },
    /// Feature marker naming an unknown feature
    UnknownFeature { line: usize, name: String },
    /// Line matching no record type
    Unrecognized { line: usize, text: String },
}

impl fmt::Display for ParseAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAnomaly::TokenCount { line, fields } => {
                write!(f, "line {}: polyline with {} fields dropped", line, fields)
            }
            ParseAnomaly::BadPoint { line, pair } => {
                write!(f, "line {}: invalid point '{}' dropped", line, pair)
            }
            ParseAnomaly::BadLayer { line, text } => {
                write!(f, "line {}: invalid layer marker '{}'", line, text)
            }
            ParseAnomaly::UnknownFeature { line, name } => {
                write!(f, "line {}: unknown feature '{}'", line, name)
            }
            ParseAnomaly::Unrecognized { line, text } => {
                write!(f, "line {}: unrecognized record '{}'", line, truncate(text, 40))
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn layer_regex() -> &'static Regex {
    static LAYER_REGEX: OnceLock<Regex> = OnceLock::new();
    LAYER_REGEX.get_or_init(|| {
        Regex::new(r"^;LAYER:\s*(-?\d+)\s*,\s*([-+]?[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)\s*$")
            .expect("invalid layer regex")
    })
}

/// Parse one line
///
/// Returns the record, if any, and the anomalies found on the line. A
/// polyline may come back with some points dropped and an anomaly for each.
pub fn parse_line(text: &str, line: usize) -> (Option<StreamRecord>, Vec<ParseAnomaly>) {
    let text = text.trim();
    if text.is_empty() {
        return (None, Vec::new());
    }

    if let Some(rest) = text.strip_prefix("POLY:") {
        return parse_polyline(rest, line);
    }

    if text.starts_with(";LAYER:") {
        return match layer_regex().captures(text) {
            Some(caps) => match (caps[1].parse::<i32>(), caps[2].parse::<f64>()) {
                (Ok(index), Ok(height)) => {
                    (Some(StreamRecord::Layer { index, height }), Vec::new())
                }
                _ => (None, vec![bad_layer(line, text)]),
            },
            None => (None, vec![bad_layer(line, text)]),
        };
    }

    if let Some(name) = text.strip_prefix(";TYPE:") {
        return match FeatureType::from_marker(name) {
            Some(feature) => (Some(StreamRecord::Feature(feature)), Vec::new()),
            None => (
                None,
                vec![ParseAnomaly::UnknownFeature {
                    line,
                    name: name.trim().to_string(),
                }],
            ),
        };
    }

    if text.starts_with(';') {
        return (None, Vec::new());
    }

    (
        None,
        vec![ParseAnomaly::Unrecognized {
            line,
            text: text.to_string(),
        }],
    )
}

fn bad_layer(line: usize, text: &str) -> ParseAnomaly {
    ParseAnomaly::BadLayer {
        line,
        text: text.to_string(),
    }
}

fn parse_polyline(rest: &str, line: usize) -> (Option<StreamRecord>, Vec<ParseAnomaly>) {
    let fields: Vec<&str> = rest.split(',').map(str::trim).collect();
    if fields.len() < 2 || fields.len() % 2 != 0 {
        return (
            None,
            vec![ParseAnomaly::TokenCount {
                line,
                fields: fields.len(),
            }],
        );
    }

    let mut anomalies = Vec::new();
    let points = fields
        .chunks_exact(2)
        .filter_map(|pair| match (pair[0].parse::<f64>(), pair[1].parse::<f64>()) {
            (Ok(u), Ok(v)) if u.is_finite() && v.is_finite() => Some((u, v)),
            _ => {
                anomalies.push(ParseAnomaly::BadPoint {
                    line,
                    pair: format!("{},{}", pair[0], pair[1]),
                });
                None
            }
        })
        .collect::<Vec<_>>();

    if points.is_empty() {
        (None, anomalies)
    } else {
        (Some(StreamRecord::Polyline(points)), anomalies)
    }
}

/// Iterator over the records of a stream
///
/// Anomalies are logged at `warn` and counted; I/O failures end the stream
/// with an error.
pub struct StreamParser<R> {
    reader: R,
    line: usize,
    buf: String,
    anomalies: usize,
}

impl<R: BufRead> StreamParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
            anomalies: 0,
        }
    }

    /// Number of anomalies skipped so far
    pub fn anomalies(&self) -> usize {
        self.anomalies
    }
}

impl<R: BufRead> Iterator for StreamParser<R> {
    type Item = Result<StreamRecord, SynthesisError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    return Some(Err(SynthesisError::Io {
                        reason: e.to_string(),
                    }))
                }
            }
            self.line += 1;

            let (record, anomalies) = parse_line(&self.buf, self.line);
            for anomaly in &anomalies {
                tracing::warn!("Geometry stream: {}", anomaly);
            }
            self.anomalies += anomalies.len();

            if let Some(record) = record {
                return Some(Ok(record));
            }
        }
    }
}
