//! Delta g-code emission
//!
//! Only axes that moved more than [`AXIS_EPSILON`] since the last emitted
//! command are written. A command with no moved axis is dropped entirely and
//! the emitted machine position stays where it was.

use rotaslice_core::{ExtruderIndex, MachinePosition};

/// Minimum axis change that produces a word
pub const AXIS_EPSILON: f64 = 1e-4;

/// Motion command kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    /// `G0`
    Rapid,
    /// `G1`
    Linear,
}

impl Motion {
    fn code(self) -> &'static str {
        match self {
            Motion::Rapid => "G0",
            Motion::Linear => "G1",
        }
    }
}

/// G-code line writer tracking the last emitted machine position
#[derive(Debug)]
pub struct Emitter {
    rotary: bool,
    extruder: ExtruderIndex,
    last: Option<MachinePosition>,
    lines: Vec<String>,
}

impl Emitter {
    /// Writer for one extruder, with or without A/C words
    pub fn new(rotary: bool, extruder: ExtruderIndex) -> Self {
        Self {
            rotary,
            extruder,
            last: None,
            lines: Vec::new(),
        }
    }

    /// Emit a move to `target`; returns false when nothing moved
    pub fn emit(&mut self, motion: Motion, target: &MachinePosition) -> bool {
        let mut next = self
            .last
            .clone()
            .unwrap_or_else(|| MachinePosition::origin(target.extrusion.len()));
        let first = self.last.is_none();
        let mut words: Vec<String> = Vec::with_capacity(7);

        let mut axis = |letter: char, old: &mut f64, new: f64, precision: usize| {
            if first || (new - *old).abs() > AXIS_EPSILON {
                *old = new;
                words.push(format!("{}{:.*}", letter, precision, new));
            }
        };
        axis('X', &mut next.x, target.x, 3);
        axis('Y', &mut next.y, target.y, 3);
        axis('Z', &mut next.z, target.z, 3);
        if self.rotary {
            axis('A', &mut next.a, target.a, 3);
            axis('C', &mut next.c, target.c, 3);
        }
        let mut e = next.extruded(self.extruder);
        axis('E', &mut e, target.extruded(self.extruder), 5);

        if words.is_empty() {
            return false;
        }

        if first || (target.feed - next.feed).abs() > AXIS_EPSILON {
            words.push(format!("F{:.0}", target.feed));
        }
        next.feed = target.feed;

        self.lines
            .push(format!("{} {}", motion.code(), words.join(" ")));
        self.last = Some(next.with_extrusion(self.extruder, e));
        true
    }

    /// Append a `;` comment line
    pub fn comment(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!(";{}", text.as_ref()));
    }

    /// Append a literal line
    pub fn raw(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Last emitted machine position
    pub fn last(&self) -> Option<&MachinePosition> {
        self.last.as_ref()
    }

    /// Emitted lines so far
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Take the emitted lines
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}
