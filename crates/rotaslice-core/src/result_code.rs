//! Pipeline stage result codes
//!
//! Every pipeline stage finishes with exactly one [`ResultCode`]. Codes carry
//! an explicit severity so that results of several sub-engines can be
//! combined without relying on declaration order.

use serde::{Deserialize, Serialize};

/// Outcome of a pipeline stage
///
/// Severity order, least to most severe:
///
/// | code | severity |
/// |------|----------|
/// | `Finished` | 0 |
/// | `NothingToSlice` | 1 |
/// | `ObjectsWithDisabledExtruder` | 2 |
/// | `MaterialIncompatible` | 3 |
/// | `ObjectSettingError` | 4 |
/// | `BuildPlateError` | 5 |
/// | `SettingError` | 6 |
/// | `Error` | 7 |
/// | `Cancelled` | 8 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    /// Stage completed successfully.
    Finished,
    /// The build plate holds nothing that can be sliced.
    NothingToSlice,
    /// Objects are assigned to an extruder that is disabled.
    ObjectsWithDisabledExtruder,
    /// The loaded material cannot be printed with the current configuration.
    MaterialIncompatible,
    /// A per-object setting override is invalid.
    ObjectSettingError,
    /// Objects are outside the printable volume.
    BuildPlateError,
    /// A global or per-extruder setting is invalid.
    SettingError,
    /// Engine or process level failure.
    Error,
    /// The stage was cancelled.
    Cancelled,
}

impl ResultCode {
    /// Explicit severity rank, higher is more severe
    pub fn severity(self) -> u8 {
        match self {
            ResultCode::Finished => 0,
            ResultCode::NothingToSlice => 1,
            ResultCode::ObjectsWithDisabledExtruder => 2,
            ResultCode::MaterialIncompatible => 3,
            ResultCode::ObjectSettingError => 4,
            ResultCode::BuildPlateError => 5,
            ResultCode::SettingError => 6,
            ResultCode::Error => 7,
            ResultCode::Cancelled => 8,
        }
    }

    /// Whether the stage chain may continue after this code
    pub fn is_finished(self) -> bool {
        self == ResultCode::Finished
    }

    /// Whether this code is a pre-flight validation failure
    pub fn is_validation_failure(self) -> bool {
        matches!(
            self,
            ResultCode::NothingToSlice
                | ResultCode::ObjectsWithDisabledExtruder
                | ResultCode::MaterialIncompatible
                | ResultCode::ObjectSettingError
                | ResultCode::BuildPlateError
                | ResultCode::SettingError
        )
    }

    /// The more severe of two codes
    pub fn max_severity(self, other: ResultCode) -> ResultCode {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Combine the codes of several sub-engine stages
    ///
    /// Returns the most severe code. A sub-engine that has nothing to slice
    /// does not fail the run while another sub-engine finished: hybrid modes
    /// routinely leave one region empty.
    pub fn combine<I>(codes: I) -> ResultCode
    where
        I: IntoIterator<Item = ResultCode>,
    {
        let mut worst = ResultCode::Finished;
        let mut any_finished = false;
        let mut any = false;
        for code in codes {
            any = true;
            any_finished |= code == ResultCode::Finished;
            worst = worst.max_severity(code);
        }
        if !any {
            return ResultCode::NothingToSlice;
        }
        if worst == ResultCode::NothingToSlice && any_finished {
            ResultCode::Finished
        } else {
            worst
        }
    }

    /// Short human readable description
    pub fn description(self) -> &'static str {
        match self {
            ResultCode::Finished => "finished",
            ResultCode::NothingToSlice => "nothing to slice",
            ResultCode::ObjectsWithDisabledExtruder => "objects assigned to a disabled extruder",
            ResultCode::MaterialIncompatible => "material incompatible with the configuration",
            ResultCode::ObjectSettingError => "invalid per-object settings",
            ResultCode::BuildPlateError => "objects outside the build volume",
            ResultCode::SettingError => "invalid settings",
            ResultCode::Error => "engine error",
            ResultCode::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResultCode::Finished => "Finished",
            ResultCode::NothingToSlice => "NothingToSlice",
            ResultCode::ObjectsWithDisabledExtruder => "ObjectsWithDisabledExtruder",
            ResultCode::MaterialIncompatible => "MaterialIncompatible",
            ResultCode::ObjectSettingError => "ObjectSettingError",
            ResultCode::BuildPlateError => "BuildPlateError",
            ResultCode::SettingError => "SettingError",
            ResultCode::Error => "Error",
            ResultCode::Cancelled => "Cancelled",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ResultCode; 9] = [
        ResultCode::Finished,
        ResultCode::NothingToSlice,
        ResultCode::ObjectsWithDisabledExtruder,
        ResultCode::MaterialIncompatible,
        ResultCode::ObjectSettingError,
        ResultCode::BuildPlateError,
        ResultCode::SettingError,
        ResultCode::Error,
        ResultCode::Cancelled,
    ];

    #[test]
    fn test_severity_is_total_order() {
        for window in ALL.windows(2) {
            assert!(window[0].severity() < window[1].severity());
        }
    }

    #[test]
    fn test_combine_reports_most_severe() {
        let code = ResultCode::combine([
            ResultCode::Finished,
            ResultCode::BuildPlateError,
            ResultCode::MaterialIncompatible,
        ]);
        assert_eq!(code, ResultCode::BuildPlateError);
    }

    #[test]
    fn test_combine_ignores_partial_nothing_to_slice() {
        let code = ResultCode::combine([ResultCode::NothingToSlice, ResultCode::Finished]);
        assert_eq!(code, ResultCode::Finished);

        let code = ResultCode::combine([ResultCode::NothingToSlice, ResultCode::NothingToSlice]);
        assert_eq!(code, ResultCode::NothingToSlice);
    }

    #[test]
    fn test_combine_empty() {
        assert_eq!(ResultCode::combine([]), ResultCode::NothingToSlice);
    }

    #[test]
    fn test_validation_classification() {
        assert!(ResultCode::SettingError.is_validation_failure());
        assert!(!ResultCode::Error.is_validation_failure());
        assert!(!ResultCode::Cancelled.is_validation_failure());
        assert!(ResultCode::Finished.is_finished());
    }
}
