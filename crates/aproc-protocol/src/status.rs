//! Propagation and termination tag of one process instance at one device.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Running and spreading to neighbours.
    Internal,
    /// Running, spreading, and reporting a result here.
    InternalOutput,
    /// Not running here; never announced.
    External,
    /// Running but no longer spreading.
    Border,
    /// Not spreading, reporting a result here.
    BorderOutput,
    /// Reporting a result and asking the whole process to end.
    TerminatedOutput,
}

impl Status {
    /// Announced to neighbours at the end of the round.
    pub fn survives(self) -> bool {
        self != Status::External
    }

    /// Makes neighbours that are not yet running the process join it.
    pub fn recruits(self) -> bool {
        matches!(self, Status::Internal | Status::InternalOutput)
    }

    /// Reported upward as a delivery.
    pub fn is_output(self) -> bool {
        matches!(
            self,
            Status::InternalOutput | Status::BorderOutput | Status::TerminatedOutput
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Status; 6] = [
        Status::Internal,
        Status::InternalOutput,
        Status::External,
        Status::Border,
        Status::BorderOutput,
        Status::TerminatedOutput,
    ];

    #[test]
    fn only_external_is_dropped() {
        for s in ALL {
            assert_eq!(s.survives(), s != Status::External, "{s:?}");
        }
    }

    #[test]
    fn recruiting_statuses_survive() {
        for s in ALL.into_iter().filter(|s| s.recruits()) {
            assert!(s.survives());
            assert!(matches!(s, Status::Internal | Status::InternalOutput));
        }
    }

    #[test]
    fn output_statuses() {
        let outputs: Vec<_> = ALL.into_iter().filter(|s| s.is_output()).collect();
        assert_eq!(
            outputs,
            vec![
                Status::InternalOutput,
                Status::BorderOutput,
                Status::TerminatedOutput
            ]
        );
    }
}
