//! Job taxonomy
//!
//! Every runnable unit has a fixed [`JobType`] which decides the execution
//! context it must run on.

use std::fmt;

/// Execution context a job must run on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    /// Bounded concurrent pool, status and query actions
    Immediate,
    /// Single serialized worker, exclusive device actions
    Queued,
}

/// Identifies a runnable unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobName {
    AreYouThere,
    TakeThree,
    SweepRoom,
    GoSecure,
    Temperature,
    StopSecure,
    GoToSleep,
    Ip,
    Reboot,
}

impl JobName {
    /// Human-readable description, used in status replies
    pub fn description(self) -> &'static str {
        match self {
            JobName::AreYouThere => "Are you there",
            JobName::TakeThree => "Take 3",
            JobName::SweepRoom => "Sweep Room",
            JobName::GoSecure => "Go secure",
            JobName::Temperature => "Temperature",
            JobName::StopSecure => "Stop secure",
            JobName::GoToSleep => "Go to sleep",
            JobName::Ip => "IP",
            JobName::Reboot => "Reboot",
        }
    }

    /// The fixed execution context for this job
    pub fn job_type(self) -> JobType {
        match self {
            JobName::TakeThree | JobName::SweepRoom | JobName::GoToSleep | JobName::Reboot => {
                JobType::Queued
            }
            JobName::AreYouThere
            | JobName::GoSecure
            | JobName::Temperature
            | JobName::StopSecure
            | JobName::Ip => JobType::Immediate,
        }
    }

    pub fn is_queued(self) -> bool {
        self.job_type() == JobType::Queued
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
