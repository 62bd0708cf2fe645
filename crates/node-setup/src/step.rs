//! Ordered, named setup steps with typed outcomes.
//!
//! A step either completes, completes with a soft failure that is logged and
//! tolerated, or fails fatally and stops the pipeline. The report records
//! which steps ran, so tests can assert on order without touching the host.

use std::fmt;

use tracing::{error, info, warn};

use crate::error::{Result, SetupError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Soft(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Done,
    Soft(String),
    Failed(String),
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Done => f.write_str("done"),
            StepStatus::Soft(reason) => write!(f, "skipped ({})", reason),
            StepStatus::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

type StepFn<'a> = Box<dyn FnOnce() -> Result<StepOutcome> + 'a>;

pub struct Pipeline<'a> {
    steps: Vec<(String, StepFn<'a>)>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub steps: Vec<(String, StepStatus)>,
}

impl PipelineReport {
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|(n, _)| n.as_str()).collect()
    }
}

/// Fatal failure with the report of everything that ran up to it.
#[derive(Debug)]
pub struct PipelineError {
    pub step: String,
    pub source: SetupError,
    pub report: PipelineReport,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' failed: {}", self.step, self.source)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl<'a> Default for Pipeline<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn step(mut self, name: impl Into<String>, f: impl FnOnce() -> Result<StepOutcome> + 'a) -> Self {
        self.steps.push((name.into(), Box::new(f)));
        self
    }

    /// Add a step that always completes or fails fatally.
    pub fn then(self, name: impl Into<String>, f: impl FnOnce() -> Result<()> + 'a) -> Self {
        self.step(name, move || f().map(|()| StepOutcome::Done))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(self) -> std::result::Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();
        let total = self.steps.len();
        for (i, (name, f)) in self.steps.into_iter().enumerate() {
            info!("[{}/{}] {}", i + 1, total, name);
            match f() {
                Ok(StepOutcome::Done) => report.steps.push((name, StepStatus::Done)),
                Ok(StepOutcome::Soft(reason)) => {
                    warn!("{}: {}", name, reason);
                    report.steps.push((name, StepStatus::Soft(reason)));
                }
                Err(e) => {
                    error!("{}: {}", name, e);
                    report.steps.push((name.clone(), StepStatus::Failed(e.to_string())));
                    return Err(PipelineError {
                        step: name,
                        source: e,
                        report,
                    });
                }
            }
        }
        Ok(report)
    }
}
