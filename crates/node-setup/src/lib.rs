pub mod app_config;
pub mod config_edit;
pub mod error;
pub mod host;
pub mod preflight;
pub mod questions;
pub mod repo;
pub mod runner;
pub mod service;
pub mod step;

pub use app_config::{AppConfigResolver, Network};
pub use config_edit::UpsertOptions;
pub use error::{Result, SetupError};
pub use host::{provision, HostContext, SetupPlan};
pub use questions::{BuildAnswers, QuestionGatherer, Role};
pub use repo::{BranchSpec, RepoSpec, RepoSyncer};
pub use runner::{Invocation, ShellRunner, SystemRunner};
#[cfg(any(test, feature = "testing"))]
pub use runner::RecordingRunner;
pub use service::{RunitLayout, ServiceRegistrar, ServiceState};
pub use step::{Pipeline, PipelineError, PipelineReport, StepOutcome, StepStatus};
