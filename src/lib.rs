pub mod artifact;
pub mod browser;
pub mod config;
pub mod control;
pub mod diagnostics;
pub mod diff;
pub mod error;
pub mod executor;
pub mod handoff;
pub mod history;
pub mod learning;
pub mod locator;
pub mod orchestrator;
pub mod resolver;
pub mod rubric;
pub mod session;
pub mod snapshot;
pub mod targets;

//  Re-export commonly used items
pub use artifact::{ArtifactWaitResult, ArtifactWatch, PolicyChoice, WaitPolicy};
pub use browser::chrome::{ChromeDriver, ConnectionMode};
pub use browser::driver::{ControlQuery, PageDriver};
pub use config::{Credentials, RunConfig};
pub use control::{
    Action, ActivationMethod, AttemptOutcome, Control, ControlCategory, InteractionAttempt,
    InteractionResult, Rect, Tier,
};
pub use diagnostics::{DiagnosticEntry, Diagnostics};
pub use diff::{diff, DiffAnalysis};
pub use error::{BrowserError, ConfigError, RunError};
pub use executor::{Execution, InteractionExecutor};
pub use handoff::{AnalysisSink, Handoff, JsonlSink, WorkItem};
pub use history::ProcessedHistory;
pub use learning::{mine_locators, GuidedLearning, LearningArtifact, LearningRecorder};
pub use locator::{Locator, LocatorKind, LocatorSet};
pub use orchestrator::{
    BatchReport, BatchTotals, ItemReport, ItemStatus, Orchestrator, StepRecord, StepStatus,
};
pub use resolver::{LocatorResolver, ResolutionStrategy, ResolveContext, ResolverSettings};
pub use rubric::{Candidate, Predicate, RubricRule, ScoringRubric};
pub use session::{AutomationSession, ConsecutiveErrors, Step};
pub use snapshot::{capture_snapshot, PageSnapshot, SnapshotOptions};
pub use targets::{TargetBook, TargetOverride, TargetSpec};
