//! Run/recommendation lifecycle: collaborator traits, corpus loading,
//! the run orchestrator, the two scheduled job bodies, and cadence math.
//!
//! Job bodies are plain async functions over the traits; no scheduling
//! library leaks in, so tests invoke them directly and deterministically.

pub mod cadence;
pub mod corpus;
pub mod jobs;
pub mod orchestrator;
pub mod testing;
pub mod traits;

pub use cadence::{run_on_cadence, Cadence};
pub use corpus::{load_corpus, DEFAULT_PAGE_SIZE};
pub use jobs::{JobSummary, RecommendationJobs, EXAMPLE_SUBJECT, STANDARD_SUBJECT};
pub use orchestrator::{
    default_scoring_config, RunOrchestrator, SendRequest, MAX_ACTIVE_RECOMMENDATIONS,
};
pub use traits::{EmailItem, Mailer, MemberDirectory, RecommendationEmail, RunFilter, RunStore};
