//! Postgres implementations of the recommendation core's collaborator
//! traits. Runtime-checked queries only; schema lives in `migrations/`.

pub mod member_store;
pub mod run_store;

pub use member_store::PgDirectory;
pub use run_store::PgRunStore;
