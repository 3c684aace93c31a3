use thiserror::Error;
use uuid::Uuid;

use crate::types::RunStatus;

#[derive(Error, Debug)]
pub enum LatticeError {
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Run {run} is {status}; operation requires an open run")]
    InvalidState { run: Uuid, status: RunStatus },

    #[error("Notification dispatch failed: {0}")]
    Dispatch(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
