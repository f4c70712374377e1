//! Records in, frames out.

use crate::error::Result;
use crate::reduce::{reduce_with, FrameStream, ReductionParams};
use crate::schedule::ProgressScheduler;
use crate::vector::{extract, Record};
use tracing::debug;

/// Validate and prepare a whole request.
///
/// Checks run in a fixed order: record count, vector shapes and
/// dimensions, algorithm, hyperparameters. The first failure is returned
/// and nothing is computed past it.
pub fn reduce_records(
    records: &[Record],
    params: &ReductionParams,
    scheduler: ProgressScheduler,
) -> Result<FrameStream> {
    let matrix = extract(records, params.using.as_deref())?;
    debug!(
        "Extracted {} x {} matrix (using={:?})",
        matrix.n_rows(),
        matrix.n_dims(),
        params.using
    );
    reduce_with(&matrix, params, scheduler)
}
