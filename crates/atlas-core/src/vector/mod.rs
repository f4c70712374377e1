//! Vector payloads and matrix extraction
//!
//! Records arrive with whatever vector layout the collection uses. This
//! module classifies each payload and turns a record set into a dense
//! [`Matrix`] the reducers can consume.

mod extract;
mod payload;

pub use extract::{extract, Matrix, MIN_POINTS};
pub use payload::{PointId, Record, SparseVector, VectorPayload, VectorShape};
