use serde::{Deserialize, Serialize};

/// Route served by the coverage collector.
pub const COVEROUT_PATH: &str = "/api/v1/coverout";
/// Older clients fetch the archive from the bare path.
pub const LEGACY_COVEROUT_PATH: &str = "/coverout";

/// Successful collector response: the merged coverage directory, encoded by
/// [`crate::encode`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveroutResponse {
    pub merged: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
