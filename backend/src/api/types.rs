//! REST API request and response bodies.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::transform::pipeline::SystemSelection;

/// Body of `POST /transform`.
///
/// ```json
/// { "ics": "cs1", "icsv": "", "ihs": "hs1", "ocs": "cs2", "ocsv": "", "ohs": "hs2",
///   "d": [["P1", "100.0", "200.0", "10.0"]] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationRequest {
    #[serde(flatten)]
    pub systems: SystemSelection,
    /// Rows in input order.
    #[serde(default)]
    pub d: Vec<Vec<String>>,
}

/// Body returned by `POST /transform`: one row per request row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationResponse {
    pub d: Vec<Vec<String>>,
}

/// Body of `GET /api/systems`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemsResponse {
    pub coordinate_systems: Vec<String>,
    pub height_systems: Vec<String>,
    #[serde(rename = "referenceCS")]
    pub reference_cs: String,
}

/// Create an error response
pub fn error_response(error: &str, request_id: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
        "requestId": request_id,
    })
}
