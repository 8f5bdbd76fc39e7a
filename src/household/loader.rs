//! Load a planning request (household + assumptions + strategy) from JSON

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Household;
use crate::assumptions::Assumptions;
use crate::error::Result;
use crate::optimizer::Strategy;

fn default_horizon_years() -> u32 {
    30
}

/// Everything needed to run one optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub household: Household,

    #[serde(default)]
    pub assumptions: Assumptions,

    /// Number of plan years to project
    #[serde(default = "default_horizon_years")]
    pub horizon_years: u32,

    #[serde(default)]
    pub strategy: Strategy,
}

impl PlanRequest {
    /// Validate every part of the request at the boundary
    pub fn validate(&self) -> Result<()> {
        self.household.validate()?;
        self.assumptions.validate()
    }
}

/// Parse a request from any reader (file, stdin, string buffer)
pub fn load_request_from_reader<R: Read>(reader: R) -> Result<PlanRequest> {
    let request: PlanRequest = serde_json::from_reader(reader)?;
    request.validate()?;
    Ok(request)
}

/// Load a request from a JSON file
pub fn load_household<P: AsRef<Path>>(path: P) -> Result<PlanRequest> {
    let file = File::open(path)?;
    load_request_from_reader(BufReader::new(file))
}
