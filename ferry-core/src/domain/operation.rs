//! Job kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of job a client asked for.
///
/// Also the partition key of job records and the `action` sent to the
/// execution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Compile,
    Run,
    Analyse,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Compile, Operation::Run, Operation::Analyse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Compile => "compile",
            Operation::Run => "run",
            Operation::Analyse => "analyse",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownOperation(pub String);

impl fmt::Display for UnknownOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operation '{}'", self.0)
    }
}

impl std::error::Error for UnknownOperation {}

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compile" => Ok(Operation::Compile),
            "run" => Ok(Operation::Run),
            "analyse" => Ok(Operation::Analyse),
            _ => Err(UnknownOperation(s.to_string())),
        }
    }
}
