use serde::{Deserialize, Serialize};

/// Status of a class nobody has reported on yet.
pub const UNKNOWN_STATUS: i32 = 0;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Class {
    pub crn: i32,
    #[serde(default)]
    pub status: i32,
}

impl Class {
    pub fn new(crn: i32) -> Self {
        Self {
            crn,
            status: UNKNOWN_STATUS,
        }
    }
}
