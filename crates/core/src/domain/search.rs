use serde::{Deserialize, Serialize};

/// Lower deposit bound sent with every search, in the source's currency unit.
pub const MIN_DEPOSIT: u32 = 100;
/// Upper deposit bound sent with every search, in the source's currency unit.
pub const MAX_DEPOSIT: u32 = 400;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub brand: String,
    pub branch: String,
    pub hall: String,
    pub start_date: String,
    pub end_date: String,
    pub weekday: String,
    pub time: String,
}

impl SearchFilter {
    pub fn min_deposit(&self) -> u32 {
        MIN_DEPOSIT
    }

    pub fn max_deposit(&self) -> u32 {
        MAX_DEPOSIT
    }
}
