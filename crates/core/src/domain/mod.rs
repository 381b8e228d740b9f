pub mod search;
pub mod slot;
