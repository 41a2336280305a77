pub mod listing;
pub mod protocol;
pub mod types;
