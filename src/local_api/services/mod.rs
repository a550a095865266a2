pub mod catalog;
pub mod downloads;
pub mod duplicates;
pub mod health;
pub mod status;
