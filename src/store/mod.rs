pub mod memory;

pub use memory::{InsertOutcome, Score, SharedStore, StoreError};
