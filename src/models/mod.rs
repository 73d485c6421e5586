pub mod api;
pub mod error;
pub mod messages;
pub mod records;

pub use api::*;
pub use error::*;
pub use messages::*;
pub use records::*;
