pub mod catalog;
pub mod channel;

pub use catalog::{Catalog, InsertOutcome, DEFAULT_MAX_PER_COUNTRY};
pub use channel::{Channel, ParsedChannelInfo, Source, DEFAULT_CATEGORY};
