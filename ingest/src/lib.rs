pub mod driver;
pub mod error;
pub mod parser;
pub mod resolver;
pub mod source;
pub mod store;

pub use driver::{IngestOptions, IngestReport, Ingestor, Outcome};
pub use error::{IngestError, SkipReason};
