/// Action source layer
///
/// Turns job scripts into persisted action records and serves them back:
/// - Lua tokenizer for the static-analysis pass
/// - Call-site extractor producing `ActionRecord`s
/// - JSON-file action source store with a memoized lazy load

pub mod lexer;

// Registration call-site extraction
pub mod extractor;

pub mod record;

// Durable identifier -> record store
pub mod store;

pub use extractor::{ActionExtractor, ExtractedAction, ExtractionReport};
pub use record::ActionRecord;
pub use store::ActionSourceStore;
