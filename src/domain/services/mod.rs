pub mod query_classifier;

pub use query_classifier::{classify, QueryClass};
