//! Schema-driven extraction: selector resolution, value reads and the
//! recursive property evaluator

mod evaluator;
mod resolver;
mod value;

pub use evaluator::Extractor;
pub use resolver::{resolve, resolve_first, resolve_target};
pub use value::{absolutize, extract_value};
