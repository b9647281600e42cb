//! Structured lease details and the deep merge that evolves them

mod merge;
mod value;

pub use merge::{merge, merge_into};
pub use value::{details_from_json, details_from_str, DetailValue, Details, DetailsError};
