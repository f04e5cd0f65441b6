pub mod quantities;

pub use quantities::{format_milli, parse_milli, ResourceQuantities};
