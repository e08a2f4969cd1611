//! Domain types for market-data acquisition

pub mod bar;
pub mod symbol;

pub use bar::{Bar, Series};
pub use symbol::{Granularity, Symbol};
