//! Core data types: exchange and query enums, market data records, symbol
//! normalization.

pub mod enums;
pub mod market_data;
pub mod symbol;

pub use enums::*;
pub use market_data::*;
pub use symbol::*;
