mod helpers;
mod minor_units;

pub mod op;
mod secret;

pub use helpers::{is_valid_currency_code, parse_boolean_flag};
pub use minor_units::{MinorUnits, MinorUnitsConversionError, DEFAULT_CURRENCY_CODE};
pub use secret::Secret;
