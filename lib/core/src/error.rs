//! Error handling foundation for nodeflow.
//!
//! Library crates return their own error enums. The daemon carries them in
//! a rootcause `Report` through this alias; `?` converts an error value into
//! a report of the same context type.

use rootcause::Report;

/// A Result whose error is a rootcause report over context `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
