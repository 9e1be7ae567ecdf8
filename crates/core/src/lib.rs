//! Shared domain primitives: fiscal identifiers, money rounding, reporting
//! periods and the aggregate/event contracts. No I/O.

pub mod aggregate;
pub mod error;
pub mod event;
pub mod id;
pub mod money;
pub mod period;

pub use aggregate::Aggregate;
pub use error::DomainError;
pub use event::Event;
pub use id::{AccessKey, Chassis, TaxId, TaxIdKind};
pub use money::{RoundingMode, round_currency};
pub use period::{Granularity, Period};
