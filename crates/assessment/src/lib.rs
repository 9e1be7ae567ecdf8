//! Fiscal assessment: ICMS-ST recomputation per sale item, period totals and
//! the quarterly presumed-profit figures.
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod error;
pub mod icms_st;
pub mod presumed_profit;
pub mod totals;

pub use error::AssessmentError;
pub use icms_st::{IcmsStCalculator, SaleAssessment, TaxAssessmentRecord, assess_sales};
pub use presumed_profit::{PresumedProfitAssessment, presumed_profit};
pub use totals::{AssessmentTotals, period_totals};
