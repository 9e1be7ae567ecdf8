//! Document ingestion: NFe XML in, canonical per-company invoices out.
//!
//! Pure functions over bytes and configuration (no IO).

pub mod classify;
pub mod document;
pub mod error;
pub mod invoice;
pub mod nfe;
pub mod vehicle_id;

pub use classify::{Classification, Direction, classify};
pub use document::{DocumentType, InvoiceItem, ItemTaxes, NfeDocument, VehicleAttributes};
pub use error::IngestError;
pub use invoice::{Admission, DocumentSet, DuplicateDocument, Invoice, InvoiceSet};
pub use nfe::{NFE_MODEL, parse_document};
