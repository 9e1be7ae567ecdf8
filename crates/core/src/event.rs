use chrono::NaiveDate;

/// A fact recorded by an aggregate.
///
/// Events stem from issued documents, so they are dated by the document's
/// business date rather than by wall-clock time.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable name, e.g. `inventory.vehicle.sold`.
    fn event_type(&self) -> &'static str;

    /// When the event occurred (issue date of the originating document).
    fn occurred_on(&self) -> NaiveDate;
}
