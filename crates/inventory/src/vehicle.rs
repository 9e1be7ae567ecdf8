use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use autofiscal_config::OperationKind;
use autofiscal_core::{AccessKey, Aggregate, Chassis, Event};
use autofiscal_invoicing::VehicleAttributes;

/// Lifecycle state of one vehicle within one company.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    #[default]
    Unknown,
    InStock,
    Sold,
    Returned,
    Transferred,
}

impl VehicleState {
    pub fn after(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Sale => VehicleState::Sold,
            OperationKind::ReturnToSupplier => VehicleState::Returned,
            OperationKind::Transfer => VehicleState::Transferred,
        }
    }

    /// Left stock through a sale, return or transfer.
    pub fn is_disposed(self) -> bool {
        matches!(
            self,
            VehicleState::Sold | VehicleState::Returned | VehicleState::Transferred
        )
    }
}

impl core::fmt::Display for VehicleState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            VehicleState::Unknown => "unknown",
            VehicleState::InStock => "in_stock",
            VehicleState::Sold => "sold",
            VehicleState::Returned => "returned",
            VehicleState::Transferred => "transferred",
        })
    }
}

/// A movement the state machine refused. The state is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionAnomaly {
    /// Outbound movement for a vehicle that never entered stock.
    #[error("{operation:?} of a vehicle that was never in stock")]
    OrphanSale { operation: OperationKind },

    /// Second sale with no re-acquisition in between.
    #[error("sale of a vehicle already sold")]
    DuplicateSale,

    /// Inbound movement while the vehicle is still in stock.
    #[error("acquisition of a vehicle already in stock")]
    DuplicateAcquisition,

    #[error("{operation:?} of a vehicle in state {from}")]
    InvalidTransition {
        from: VehicleState,
        operation: OperationKind,
    },
}

/// Declared taxes carried by a movement (absent tags stay `None`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeclaredTaxes {
    pub own_icms: Option<Decimal>,
    pub icms_st: Option<Decimal>,
    pub ipi: Option<Decimal>,
}

/// Running totals of the declared taxes over every applied movement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaxTotals {
    pub own_icms: Decimal,
    pub icms_st: Decimal,
    pub ipi: Decimal,
}

impl TaxTotals {
    fn add(&mut self, taxes: &DeclaredTaxes) {
        self.own_icms += taxes.own_icms.unwrap_or_default();
        self.icms_st += taxes.icms_st.unwrap_or_default();
        self.ipi += taxes.ipi.unwrap_or_default();
    }
}

/// How a holding ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disposal {
    pub operation: OperationKind,
    pub date: NaiveDate,
    pub value: Decimal,
    pub access_key: AccessKey,
    pub taxes: DeclaredTaxes,
}

/// One stay in stock, from acquisition to (optional) disposal.
///
/// A vehicle bought back after a sale has several holdings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holding {
    pub acquired_on: NaiveDate,
    pub cost: Decimal,
    pub access_key: AccessKey,
    pub taxes: DeclaredTaxes,
    pub disposal: Option<Disposal>,
}

impl Holding {
    pub fn left_on(&self) -> Option<NaiveDate> {
        self.disposal.as_ref().map(|d| d.date)
    }

    /// Days between acquisition and disposal, or until `as_of` while in stock.
    pub fn days_in_stock(&self, as_of: NaiveDate) -> i64 {
        let end = self.left_on().unwrap_or(as_of);
        (end - self.acquired_on).num_days()
    }

    /// Sale value minus acquisition cost; `None` unless the holding ended in a sale.
    pub fn gross_margin(&self) -> Option<Decimal> {
        self.disposal
            .as_ref()
            .filter(|d| d.operation == OperationKind::Sale)
            .map(|d| d.value - self.cost)
    }

    /// In stock at the end of `date`.
    pub fn in_stock_on(&self, date: NaiveDate) -> bool {
        self.acquired_on <= date && self.left_on().is_none_or(|left| left > date)
    }
}

/// Command: take the vehicle into stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquire {
    pub access_key: AccessKey,
    pub occurred_on: NaiveDate,
    pub cost: Decimal,
    pub taxes: DeclaredTaxes,
    pub description: String,
    pub attributes: VehicleAttributes,
}

/// Command: the vehicle leaves stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispose {
    pub access_key: AccessKey,
    pub occurred_on: NaiveDate,
    pub operation: OperationKind,
    pub value: Decimal,
    pub taxes: DeclaredTaxes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleCommand {
    Acquire(Acquire),
    Dispose(Dispose),
}

/// Event: the vehicle entered stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acquired {
    pub chassis: Chassis,
    pub access_key: AccessKey,
    pub occurred_on: NaiveDate,
    pub cost: Decimal,
    pub taxes: DeclaredTaxes,
    pub buy_back: bool,
    pub description: String,
    pub attributes: VehicleAttributes,
}

/// Event: the vehicle left stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disposed {
    pub chassis: Chassis,
    pub access_key: AccessKey,
    pub occurred_on: NaiveDate,
    pub operation: OperationKind,
    pub value: Decimal,
    pub taxes: DeclaredTaxes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VehicleEvent {
    Acquired(Acquired),
    Disposed(Disposed),
}

impl Event for VehicleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VehicleEvent::Acquired(_) => "inventory.vehicle.acquired",
            VehicleEvent::Disposed(e) => match e.operation {
                OperationKind::Sale => "inventory.vehicle.sold",
                OperationKind::ReturnToSupplier => "inventory.vehicle.returned",
                OperationKind::Transfer => "inventory.vehicle.transferred",
            },
        }
    }

    fn occurred_on(&self) -> NaiveDate {
        match self {
            VehicleEvent::Acquired(e) => e.occurred_on,
            VehicleEvent::Disposed(e) => e.occurred_on,
        }
    }
}

/// Aggregate root: one chassis within one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vehicle {
    chassis: Chassis,
    state: VehicleState,
    description: String,
    attributes: VehicleAttributes,
    holdings: Vec<Holding>,
    taxes: TaxTotals,
    #[serde(skip)]
    version: u64,
}

impl Vehicle {
    pub fn new(chassis: Chassis) -> Self {
        Self {
            chassis,
            state: VehicleState::Unknown,
            description: String::new(),
            attributes: VehicleAttributes::default(),
            holdings: Vec::new(),
            taxes: TaxTotals::default(),
            version: 0,
        }
    }

    pub fn chassis(&self) -> &Chassis {
        &self.chassis
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn attributes(&self) -> &VehicleAttributes {
        &self.attributes
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    /// Accumulated declared taxes over applied movements.
    pub fn taxes(&self) -> &TaxTotals {
        &self.taxes
    }

    /// The latest holding, open or closed.
    pub fn last_holding(&self) -> Option<&Holding> {
        self.holdings.last()
    }

    /// The open holding while the vehicle is in stock.
    pub fn current_holding(&self) -> Option<&Holding> {
        self.holdings.last().filter(|h| h.disposal.is_none())
    }

    pub fn acquisition_cost(&self) -> Option<Decimal> {
        self.last_holding().map(|h| h.cost)
    }

    pub fn acquisition_date(&self) -> Option<NaiveDate> {
        self.last_holding().map(|h| h.acquired_on)
    }

    pub fn disposal_date(&self) -> Option<NaiveDate> {
        self.last_holding().and_then(Holding::left_on)
    }

    pub fn in_stock_on(&self, date: NaiveDate) -> bool {
        self.holdings.iter().any(|h| h.in_stock_on(date))
    }

    /// Validate and apply a command in one step.
    pub fn execute(&mut self, command: &VehicleCommand) -> Result<(VehicleState, VehicleState), TransitionAnomaly> {
        let from = self.state;
        for event in self.handle(command)? {
            self.apply(&event);
        }
        Ok((from, self.state))
    }

    fn handle_acquire(&self, cmd: &Acquire) -> Result<Vec<VehicleEvent>, TransitionAnomaly> {
        if self.state == VehicleState::InStock {
            return Err(TransitionAnomaly::DuplicateAcquisition);
        }
        Ok(vec![VehicleEvent::Acquired(Acquired {
            chassis: self.chassis.clone(),
            access_key: cmd.access_key.clone(),
            occurred_on: cmd.occurred_on,
            cost: cmd.cost,
            taxes: cmd.taxes.clone(),
            buy_back: self.state.is_disposed(),
            description: cmd.description.clone(),
            attributes: cmd.attributes.clone(),
        })])
    }

    fn handle_dispose(&self, cmd: &Dispose) -> Result<Vec<VehicleEvent>, TransitionAnomaly> {
        match (self.state, cmd.operation) {
            (VehicleState::InStock, _) => {}
            (VehicleState::Unknown, operation) => {
                return Err(TransitionAnomaly::OrphanSale { operation });
            }
            (VehicleState::Sold, OperationKind::Sale) => {
                return Err(TransitionAnomaly::DuplicateSale);
            }
            (from, operation) => {
                return Err(TransitionAnomaly::InvalidTransition { from, operation });
            }
        }
        Ok(vec![VehicleEvent::Disposed(Disposed {
            chassis: self.chassis.clone(),
            access_key: cmd.access_key.clone(),
            occurred_on: cmd.occurred_on,
            operation: cmd.operation,
            value: cmd.value,
            taxes: cmd.taxes.clone(),
        })])
    }
}

impl Aggregate for Vehicle {
    type Id = Chassis;
    type Command = VehicleCommand;
    type Event = VehicleEvent;
    type Error = TransitionAnomaly;

    fn id(&self) -> &Self::Id {
        &self.chassis
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VehicleEvent::Acquired(e) => {
                self.holdings.push(Holding {
                    acquired_on: e.occurred_on,
                    cost: e.cost,
                    access_key: e.access_key.clone(),
                    taxes: e.taxes.clone(),
                    disposal: None,
                });
                if !e.description.is_empty() {
                    self.description = e.description.clone();
                }
                merge_attributes(&mut self.attributes, &e.attributes);
                self.taxes.add(&e.taxes);
                self.state = VehicleState::InStock;
            }
            VehicleEvent::Disposed(e) => {
                if let Some(holding) = self.holdings.last_mut() {
                    holding.disposal = Some(Disposal {
                        operation: e.operation,
                        date: e.occurred_on,
                        value: e.value,
                        access_key: e.access_key.clone(),
                        taxes: e.taxes.clone(),
                    });
                }
                self.taxes.add(&e.taxes);
                self.state = VehicleState::after(e.operation);
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VehicleCommand::Acquire(cmd) => self.handle_acquire(cmd),
            VehicleCommand::Dispose(cmd) => self.handle_dispose(cmd),
        }
    }
}

/// Fields present on a later document win; absent ones keep the earlier value.
fn merge_attributes(into: &mut VehicleAttributes, from: &VehicleAttributes) {
    fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
        if value.is_some() {
            slot.clone_from(value);
        }
    }
    fill(&mut into.plate, &from.plate);
    fill(&mut into.renavam, &from.renavam);
    fill(&mut into.color, &from.color);
    fill(&mut into.model_year, &from.model_year);
    fill(&mut into.manufacture_year, &from.manufacture_year);
    fill(&mut into.engine_number, &from.engine_number);
}
