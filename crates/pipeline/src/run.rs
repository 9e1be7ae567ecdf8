//! Run orchestration.
//!
//! Documents are parsed on a pool of scoped threads and merged in input order
//! (so "first seen" means first in the input, not first to finish). Each
//! requested company then runs on its own thread over shared, read-only inputs.

use std::num::NonZeroUsize;
use std::thread;

use chrono::NaiveDate;

use autofiscal_assessment::{assess_sales, period_totals, presumed_profit};
use autofiscal_audit::AuditEngine;
use autofiscal_config::{CompanyConfig, CompanyDirectory};
use autofiscal_core::{Granularity, TaxId};
use autofiscal_inventory::LedgerBuilder;
use autofiscal_invoicing::{
    Admission, Classification, DocumentSet, IngestError, InvoiceSet, NfeDocument, classify,
    parse_document,
};
use autofiscal_kpi::{KpiAggregator, KpiInput};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::RunError;
use crate::report::{CompanyReport, RunReport, inventory_rows};

/// One raw input document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub label: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(label: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            bytes: bytes.into(),
        }
    }
}

/// Run parameters that are not company configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Reference date for stock age.
    pub as_of: NaiveDate,
    pub granularity: Granularity,
    /// Upper bound on parsing threads; `None` uses the available parallelism.
    pub parse_workers: Option<NonZeroUsize>,
}

impl RunOptions {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            granularity: Granularity::Month,
            parse_workers: None,
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_parse_workers(mut self, workers: NonZeroUsize) -> Self {
        self.parse_workers = Some(workers);
        self
    }
}

/// Process `sources` for every company in `requested`.
///
/// Fails before any ledger work when a requested company has no configuration.
pub fn run(
    sources: &[SourceDocument],
    directory: &CompanyDirectory,
    requested: &[TaxId],
    options: RunOptions,
) -> Result<RunReport, RunError> {
    let companies = resolve_companies(directory, requested)?;
    tracing::info!(
        documents = sources.len(),
        companies = companies.len(),
        as_of = %options.as_of,
        "run started"
    );

    let parsed = parse_all(sources, options.parse_workers)?;
    let mut diagnostics = Vec::new();
    let documents = merge(parsed, &mut diagnostics);

    for document in documents.iter() {
        let related = companies
            .iter()
            .any(|c| classify(document, c) != Classification::Unrelated);
        if !related {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::UnrelatedDocument,
                    &document.source_label,
                    format!(
                        "issuer {} / recipient {} match no requested company",
                        document.issuer,
                        document.recipient.as_ref().map_or("-".to_string(), ToString::to_string)
                    ),
                )
                .with_access_key(document.access_key.clone()),
            );
        }
    }

    let reports = thread::scope(|scope| {
        let handles: Vec<_> = companies
            .iter()
            .map(|company| {
                let documents = &documents;
                scope.spawn(move || run_company(company, documents, options))
            })
            .collect();
        collect_joined(handles, "company")
    })?;

    tracing::info!(
        accepted = documents.len(),
        diagnostics = diagnostics.len(),
        "run finished"
    );
    Ok(RunReport {
        as_of: options.as_of,
        granularity: options.granularity,
        documents_received: sources.len(),
        documents_accepted: documents.len(),
        diagnostics,
        companies: reports,
    })
}

/// Requested companies in CNPJ order, deduplicated.
fn resolve_companies<'a>(
    directory: &'a CompanyDirectory,
    requested: &[TaxId],
) -> Result<Vec<&'a CompanyConfig>, RunError> {
    if requested.is_empty() {
        return Err(RunError::NoCompanies);
    }
    let mut cnpjs: Vec<&TaxId> = requested.iter().collect();
    cnpjs.sort();
    cnpjs.dedup();
    cnpjs
        .into_iter()
        .map(|cnpj| {
            directory
                .get(cnpj)
                .ok_or_else(|| RunError::MissingCompanyConfig(cnpj.clone()))
        })
        .collect()
}

/// Join every handle before reporting, so no panicked thread is left unjoined.
fn collect_joined<T>(
    handles: Vec<thread::ScopedJoinHandle<'_, T>>,
    stage: &'static str,
) -> Result<Vec<T>, RunError> {
    let joined: Vec<thread::Result<T>> = handles.into_iter().map(|h| h.join()).collect();
    let mut out = Vec::with_capacity(joined.len());
    for result in joined {
        match result {
            Ok(value) => out.push(value),
            Err(_) => {
                tracing::error!(stage, "worker panicked");
                return Err(RunError::WorkerPanicked { stage });
            }
        }
    }
    Ok(out)
}

fn parse_all(
    sources: &[SourceDocument],
    workers: Option<NonZeroUsize>,
) -> Result<Vec<Result<NfeDocument, IngestError>>, RunError> {
    if sources.is_empty() {
        return Ok(Vec::new());
    }
    let workers = workers
        .or_else(|| thread::available_parallelism().ok())
        .map_or(1, NonZeroUsize::get)
        .min(sources.len());
    let chunk = sources.len().div_ceil(workers);

    let chunks = thread::scope(|scope| {
        let handles: Vec<_> = sources
            .chunks(chunk)
            .map(|part| {
                scope.spawn(move || {
                    part.iter()
                        .map(|src| parse_document(&src.label, &src.bytes))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        collect_joined(handles, "parse")
    })?;
    Ok(chunks.into_iter().flatten().collect())
}

/// Single synchronization point: input order decides which copy wins.
fn merge(parsed: Vec<Result<NfeDocument, IngestError>>, diagnostics: &mut Vec<Diagnostic>) -> DocumentSet {
    let mut documents = DocumentSet::new();
    for result in parsed {
        match result {
            Ok(document) => {
                if let Err(duplicate) = documents.insert(document) {
                    tracing::debug!(access_key = %duplicate.access_key, "duplicate document discarded");
                    diagnostics.push(duplicate.into());
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "document rejected");
                diagnostics.push(Diagnostic::from(&err));
            }
        }
    }
    documents
}

fn run_company(company: &CompanyConfig, documents: &DocumentSet, options: RunOptions) -> CompanyReport {
    let span = tracing::info_span!("company", cnpj = %company.cnpj);
    let _guard = span.enter();

    let mut diagnostics = Vec::new();
    let mut invoices = InvoiceSet::new();
    for document in documents.iter() {
        match invoices.admit(document, company) {
            Admission::Admitted { self_issued: true } => diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::SelfIssuedInbound,
                    &document.source_label,
                    format!(
                        "company issued an entry document (CFOP {}) to itself",
                        document.leading_cfop().unwrap_or_default()
                    ),
                )
                .with_access_key(document.access_key.clone()),
            ),
            Admission::Duplicate(duplicate) => diagnostics.push(duplicate.into()),
            Admission::Admitted { self_issued: false } | Admission::Unrelated => {}
        }
    }

    let ledger = LedgerBuilder::new(company).build(&invoices);
    let assessed = assess_sales(company, &invoices);
    for err in &assessed.errors {
        let label = invoices
            .get(err.access_key())
            .map_or("", |invoice| invoice.source_label.as_str());
        diagnostics.push(Diagnostic::from_assessment(err, label));
    }

    let findings = AuditEngine::new(company, options.as_of).run(&invoices, &ledger, &assessed.records);
    let kpis = KpiAggregator::new(options.granularity).aggregate(KpiInput {
        company,
        ledger: &ledger,
        assessments: &assessed.records,
    });

    CompanyReport {
        company: company.cnpj.clone(),
        name: company.name.clone(),
        invoices: invoices.len(),
        inventory: inventory_rows(&ledger, options.as_of),
        assessment_totals: period_totals(&assessed.records, options.granularity),
        presumed_profit: presumed_profit(&company.regime, &ledger),
        findings,
        kpis,
        assessments: assessed.records,
        diagnostics,
    }
}
