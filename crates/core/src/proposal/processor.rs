//! End-to-end proposal generation for one request.
//!
//! A run validates the request, picks a generation mode, renders every
//! entry concurrently (template first, editable deck as the fallback,
//! packages per network), then merges the results in input order between
//! the optional intro and outro pages. All intermediates live in a
//! request-scoped temporary workspace that is removed when the run ends,
//! whether it succeeded, failed or was cancelled.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use tempfile::TempDir;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink, PROPOSAL_COMPLETED,
    PROPOSAL_FAILED, PROPOSAL_RENDERED, PROPOSAL_VALIDATED,
};
use crate::catalog::{LocationCatalog, PackageExpander};
use crate::config::ProposalConfig;
use crate::document::{
    discard, extract_pages, merge_ordered, page_count, run_blocking, ConversionGate, Deck,
};
use crate::domain::outcome::{
    BoundaryTrim, GenerationMode, LocationBreakdown, ProposalOutcome, RenderPath, RenderResult,
};
use crate::domain::package::GenerationTarget;
use crate::domain::proposal::{ProposalRequest, ProposalSubject, ValidatedProposal};
use crate::errors::{ProposalFailure, ProposalResponse, RenderCause, RenderError, ValidationError};
use crate::pricing::{LocationPricing, PricingPolicy};
use crate::proposal::intro_outro::{self, IntroOutroCache, IntroOutroPages, IntroOutroSource};
use crate::proposal::log::{InMemoryProposalLog, ProposalLog, ProposalLogEntry};
use crate::proposal::validator::{ValidatedRequest, Validator};
use crate::render::{location_summary, location_title, locations_summary, SummaryPage, SummaryRenderer};
use crate::schedule::proposal_filename;
use crate::store::{with_timeout, StoreError, TemplateFormat, TemplateStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessorSettings {
    pub output_dir: PathBuf,
    pub premium_series: String,
    pub pricing: PricingPolicy,
    pub fetch_timeout: Duration,
    pub render_parallelism: usize,
    pub company_scopes: Vec<String>,
}

impl From<&ProposalConfig> for ProcessorSettings {
    fn from(config: &ProposalConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            premium_series: config.premium_series.clone(),
            pricing: PricingPolicy::from(config),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            render_parallelism: config.render_parallelism,
            company_scopes: config.company_scopes.clone(),
        }
    }
}

pub struct ProposalProcessor {
    store: Arc<dyn TemplateStore>,
    gate: ConversionGate,
    renderer: SummaryRenderer,
    proposal_log: Arc<dyn ProposalLog>,
    audit: Arc<dyn AuditSink>,
    settings: ProcessorSettings,
}

/// Per-request state shared by every render task.
struct RequestContext<'a> {
    request: &'a ProposalRequest,
    policy: PricingPolicy,
    workspace: &'a Path,
    intro_outro: IntroOutroCache,
}

/// Outcome of trying one template format for a location.
enum Attempt {
    Missing,
    Rendered(RenderResult),
    /// Trimming left none of the template.
    Empty,
}

/// One unit of the render fan-out.
struct RenderJob<'a> {
    proposal: &'a ValidatedProposal,
    trim: BoundaryTrim,
    with_summary: bool,
}

/// Fan-out result for one entry. `document` is `None` when trimming left
/// nothing of the entry.
struct RenderedEntry {
    index: usize,
    document: Option<PathBuf>,
    pricing: Option<LocationPricing>,
    rendered_via: RenderPath,
    missing: Vec<String>,
}

impl ProposalProcessor {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        gate: ConversionGate,
        settings: ProcessorSettings,
    ) -> Result<Self, ProposalFailure> {
        Ok(Self {
            store,
            gate,
            renderer: SummaryRenderer::new()?,
            proposal_log: Arc::new(InMemoryProposalLog::default()),
            audit: Arc::new(TracingAuditSink),
            settings,
        })
    }

    pub fn with_proposal_log(mut self, proposal_log: Arc<dyn ProposalLog>) -> Self {
        self.proposal_log = proposal_log;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    pub async fn respond(&self, request: ProposalRequest) -> ProposalResponse {
        ProposalResponse::from_result(self.process(request).await)
    }

    pub async fn process(&self, request: ProposalRequest) -> Result<ProposalOutcome, ProposalFailure> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("proposal", correlation_id = %request_id);
        let result = self.run(&request_id, &request).instrument(span).await;

        match &result {
            Ok(outcome) => self.emit(
                AuditEvent::new(
                    &request_id,
                    PROPOSAL_COMPLETED,
                    AuditCategory::Assembly,
                    &request.submitted_by,
                    AuditOutcome::Success,
                )
                .with_metadata("mode", outcome.mode.as_str())
                .with_metadata("filename", outcome.filename.clone())
                .with_metadata("total_amount", outcome.total_amount.clone()),
            ),
            Err(failure) => {
                warn!(
                    event_name = "proposal.failed",
                    correlation_id = %request_id,
                    stage = failure.event_name(),
                    error = %failure,
                    "proposal generation failed"
                );
                self.emit(
                    AuditEvent::new(
                        &request_id,
                        PROPOSAL_FAILED,
                        AuditCategory::System,
                        &request.submitted_by,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("stage", failure.event_name())
                    .with_metadata("errors", failure.messages().join("; ")),
                );
            }
        }
        result
    }

    /// Validation only: catalog and package lookups, no rendering.
    pub async fn validate(&self, request: &ProposalRequest) -> Result<ValidatedRequest, ProposalFailure> {
        if request.entries.is_empty() {
            return Err(ProposalFailure::Validation(vec![ValidationError::EmptyRequest]));
        }
        let scopes = self.scopes(request);
        let locations = with_timeout(
            self.settings.fetch_timeout,
            "location catalog",
            self.store.fetch_location_catalog(scopes),
        )
        .await?;
        let catalog = LocationCatalog::new(locations);
        let expander =
            PackageExpander::new(self.store.as_ref(), &catalog, scopes, self.settings.fetch_timeout);
        let validated = Validator::new(&catalog, &expander).validate(request).await;
        validated.map_err(ProposalFailure::Validation)
    }

    fn scopes<'r>(&'r self, request: &'r ProposalRequest) -> &'r [String] {
        if request.company_scopes.is_empty() {
            &self.settings.company_scopes
        } else {
            &request.company_scopes
        }
    }

    fn emit(&self, event: AuditEvent) {
        self.audit.emit(event);
    }

    async fn run(&self, request_id: &str, request: &ProposalRequest) -> Result<ProposalOutcome, ProposalFailure> {
        info!(event_name = "proposal.validating", entries = request.entries.len(), "validating proposal request");
        let validated = self.validate(request).await?;
        self.emit(
            AuditEvent::new(
                request_id,
                PROPOSAL_VALIDATED,
                AuditCategory::Validation,
                &request.submitted_by,
                AuditOutcome::Success,
            )
            .with_metadata("proposals", validated.proposals.len().to_string()),
        );

        let proposals = &validated.proposals;
        let mode = GenerationMode::select(request.mode, proposals);
        info!(event_name = "proposal.mode_selected", mode = mode.as_str(), proposals = proposals.len(), "generation mode selected");

        let workspace = TempDir::new().map_err(ProposalFailure::workspace)?;
        let context = RequestContext {
            request,
            policy: self.settings.pricing.clone().with_currency(request.currency.as_deref()),
            workspace: workspace.path(),
            intro_outro: IntroOutroCache::new(),
        };

        let bracket = self.bracket(mode, proposals, &context).await?;
        let jobs = plan(mode, proposals, bracket.is_some());
        let rendered = self.render_all(jobs, &context).await?;
        for entry in &rendered {
            self.emit(
                AuditEvent::new(
                    request_id,
                    PROPOSAL_RENDERED,
                    AuditCategory::Rendering,
                    &request.submitted_by,
                    AuditOutcome::Success,
                )
                .with_metadata("location", proposals[entry.index].key.to_string())
                .with_metadata("path", format!("{:?}", entry.rendered_via).to_lowercase()),
            );
        }

        let combined_total = match (mode, validated.combined_rate) {
            (GenerationMode::Combined, Some(rate)) => Some(self.combined_page(proposals, rate, &context).await?),
            _ => None,
        };

        let now = Utc::now();
        let filename = proposal_filename(request.client_name.as_deref(), now, "pdf");
        info!(event_name = "proposal.assembling", mode = mode.as_str(), parts = rendered.len(), "assembling document");

        let mut inputs = Vec::new();
        if let Some(pages) = &bracket {
            inputs.push(pages.intro.clone());
        }
        inputs.extend(rendered.iter().filter_map(|entry| entry.document.clone()));
        if let Some((summary, _)) = &combined_total {
            inputs.push(summary.clone());
        }
        if let Some(pages) = &bracket {
            inputs.push(pages.outro.clone());
        }

        let merged = context.workspace.join(&filename);
        let merge_inputs = inputs.clone();
        let merge_target = merged.clone();
        run_blocking(move || merge_ordered(&merge_inputs, &merge_target)).await?;
        for input in &inputs {
            discard(input).await;
        }
        let document = self.publish(&merged, request_id, &filename).await?;

        let (breakdown, total) = breakdown(proposals, &rendered, &context.policy);
        let total_amount = match &combined_total {
            Some((_, total)) => context.policy.format(*total),
            None => context.policy.format(total),
        };
        let summary = locations_summary(proposals);
        let warning = warning(proposals, &rendered);

        let entry = ProposalLogEntry {
            request_id: request_id.to_owned(),
            submitted_by: request.submitted_by.clone(),
            client_name: request.client_name.clone().unwrap_or_default(),
            package_type: mode.as_str().to_owned(),
            locations: summary.clone(),
            total_amount: total_amount.clone(),
            filename: filename.clone(),
            created_at: now,
        };
        if let Err(error) = self.proposal_log.log_proposal(&entry).await {
            warn!(event_name = "proposal.log_failed", error = %error, "could not record proposal");
        }

        info!(event_name = "proposal.completed", filename = %filename, document = %document.display(), "proposal ready");
        Ok(ProposalOutcome {
            request_id: request_id.to_owned(),
            mode,
            is_single: mode == GenerationMode::Single,
            document,
            filename,
            breakdown,
            total_amount,
            locations_summary: summary,
            warning,
        })
    }

    /// Intro/outro pages for modes that bracket the document. A single
    /// plain location brings its own opening and closing pages.
    async fn bracket(
        &self,
        mode: GenerationMode,
        proposals: &[ValidatedProposal],
        context: &RequestContext<'_>,
    ) -> Result<Option<IntroOutroPages>, ProposalFailure> {
        let needs_bracket = match mode {
            GenerationMode::Single => proposals.first().is_some_and(ValidatedProposal::is_package),
            GenerationMode::Separate | GenerationMode::Combined => true,
        };
        if !needs_bracket {
            return Ok(None);
        }
        let Some(selection) = intro_outro::select(proposals, &self.settings.premium_series) else {
            return Ok(None);
        };

        let source = IntroOutroSource {
            store: self.store.as_ref(),
            gate: &self.gate,
            fetch_timeout: self.settings.fetch_timeout,
        };
        context.intro_outro.pages(&selection, &source, context.workspace).await.map_err(|cause| {
            ProposalFailure::Render(vec![RenderError::new(
                selection.index,
                format!("intro/outro from {}", selection.source),
                cause,
            )])
        })
    }

    /// Renders every job concurrently and returns results in input order.
    /// Every job runs to completion; any failure fails the request with all
    /// failures reported together.
    async fn render_all(
        &self,
        jobs: Vec<RenderJob<'_>>,
        context: &RequestContext<'_>,
    ) -> Result<Vec<RenderedEntry>, ProposalFailure> {
        let parallelism = self.settings.render_parallelism.max(1);
        let mut results: Vec<(usize, Result<RenderedEntry, RenderError>)> = stream::iter(
            jobs.into_iter().enumerate().map(|(slot, job)| async move { (slot, self.render_entry(job, context).await) }),
        )
        .buffer_unordered(parallelism)
        .collect()
        .await;
        results.sort_by_key(|(slot, _)| *slot);

        let mut rendered = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for (_, result) in results {
            match result {
                Ok(entry) => rendered.push(entry),
                Err(error) => errors.push(error),
            }
        }

        if errors.is_empty() {
            return Ok(rendered);
        }
        for entry in &rendered {
            if let Some(document) = &entry.document {
                discard(document).await;
            }
        }
        Err(ProposalFailure::Render(errors))
    }

    async fn render_entry(&self, job: RenderJob<'_>, context: &RequestContext<'_>) -> Result<RenderedEntry, RenderError> {
        let proposal = job.proposal;
        let summary = job.with_summary.then(|| {
            location_summary(
                proposal,
                &context.policy,
                context.request.client_name.as_deref(),
                context.request.payment_terms.as_deref(),
            )
        });
        let (page, pricing) = match summary {
            Some((page, pricing)) => (Some(page), Some(pricing)),
            None => (None, None),
        };

        let result = match &proposal.subject {
            ProposalSubject::Package { targets, missing_networks, .. } => {
                self.render_package(proposal, targets, missing_networks, page, context).await
            }
            ProposalSubject::Location(_) => self.render_location(&job, page, context).await,
        };
        let (document, rendered_via, missing) =
            result.map_err(|cause| RenderError::new(proposal.index, proposal.display_name.clone(), cause))?;

        debug!(
            event_name = "render.entry_done",
            location = %proposal.key,
            path = ?rendered_via,
            "entry rendered"
        );
        Ok(RenderedEntry { index: proposal.index, document, pricing, rendered_via, missing })
    }

    async fn render_location(
        &self,
        job: &RenderJob<'_>,
        page: Option<SummaryPage>,
        context: &RequestContext<'_>,
    ) -> Result<(Option<PathBuf>, RenderPath, Vec<String>), RenderCause> {
        let proposal = job.proposal;
        let template_key = proposal.metadata().map_or(proposal.key.as_str(), |metadata| metadata.template_key());

        let (attempt, path) = match self.fast_path(job, template_key, page.as_ref(), context).await? {
            Attempt::Missing => {
                info!(
                    event_name = "render.fast_path_miss",
                    location = %proposal.key,
                    "no final-format template; falling back to the editable deck"
                );
                (self.slow_path(job, template_key, page.as_ref(), context).await?, RenderPath::Deck)
            }
            attempt => (attempt, RenderPath::Template),
        };
        let document = match attempt {
            Attempt::Missing => return Err(RenderCause::TemplateNotFound),
            Attempt::Empty => None,
            Attempt::Rendered(result) => self.compose(result, proposal.index, context).await?,
        };
        Ok((document, path, Vec::new()))
    }

    async fn fast_path(
        &self,
        job: &RenderJob<'_>,
        template_key: &str,
        page: Option<&SummaryPage>,
        context: &RequestContext<'_>,
    ) -> Result<Attempt, RenderCause> {
        let Some(template) =
            self.download(template_key, &job.proposal.company, TemplateFormat::Pdf, context.workspace).await?
        else {
            return Ok(Attempt::Missing);
        };

        let counted = template.clone();
        let count = match run_blocking(move || page_count(&counted)).await {
            Ok(count) => count,
            Err(error) => {
                discard(&template).await;
                return Err(error.into());
            }
        };
        let summary = match page {
            Some(page) => match self.summary_pdf(page.clone(), job.proposal.index, context).await {
                Ok(summary) => Some(summary),
                Err(cause) => {
                    discard(&template).await;
                    return Err(cause);
                }
            },
            None => None,
        };

        Ok(Attempt::Rendered(RenderResult::PdfFirst {
            template,
            page_count: count,
            keep_pages: job.trim.pages(count),
            summary,
        }))
    }

    /// Inserts the summary slide before the closing slide, drops trimmed
    /// slides and converts what remains.
    async fn slow_path(
        &self,
        job: &RenderJob<'_>,
        template_key: &str,
        page: Option<&SummaryPage>,
        context: &RequestContext<'_>,
    ) -> Result<Attempt, RenderCause> {
        let Some(source) =
            self.download(template_key, &job.proposal.company, TemplateFormat::Deck, context.workspace).await?
        else {
            return Ok(Attempt::Missing);
        };

        let edited = context
            .workspace
            .join(format!("deck_{}_{}.pptx", job.proposal.index, Uuid::new_v4().simple()));
        let slide = page.map(|page| (location_title(&job.proposal.display_name), page.slide_lines()));
        let trim = job.trim;
        let (deck_path, target) = (source.clone(), edited.clone());
        let prepared = run_blocking(move || {
            let mut deck = Deck::open(&deck_path)?;
            let summary_at = match slide {
                Some((title, lines)) => {
                    let count = deck.slide_count()?;
                    Some(deck.insert_summary_slide(count.saturating_sub(1), &title, &lines)?)
                }
                None => None,
            };
            let keep: BTreeSet<usize> = trim.pages(deck.slide_count()?).into_iter().collect();
            if keep.is_empty() && summary_at.is_none() {
                return Ok(false);
            }
            deck.retain_slides(|position| Some(position) == summary_at || keep.contains(&position))?;
            deck.save(&target)?;
            Ok(true)
        })
        .await;
        discard(&source).await;

        if !prepared? {
            debug!(event_name = "render.deck_trimmed_empty", location = %job.proposal.key, "no slides left after trimming");
            return Ok(Attempt::Empty);
        }
        let converted = self.gate.convert(&edited).await;
        discard(&edited).await;
        Ok(Attempt::Rendered(RenderResult::Converted { document: converted? }))
    }

    /// Turns a render result into the entry's own document: kept template
    /// pages with the summary placed before a kept closing page.
    async fn compose(
        &self,
        result: RenderResult,
        index: usize,
        context: &RequestContext<'_>,
    ) -> Result<Option<PathBuf>, RenderCause> {
        let (template, count, keep_pages, summary) = match result {
            RenderResult::Converted { document } => return Ok(Some(document)),
            RenderResult::PdfFirst { template, page_count, keep_pages, summary } => {
                (template, page_count, keep_pages, summary)
            }
        };

        let last = count.saturating_sub(1);
        let closing = summary.is_some() && keep_pages.len() > 1 && keep_pages.last() == Some(&last);
        let body: Vec<usize> = keep_pages.iter().copied().filter(|page| !(closing && *page == last)).collect();

        let workspace = context.workspace.to_path_buf();
        let source = template.clone();
        let extracted = run_blocking(move || {
            let stem = Uuid::new_v4().simple().to_string();
            let body_path = if body.is_empty() {
                None
            } else {
                Some(extract_pages(&source, &body, &workspace.join(format!("body_{index}_{stem}.pdf")))?)
            };
            let closing_path = if closing {
                Some(extract_pages(&source, &[last], &workspace.join(format!("closing_{index}_{stem}.pdf")))?)
            } else {
                None
            };
            Ok((body_path, closing_path))
        })
        .await;
        discard(&template).await;
        let (body_path, closing_path) = extracted?;

        let parts: Vec<PathBuf> = [body_path, summary, closing_path].into_iter().flatten().collect();
        self.merge_parts(parts, &format!("entry_{index}"), context).await
    }

    /// Merges and consumes `parts`; a single part is returned as is.
    async fn merge_parts(
        &self,
        parts: Vec<PathBuf>,
        stem: &str,
        context: &RequestContext<'_>,
    ) -> Result<Option<PathBuf>, RenderCause> {
        match parts.len() {
            0 => Ok(None),
            1 => Ok(parts.into_iter().next()),
            _ => {
                let target = context.workspace.join(format!("{stem}_{}.pdf", Uuid::new_v4().simple()));
                let (inputs, dest) = (parts.clone(), target.clone());
                let merged = run_blocking(move || merge_ordered(&inputs, &dest)).await;
                for part in &parts {
                    discard(part).await;
                }
                Ok(Some(merged?))
            }
        }
    }

    /// Every network renders independently with its own boundary pages
    /// removed. Networks without any template are skipped and reported.
    async fn render_package(
        &self,
        proposal: &ValidatedProposal,
        targets: &[GenerationTarget],
        missing_networks: &[String],
        page: Option<SummaryPage>,
        context: &RequestContext<'_>,
    ) -> Result<(Option<PathBuf>, RenderPath, Vec<String>), RenderCause> {
        let rendered = futures::future::join_all(
            targets.iter().map(|target| self.render_network(target, proposal.index, context)),
        )
        .await;

        let mut parts = Vec::new();
        let mut missing = missing_networks.to_vec();
        let mut failure = None;
        for (target, result) in targets.iter().zip(rendered) {
            match result {
                Ok(contributions) if contributions.is_empty() => {
                    warn!(
                        event_name = "package.network_skipped",
                        package = %proposal.key,
                        network = %target.network_key(),
                        "network has no template; skipping it"
                    );
                    missing.push(target.display_name().to_owned());
                }
                Ok(contributions) => parts.extend(contributions),
                Err(cause) => {
                    if failure.is_none() {
                        failure = Some(cause);
                    }
                }
            }
        }
        if let Some(cause) = failure {
            for part in &parts {
                discard(part).await;
            }
            return Err(cause);
        }
        if parts.is_empty() {
            return Err(RenderCause::PackageEmpty { missing });
        }

        let content = self.merge_parts(parts, &format!("package_{}", proposal.index), context).await?;
        let mut pieces: Vec<PathBuf> = content.into_iter().collect();
        if let Some(page) = page {
            match self.summary_pdf(page, proposal.index, context).await {
                Ok(summary) => pieces.push(summary),
                Err(cause) => {
                    for piece in &pieces {
                        discard(piece).await;
                    }
                    return Err(cause);
                }
            }
        }
        let document = self.merge_parts(pieces, &format!("package_entry_{}", proposal.index), context).await?;
        Ok((document, RenderPath::Package, missing))
    }

    /// Content of one package network, one document per storage key that
    /// has a template. Empty when none does.
    async fn render_network(
        &self,
        target: &GenerationTarget,
        index: usize,
        context: &RequestContext<'_>,
    ) -> Result<Vec<PathBuf>, RenderCause> {
        let mut contributions = Vec::new();
        for storage_key in &target.storage_keys {
            if let Some(template) =
                self.download(storage_key, target.company(), TemplateFormat::Pdf, context.workspace).await?
            {
                let target_path =
                    context.workspace.join(format!("network_{index}_{}.pdf", Uuid::new_v4().simple()));
                let (source, dest) = (template.clone(), target_path.clone());
                let extracted = run_blocking(move || {
                    let keep = BoundaryTrim::STRIP_BOTH.pages(page_count(&source)?);
                    if keep.is_empty() {
                        return Ok(None);
                    }
                    extract_pages(&source, &keep, &dest).map(Some)
                })
                .await;
                discard(&template).await;
                contributions.extend(extracted?);
                continue;
            }

            let Some(deck) =
                self.download(storage_key, target.company(), TemplateFormat::Deck, context.workspace).await?
            else {
                continue;
            };
            info!(
                event_name = "render.fast_path_miss",
                network = %target.network_key(),
                storage_key = %storage_key,
                "network falls back to the editable deck"
            );
            let stripped = context.workspace.join(format!("network_{index}_{}.pptx", Uuid::new_v4().simple()));
            let (source, dest) = (deck.clone(), stripped.clone());
            let prepared = run_blocking(move || {
                let mut deck = Deck::open(&source)?;
                if deck.slide_count()? <= 2 {
                    return Ok(false);
                }
                deck.remove_first_last(true, true)?;
                deck.save(&dest)?;
                Ok(true)
            })
            .await;
            discard(&deck).await;
            if prepared? {
                let converted = self.gate.convert(&stripped).await;
                discard(&stripped).await;
                contributions.push(converted?);
            }
        }
        Ok(contributions)
    }

    /// Renders the HTML summary and converts it to a single PDF page.
    async fn summary_pdf(
        &self,
        page: SummaryPage,
        index: usize,
        context: &RequestContext<'_>,
    ) -> Result<PathBuf, RenderCause> {
        let artifact = self.renderer.write(page, context.workspace, &format!("summary_{index}")).await?;
        let converted = self.gate.convert(&artifact.path).await;
        discard(&artifact.path).await;
        Ok(converted?)
    }

    async fn combined_page(
        &self,
        proposals: &[ValidatedProposal],
        rate: Decimal,
        context: &RequestContext<'_>,
    ) -> Result<(PathBuf, Decimal), ProposalFailure> {
        let (artifact, pricing) = self
            .renderer
            .render_combined_financial_summary(
                proposals,
                rate,
                &context.policy,
                context.request.client_name.as_deref(),
                context.request.payment_terms.as_deref(),
                context.workspace,
            )
            .await?;
        let converted = self.gate.convert(&artifact.path).await;
        discard(&artifact.path).await;
        Ok((converted?, pricing.total))
    }

    async fn download(
        &self,
        key: &str,
        company: &str,
        format: TemplateFormat,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>, StoreError> {
        with_timeout(
            self.settings.fetch_timeout,
            "template download",
            self.store.download_template(key, Some(company), format, dest_dir),
        )
        .await
    }

    /// Moves the merged document out of the workspace into
    /// `<output_dir>/<request id>/<filename>`.
    async fn publish(&self, merged: &Path, request_id: &str, filename: &str) -> Result<PathBuf, ProposalFailure> {
        let dir = self.settings.output_dir.join(request_id);
        tokio::fs::create_dir_all(&dir).await.map_err(ProposalFailure::workspace)?;
        let target = dir.join(filename);
        if tokio::fs::rename(merged, &target).await.is_err() {
            tokio::fs::copy(merged, &target).await.map_err(ProposalFailure::workspace)?;
            discard(merged).await;
        }
        Ok(target)
    }
}

/// Orders the fan-out. Combined runs render each distinct location once
/// and carry no per-location summary.
fn plan(mode: GenerationMode, proposals: &[ValidatedProposal], bracketed: bool) -> Vec<RenderJob<'_>> {
    match mode {
        GenerationMode::Single => proposals
            .iter()
            .take(1)
            .map(|proposal| RenderJob { proposal, trim: BoundaryTrim::KEEP_BOTH, with_summary: true })
            .collect(),
        GenerationMode::Separate => proposals
            .iter()
            .enumerate()
            .map(|(position, proposal)| RenderJob {
                proposal,
                trim: BoundaryTrim::for_position(position, proposals.len(), bracketed),
                with_summary: true,
            })
            .collect(),
        GenerationMode::Combined => {
            let mut seen = HashSet::new();
            let unique: Vec<&ValidatedProposal> =
                proposals.iter().filter(|proposal| seen.insert(proposal.key.clone())).collect();
            let count = unique.len();
            unique
                .into_iter()
                .enumerate()
                .map(|(position, proposal)| RenderJob {
                    proposal,
                    trim: BoundaryTrim::for_position(position, count, bracketed),
                    with_summary: false,
                })
                .collect()
        }
    }
}

/// Per-proposal amounts and the sum of each proposal's first option.
fn breakdown(
    proposals: &[ValidatedProposal],
    rendered: &[RenderedEntry],
    policy: &PricingPolicy,
) -> (Vec<LocationBreakdown>, Decimal) {
    let mut total = Decimal::ZERO;
    let rows = proposals
        .iter()
        .map(|proposal| {
            let entry = rendered.iter().find(|entry| entry.index == proposal.index);
            let pricing = entry.and_then(|entry| entry.pricing.as_ref());
            if let Some(pricing) = pricing {
                total += pricing.headline_total();
            }
            LocationBreakdown {
                location: proposal.key.to_string(),
                display_name: proposal.display_name.clone(),
                start_date: proposal.start_date.clone(),
                end_dates: proposal.end_dates.clone(),
                durations: proposal.durations.clone(),
                net_rates: proposal.net_rates.iter().map(|rate| policy.format(*rate)).collect(),
                vat_amounts: pricing.map(LocationPricing::formatted_vat).unwrap_or_default(),
                total_amounts: pricing.map(LocationPricing::formatted_totals).unwrap_or_default(),
                rendered_via: entry.map_or(RenderPath::Template, |entry| entry.rendered_via),
            }
        })
        .collect();
    (rows, total)
}

fn warning(proposals: &[ValidatedProposal], rendered: &[RenderedEntry]) -> Option<String> {
    let notes: Vec<String> = rendered
        .iter()
        .filter(|entry| !entry.missing.is_empty())
        .map(|entry| {
            let package = proposals
                .iter()
                .find(|proposal| proposal.index == entry.index)
                .map_or("package", |proposal| proposal.display_name.as_str());
            format!("{package} was generated without: {}", entry.missing.join(", "))
        })
        .collect();
    (!notes.is_empty()).then(|| notes.join("; "))
}
