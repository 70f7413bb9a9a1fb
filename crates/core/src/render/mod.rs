//! Financial summary pages.
//!
//! A summary is described once as a [`SummaryPage`] and then either rendered
//! to standalone HTML (fast path, converted through the gate later) or
//! flattened into text lines for a generated deck slide (slow path).

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::proposal::{ProposalSubject, ValidatedProposal};
use crate::pricing::{price_combined, price_location, CombinedPricing, LocationPricing, PricingPolicy};

const TEMPLATE_NAME: &str = "financial_summary.html";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    #[error("summary template failed: {0}")]
    Template(String),
    #[error("cannot write summary `{path}`: {message}")]
    Io { path: PathBuf, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SummaryDetail {
    pub label: String,
    pub value: String,
}

impl SummaryDetail {
    fn new(label: &str, value: impl Into<String>) -> Self {
        Self { label: label.to_owned(), value: value.into() }
    }
}

/// Everything shown on one financial summary page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SummaryPage {
    pub title: String,
    pub heading: String,
    pub client_name: Option<String>,
    pub details: Vec<SummaryDetail>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub totals: Vec<SummaryDetail>,
    pub payment_terms: Option<String>,
}

impl SummaryPage {
    /// Text lines for a generated slide, in reading order.
    pub fn slide_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(client) = &self.client_name {
            lines.push(format!("Prepared for {client}"));
        }
        lines.extend(self.details.iter().map(|detail| format!("{}: {}", detail.label, detail.value)));
        for row in &self.rows {
            lines.push(
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| format!("{column}: {cell}"))
                    .collect::<Vec<_>>()
                    .join(" | "),
            );
        }
        lines.extend(self.totals.iter().map(|total| format!("{}: {}", total.label, total.value)));
        if let Some(terms) = &self.payment_terms {
            lines.push(format!("Payment terms: {terms}"));
        }
        lines
    }
}

pub fn location_title(display_name: &str) -> String {
    format!("Financial Summary: {display_name}")
}

pub const COMBINED_TITLE: &str = "Combined Financial Summary";

/// Builds the per-location summary page and its amounts.
pub fn location_summary(
    proposal: &ValidatedProposal,
    policy: &PricingPolicy,
    client_name: Option<&str>,
    payment_terms: Option<&str>,
) -> (SummaryPage, LocationPricing) {
    let fee_share = policy.fee_share(proposal.production_fee, &proposal.upload_fees(), proposal.spots);
    let pricing = price_location(policy, &proposal.net_rates, fee_share);

    let mut details = vec![
        SummaryDetail::new("Location", proposal.display_name.as_str()),
        SummaryDetail::new("Start date", proposal.start_date.as_str()),
        SummaryDetail::new("Spots", proposal.spots.to_string()),
    ];
    if let Some(metadata) = proposal.metadata().filter(|_| !proposal.is_package()) {
        if let Some(series) = &metadata.series {
            details.push(SummaryDetail::new("Series", series.as_str()));
        }
        if let Some(dimensions) = metadata.dimensions() {
            details.push(SummaryDetail::new("Dimensions", dimensions));
        }
        details.push(SummaryDetail::new("Faces", metadata.number_of_faces.to_string()));
        details.push(SummaryDetail::new("SOV", format!("{}%", metadata.sov_percent.normalize())));
        if metadata.loop_duration_secs > 0 {
            details.push(SummaryDetail::new(
                "Spot / loop",
                format!("{}s / {}s", metadata.spot_duration_secs, metadata.loop_duration_secs),
            ));
        }
    }

    let fee_label = if proposal.production_fee.is_some() { "Production fee" } else { "Upload fee" };
    let net_rates = pricing.formatted_net_rates();
    let vat = pricing.formatted_vat();
    let totals = pricing.formatted_totals();
    let fee = pricing.formatted_fee();
    let rows = proposal
        .durations
        .iter()
        .enumerate()
        .map(|(option, duration)| {
            vec![
                duration.clone(),
                proposal.end_dates.get(option).cloned().unwrap_or_default(),
                net_rates.get(option).cloned().unwrap_or_default(),
                fee.clone(),
                vat.get(option).cloned().unwrap_or_default(),
                totals.get(option).cloned().unwrap_or_default(),
            ]
        })
        .collect();

    let page = SummaryPage {
        title: location_title(&proposal.display_name),
        heading: format!("{} Investment", proposal.display_name),
        client_name: client_name.map(str::to_owned),
        details,
        columns: ["Duration", "End date", "Net rate", fee_label, "VAT", "Total"]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        rows,
        totals: Vec::new(),
        payment_terms: proposal.payment_terms.as_deref().or(payment_terms).map(str::to_owned),
    };
    (page, pricing)
}

/// Builds the single summary page shared by every location of a combined
/// proposal.
pub fn combined_summary(
    proposals: &[ValidatedProposal],
    combined_rate: Decimal,
    policy: &PricingPolicy,
    client_name: Option<&str>,
    payment_terms: Option<&str>,
) -> (SummaryPage, CombinedPricing) {
    let sources: Vec<(String, Option<Decimal>)> = proposals.iter().flat_map(fee_sources).collect();
    let pricing = price_combined(policy, combined_rate, &sources);

    let rows = proposals
        .iter()
        .map(|proposal| {
            vec![
                proposal.display_name.clone(),
                proposal.start_date.clone(),
                proposal.durations.join(", "),
                proposal.end_dates.join(", "),
            ]
        })
        .collect();

    let mut totals = vec![SummaryDetail::new("Net rate", policy.format(pricing.net_rate))];
    totals.extend(
        pricing
            .upload_fees
            .iter()
            .map(|line| SummaryDetail::new(&format!("Upload fee ({})", line.location), policy.format(line.amount))),
    );
    totals.push(SummaryDetail::new("Municipality fee", policy.format(pricing.municipality_fee)));
    totals.push(SummaryDetail::new("Subtotal", policy.format(pricing.subtotal)));
    totals.push(SummaryDetail::new("VAT", policy.format(pricing.vat)));
    totals.push(SummaryDetail::new("Total", pricing.formatted_total()));

    let page = SummaryPage {
        title: COMBINED_TITLE.to_owned(),
        heading: "Combined Package Investment".to_owned(),
        client_name: client_name.map(str::to_owned),
        details: vec![SummaryDetail::new("Locations", locations_summary(proposals))],
        columns: ["Location", "Start date", "Durations", "End dates"].into_iter().map(str::to_owned).collect(),
        rows,
        totals,
        payment_terms: payment_terms.map(str::to_owned),
    };
    (page, pricing)
}

/// Packages contribute one upload fee per underlying network.
fn fee_sources(proposal: &ValidatedProposal) -> Vec<(String, Option<Decimal>)> {
    match &proposal.subject {
        ProposalSubject::Package { targets, .. } => targets
            .iter()
            .map(|target| (target.display_name().to_owned(), target.network.upload_fee))
            .collect(),
        ProposalSubject::Location(metadata) => vec![(proposal.display_name.clone(), metadata.upload_fee)],
    }
}

pub fn locations_summary(proposals: &[ValidatedProposal]) -> String {
    proposals.iter().map(|proposal| proposal.display_name.as_str()).collect::<Vec<_>>().join(", ")
}

/// HTML summary written into the request workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryArtifact {
    pub path: PathBuf,
    pub page: SummaryPage,
}

#[derive(Clone, Debug)]
pub struct SummaryRenderer {
    tera: Tera,
}

impl SummaryRenderer {
    pub fn new() -> Result<Self, SummaryError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, include_str!("../../templates/financial_summary.html.tera"))
            .map_err(|error| SummaryError::Template(error.to_string()))?;
        Ok(Self { tera })
    }

    pub fn render_html(&self, page: &SummaryPage) -> Result<String, SummaryError> {
        let context =
            Context::from_serialize(page).map_err(|error| SummaryError::Template(error.to_string()))?;
        self.tera.render(TEMPLATE_NAME, &context).map_err(|error| SummaryError::Template(error.to_string()))
    }

    pub async fn write(&self, page: SummaryPage, dest_dir: &Path, stem: &str) -> Result<SummaryArtifact, SummaryError> {
        let html = self.render_html(&page)?;
        let path = dest_dir.join(format!("{stem}_{}.html", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&path, html)
            .await
            .map_err(|error| SummaryError::Io { path: path.clone(), message: error.to_string() })?;
        Ok(SummaryArtifact { path, page })
    }

    pub async fn render_combined_financial_summary(
        &self,
        proposals: &[ValidatedProposal],
        combined_rate: Decimal,
        policy: &PricingPolicy,
        client_name: Option<&str>,
        payment_terms: Option<&str>,
        dest_dir: &Path,
    ) -> Result<(SummaryArtifact, CombinedPricing), SummaryError> {
        let (page, pricing) = combined_summary(proposals, combined_rate, policy, client_name, payment_terms);
        let artifact = self.write(page, dest_dir, "summary_combined").await?;
        Ok((artifact, pricing))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use crate::fixtures::{gateway_proposal, location_metadata, validated};
    use crate::pricing::PricingPolicy;
    use crate::render::{combined_summary, location_summary, SummaryRenderer, COMBINED_TITLE};

    #[test]
    fn location_summary_prices_every_duration_option() {
        let proposal = gateway_proposal();
        let (page, pricing) = location_summary(&proposal, &PricingPolicy::default(), Some("Emaar"), None);

        assert_eq!(pricing.totals, vec![Decimal::new(55_500, 0)]);
        assert_eq!(page.title, "Financial Summary: The Gateway");
        assert_eq!(
            page.rows,
            vec![vec![
                "4 Weeks".to_owned(),
                "29th December 2025".to_owned(),
                "AED 50,000.00".to_owned(),
                "AED 3,000.00".to_owned(),
                "AED 2,500.00".to_owned(),
                "AED 55,500.00".to_owned(),
            ]]
        );
        let lines = page.slide_lines();
        assert_eq!(lines[0], "Prepared for Emaar");
        assert!(lines.iter().any(|line| line.contains("Total: AED 55,500.00")));
    }

    #[test]
    fn combined_summary_uses_fallback_fees_for_unknown_locations() {
        let mut known = location_metadata("dubai_mall", "Dubai Mall");
        known.upload_fee = Some(Decimal::new(2000, 0));
        let unknown = location_metadata("marina_walk", "Marina Walk");
        let proposals = vec![validated(0, known), validated(1, unknown)];

        let (page, pricing) =
            combined_summary(&proposals, Decimal::new(100_000, 0), &PricingPolicy::default(), None, Some("50% upfront"));

        assert_eq!(pricing.total, Decimal::new(110_796, 0));
        assert_eq!(page.title, COMBINED_TITLE);
        assert_eq!(page.totals.last().map(|total| total.value.as_str()), Some("AED 110,796.00"));
        assert_eq!(page.payment_terms.as_deref(), Some("50% upfront"));
    }

    #[tokio::test]
    async fn html_artifact_carries_title_and_escaped_content() {
        let dir = TempDir::new().expect("temp dir");
        let renderer = SummaryRenderer::new().expect("renderer");
        let mut proposal = gateway_proposal();
        proposal.display_name = "Sheikh Zayed <Road>".to_owned();

        let (page, pricing) = location_summary(&proposal, &PricingPolicy::default(), None, None);
        let artifact = renderer.write(page, dir.path(), "summary_0").await.expect("render");

        let html = std::fs::read_to_string(&artifact.path).expect("html");
        assert!(artifact.path.starts_with(dir.path()));
        assert!(html.contains("<title>Financial Summary: Sheikh Zayed &lt;Road&gt;</title>"));
        assert!(html.contains("AED 55,500.00"));
        assert_eq!(pricing.vat_amounts, vec![Decimal::new(2500, 0)]);
    }

    #[tokio::test]
    async fn combined_artifact_is_written_into_the_workspace() {
        let dir = TempDir::new().expect("temp dir");
        let renderer = SummaryRenderer::new().expect("renderer");
        let proposals = vec![
            validated(0, location_metadata("dubai_mall", "Dubai Mall")),
            validated(1, location_metadata("marina_walk", "Marina Walk")),
        ];

        let (artifact, pricing) = renderer
            .render_combined_financial_summary(
                &proposals,
                Decimal::new(100_000, 0),
                &PricingPolicy::default(),
                Some("Emaar"),
                None,
                dir.path(),
            )
            .await
            .expect("render");

        let html = std::fs::read_to_string(&artifact.path).expect("html");
        assert!(artifact.path.starts_with(dir.path()));
        assert!(html.contains(&format!("<title>{COMBINED_TITLE}</title>")));
        assert!(html.contains("Dubai Mall, Marina Walk"));
        assert_eq!(artifact.page.title, COMBINED_TITLE);
        assert!(pricing.total > Decimal::new(100_000, 0));
    }
}
