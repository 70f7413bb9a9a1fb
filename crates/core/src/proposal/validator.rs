use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::catalog::{ExpansionError, LocationCatalog, PackageExpander};
use crate::domain::location::LocationKey;
use crate::domain::proposal::{LocationEntry, ProposalMode, ProposalRequest, ProposalSubject, ValidatedProposal};
use crate::errors::ValidationError;
use crate::pricing::parse_amount;
use crate::schedule::{end_date, START_DATE_PLACEHOLDER};

/// Validation output for a whole request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidatedRequest {
    pub proposals: Vec<ValidatedProposal>,
    /// Set only for combined requests.
    pub combined_rate: Option<Decimal>,
}

pub struct Validator<'a> {
    catalog: &'a LocationCatalog,
    packages: &'a PackageExpander<'a>,
}

impl<'a> Validator<'a> {
    pub fn new(catalog: &'a LocationCatalog, packages: &'a PackageExpander<'a>) -> Self {
        Self { catalog, packages }
    }

    /// Checks every entry and reports every problem at once. Only catalog
    /// and package lookups happen here; nothing is downloaded or rendered.
    pub async fn validate(&self, request: &ProposalRequest) -> Result<ValidatedRequest, Vec<ValidationError>> {
        if request.entries.is_empty() {
            return Err(vec![ValidationError::EmptyRequest]);
        }

        let combined = request.mode == ProposalMode::Combined;
        let mut proposals = Vec::with_capacity(request.entries.len());
        let mut errors = Vec::new();

        for (index, entry) in request.entries.iter().enumerate() {
            match self.validate_entry(index, entry, request, combined).await {
                Ok(proposal) => proposals.push(proposal),
                Err(mut entry_errors) => errors.append(&mut entry_errors),
            }
        }

        let mut combined_rate = None;
        if combined {
            match request.combined_net_rate.as_deref().map(str::trim).filter(|rate| !rate.is_empty()) {
                None => errors.push(ValidationError::MissingCombinedRate),
                Some(raw) => match parse_amount(raw) {
                    Some(rate) => combined_rate = Some(rate),
                    None => errors.push(ValidationError::InvalidCombinedRate { value: raw.to_owned() }),
                },
            }

            let lone_package = request.entries.len() == 1 && proposals.first().is_some_and(ValidatedProposal::is_package);
            if request.entries.len() < 2 && !lone_package {
                errors.push(ValidationError::CombinedTooFew);
            }
            errors.extend(package_overlaps(&proposals));
        }

        if errors.is_empty() {
            debug!(event_name = "proposal.validated", proposals = proposals.len(), "request validated");
            Ok(ValidatedRequest { proposals, combined_rate })
        } else {
            Err(errors)
        }
    }

    async fn validate_entry(
        &self,
        index: usize,
        entry: &LocationEntry,
        request: &ProposalRequest,
        combined: bool,
    ) -> Result<ValidatedProposal, Vec<ValidationError>> {
        let position = index + 1;
        let input = entry.location.trim();
        let subject = self.resolve_subject(position, input).await.map_err(|error| vec![error])?;
        let (key, display_name, owner) = match &subject {
            ProposalSubject::Location(metadata) => {
                (metadata.key.clone(), metadata.display_name.clone(), metadata.company.clone())
            }
            ProposalSubject::Package { descriptor, .. } => {
                (descriptor.key.clone(), descriptor.display_name.clone(), descriptor.company.clone())
            }
        };

        let mut errors = Vec::new();
        let durations: Vec<String> = entry
            .durations
            .iter()
            .map(|duration| duration.trim().to_owned())
            .filter(|duration| !duration.is_empty())
            .collect();
        if durations.is_empty() {
            errors.push(ValidationError::MissingDurations { position, location: display_name.clone() });
        }

        // Combined requests price from the combined rate, so per-entry
        // rates are optional there.
        let rates_required = !combined || !entry.net_rates.is_empty();
        if rates_required && !durations.is_empty() && entry.net_rates.len() != durations.len() {
            errors.push(ValidationError::MismatchedRates {
                position,
                location: display_name.clone(),
                durations: durations.len(),
                rates: entry.net_rates.len(),
            });
        }

        let mut net_rates = Vec::with_capacity(entry.net_rates.len());
        for raw in &entry.net_rates {
            match parse_amount(raw) {
                Some(rate) => net_rates.push(rate),
                None => errors.push(ValidationError::InvalidAmount {
                    position,
                    location: display_name.clone(),
                    value: raw.clone(),
                }),
            }
        }

        let production_fee = match entry.production_fee.as_deref().map(str::trim).filter(|fee| !fee.is_empty()) {
            None => None,
            Some(raw) => match parse_amount(raw) {
                Some(fee) => Some(fee),
                None => {
                    errors.push(ValidationError::InvalidAmount {
                        position,
                        location: display_name.clone(),
                        value: raw.to_owned(),
                    });
                    None
                }
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        let start_date = entry
            .start_date
            .as_deref()
            .map(str::trim)
            .filter(|start| !start.is_empty())
            .unwrap_or(START_DATE_PLACEHOLDER)
            .to_owned();
        let explicit_end = entry.end_date.as_deref().map(str::trim).filter(|end| !end.is_empty());
        let end_dates = match explicit_end {
            Some(end) if durations.len() == 1 => vec![end.to_owned()],
            _ => durations.iter().map(|duration| end_date(&start_date, duration)).collect(),
        };

        Ok(ValidatedProposal {
            index,
            key,
            display_name,
            subject,
            durations,
            net_rates,
            spots: entry.spots.max(1),
            start_date,
            end_dates,
            production_fee,
            payment_terms: entry.payment_terms.clone().or_else(|| request.payment_terms.clone()),
            company: entry.company.clone().unwrap_or(owner),
        })
    }

    /// Catalog first, then packages.
    async fn resolve_subject(&self, position: usize, input: &str) -> Result<ProposalSubject, ValidationError> {
        if let Some(metadata) = self.catalog.lookup(input) {
            return Ok(ProposalSubject::Location(metadata.clone()));
        }
        if input.is_empty() {
            return Err(ValidationError::UnknownLocation { position, input: input.to_owned() });
        }

        let descriptor = self
            .packages
            .find_package(input)
            .await
            .map_err(|error| ValidationError::Lookup { position, message: error.to_string() })?
            .ok_or_else(|| ValidationError::UnknownLocation { position, input: input.to_owned() })?;

        match self.packages.expand(&descriptor).await {
            Ok(expansion) => Ok(ProposalSubject::Package {
                descriptor,
                targets: expansion.targets,
                missing_networks: expansion.missing,
            }),
            Err(ExpansionError::NoTargets { package, .. }) => {
                Err(ValidationError::EmptyPackage { position, package })
            }
            Err(ExpansionError::Store(error)) => {
                Err(ValidationError::Lookup { position, message: error.to_string() })
            }
        }
    }
}

/// A package may not be combined with one of its own networks.
fn package_overlaps(proposals: &[ValidatedProposal]) -> Vec<ValidationError> {
    let standalone: Vec<(&LocationKey, &str)> = proposals
        .iter()
        .filter(|proposal| !proposal.is_package())
        .map(|proposal| (&proposal.key, proposal.display_name.as_str()))
        .collect();

    let mut overlaps = Vec::new();
    for proposal in proposals {
        let ProposalSubject::Package { descriptor, targets, .. } = &proposal.subject else {
            continue;
        };
        for target in targets {
            if let Some((_, location)) = standalone.iter().find(|(key, _)| *key == target.network_key()) {
                overlaps.push(ValidationError::PackageOverlap {
                    location: (*location).to_owned(),
                    package: descriptor.display_name.clone(),
                });
            }
        }
    }
    overlaps
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use crate::catalog::{LocationCatalog, PackageExpander};
    use crate::domain::location::LocationKey;
    use crate::domain::proposal::{LocationEntry, ProposalMode, ProposalRequest};
    use crate::errors::ValidationError;
    use crate::fixtures::location_metadata;
    use crate::proposal::validator::Validator;
    use crate::schedule::END_DATE_PLACEHOLDER;
    use crate::store::{InMemoryTemplateStore, PackageRecord};

    fn entry(location: &str, durations: &[&str], rates: &[&str]) -> LocationEntry {
        LocationEntry {
            location: location.to_owned(),
            durations: durations.iter().map(|value| (*value).to_owned()).collect(),
            net_rates: rates.iter().map(|value| (*value).to_owned()).collect(),
            spots: 1,
            start_date: Some("1st December 2025".to_owned()),
            ..LocationEntry::default()
        }
    }

    fn request(mode: ProposalMode, entries: Vec<LocationEntry>) -> ProposalRequest {
        ProposalRequest { entries, mode, ..ProposalRequest::default() }
    }

    fn fixtures() -> (InMemoryTemplateStore, LocationCatalog) {
        let store = InMemoryTemplateStore::new().with_package(PackageRecord {
            id: "pkg-1".to_owned(),
            key: LocationKey::new("mall_bundle"),
            display_name: "Mall Bundle".to_owned(),
            company: "backlite_dubai".to_owned(),
            networks: vec!["dubai_mall".to_owned(), "marina_walk".to_owned()],
        });
        let catalog = LocationCatalog::new(vec![
            location_metadata("the_gateway", "The Gateway"),
            location_metadata("dubai_mall", "Dubai Mall"),
            location_metadata("marina_walk", "Marina Walk"),
        ]);
        (store, catalog)
    }

    #[tokio::test]
    async fn every_entry_problem_is_reported_together() {
        let (store, catalog) = fixtures();
        let expander = PackageExpander::new(&store, &catalog, &[], Duration::from_secs(5));
        let validator = Validator::new(&catalog, &expander);

        let errors = validator
            .validate(&request(
                ProposalMode::Separate,
                vec![
                    entry("Atlantis Arch", &["4 Weeks"], &["AED 10,000"]),
                    entry("The Gateway", &[], &[]),
                    entry("Dubai Mall", &["2 Weeks", "4 Weeks"], &["AED 20,000"]),
                    entry("Marina Walk", &["2 Weeks"], &["lots"]),
                ],
            ))
            .await
            .expect_err("invalid request");

        assert_eq!(
            errors,
            vec![
                ValidationError::UnknownLocation { position: 1, input: "Atlantis Arch".to_owned() },
                ValidationError::MissingDurations { position: 2, location: "The Gateway".to_owned() },
                ValidationError::MismatchedRates {
                    position: 3,
                    location: "Dubai Mall".to_owned(),
                    durations: 2,
                    rates: 1,
                },
                ValidationError::InvalidAmount {
                    position: 4,
                    location: "Marina Walk".to_owned(),
                    value: "lots".to_owned(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn end_dates_follow_each_duration_and_fall_back_to_placeholder() {
        let (store, catalog) = fixtures();
        let expander = PackageExpander::new(&store, &catalog, &[], Duration::from_secs(5));
        let validator = Validator::new(&catalog, &expander);
        let mut undated = entry("marina walk", &["2 Weeks"], &["5000"]);
        undated.start_date = Some("sometime soon".to_owned());

        let validated = validator
            .validate(&request(
                ProposalMode::Separate,
                vec![entry("the gateway", &["4 Weeks", "8 Weeks"], &["AED 50,000", "AED 90,000"]), undated],
            ))
            .await
            .expect("valid request");

        let gateway = &validated.proposals[0];
        assert_eq!(gateway.key.as_str(), "the_gateway");
        assert_eq!(gateway.end_dates, vec!["29th December 2025", "26th January 2026"]);
        assert_eq!(gateway.net_rates, vec![Decimal::new(50_000, 0), Decimal::new(90_000, 0)]);
        assert_eq!(validated.proposals[1].end_dates, vec![END_DATE_PLACEHOLDER]);
        assert_eq!(validated.combined_rate, None);
    }

    #[tokio::test]
    async fn out_of_range_durations_yield_placeholder_end_dates() {
        let (store, catalog) = fixtures();
        let expander = PackageExpander::new(&store, &catalog, &[], Duration::from_secs(5));
        let validator = Validator::new(&catalog, &expander);

        let validated = validator
            .validate(&request(
                ProposalMode::Separate,
                vec![entry("the gateway", &["4 Weeks", "20000000 Weeks"], &["AED 50,000", "AED 90,000"])],
            ))
            .await
            .expect("valid request");

        assert_eq!(validated.proposals[0].end_dates, vec!["29th December 2025", END_DATE_PLACEHOLDER]);
    }

    #[tokio::test]
    async fn packages_resolve_when_no_location_matches() {
        let (store, catalog) = fixtures();
        let expander = PackageExpander::new(&store, &catalog, &[], Duration::from_secs(5));
        let validator = Validator::new(&catalog, &expander);
        let mut combined = request(ProposalMode::Combined, vec![entry("Mall Bundle", &["4 Weeks"], &[])]);
        combined.combined_net_rate = Some("AED 150,000".to_owned());

        let validated = validator.validate(&combined).await.expect("lone package is enough");

        assert!(validated.proposals[0].is_package());
        assert_eq!(validated.proposals[0].display_name, "Mall Bundle");
        assert_eq!(validated.combined_rate, Some(Decimal::new(150_000, 0)));
    }

    #[tokio::test]
    async fn combined_package_overlapping_a_selected_location_is_rejected() {
        let (store, catalog) = fixtures();
        let expander = PackageExpander::new(&store, &catalog, &[], Duration::from_secs(5));
        let validator = Validator::new(&catalog, &expander);
        let mut combined = request(
            ProposalMode::Combined,
            vec![entry("Mall Bundle", &["4 Weeks"], &[]), entry("Dubai Mall", &["4 Weeks"], &[])],
        );
        combined.combined_net_rate = Some("AED 150,000".to_owned());

        let errors = validator.validate(&combined).await.expect_err("overlap");

        assert_eq!(
            errors,
            vec![ValidationError::PackageOverlap {
                location: "Dubai Mall".to_owned(),
                package: "Mall Bundle".to_owned(),
            }]
        );
        assert!(errors[0].to_string().contains("`Dubai Mall` is already included in package `Mall Bundle`"));
    }

    #[tokio::test]
    async fn combined_requests_need_a_rate_and_two_locations() {
        let (store, catalog) = fixtures();
        let expander = PackageExpander::new(&store, &catalog, &[], Duration::from_secs(5));
        let validator = Validator::new(&catalog, &expander);

        let errors = validator
            .validate(&request(ProposalMode::Combined, vec![entry("The Gateway", &["4 Weeks"], &[])]))
            .await
            .expect_err("too few");

        assert_eq!(errors, vec![ValidationError::MissingCombinedRate, ValidationError::CombinedTooFew]);
        assert_eq!(
            validator.validate(&ProposalRequest::default()).await,
            Err(vec![ValidationError::EmptyRequest])
        );
    }
}
