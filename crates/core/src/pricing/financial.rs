use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ProposalConfig;
use crate::pricing::format_amount;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub currency: String,
    pub vat_rate: Decimal,
    pub fallback_upload_fee: Decimal,
    pub municipality_fee: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            currency: "AED".to_string(),
            vat_rate: Decimal::new(5, 2),
            fallback_upload_fee: Decimal::new(3000, 0),
            municipality_fee: Decimal::new(520, 0),
        }
    }
}

impl From<&ProposalConfig> for PricingPolicy {
    fn from(config: &ProposalConfig) -> Self {
        Self {
            currency: config.currency.clone(),
            vat_rate: config.vat_rate,
            fallback_upload_fee: config.fallback_upload_fee,
            municipality_fee: config.municipality_fee,
        }
    }
}

impl PricingPolicy {
    pub fn with_currency(mut self, currency: Option<&str>) -> Self {
        if let Some(currency) = currency.map(str::trim).filter(|value| !value.is_empty()) {
            self.currency = currency.to_ascii_uppercase();
        }
        self
    }

    pub fn format(&self, amount: Decimal) -> String {
        format_amount(&self.currency, amount)
    }

    /// Fee added to every duration option of one proposal. An explicit
    /// production fee replaces the per-spot upload fees.
    pub fn fee_share(
        &self,
        production_fee: Option<Decimal>,
        upload_fees: &[Option<Decimal>],
        spots: u32,
    ) -> Decimal {
        if let Some(fee) = production_fee {
            return fee;
        }
        let per_spot: Decimal = upload_fees.iter().map(|fee| fee.unwrap_or_default()).sum();
        per_spot * Decimal::from(spots.max(1))
    }
}

/// Per-duration amounts for one location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPricing {
    pub currency: String,
    pub net_rates: Vec<Decimal>,
    pub fee_share: Decimal,
    pub vat_amounts: Vec<Decimal>,
    pub totals: Vec<Decimal>,
}

impl LocationPricing {
    pub fn formatted_net_rates(&self) -> Vec<String> {
        self.net_rates.iter().map(|amount| format_amount(&self.currency, *amount)).collect()
    }

    pub fn formatted_vat(&self) -> Vec<String> {
        self.vat_amounts.iter().map(|amount| format_amount(&self.currency, *amount)).collect()
    }

    pub fn formatted_totals(&self) -> Vec<String> {
        self.totals.iter().map(|amount| format_amount(&self.currency, *amount)).collect()
    }

    pub fn formatted_fee(&self) -> String {
        format_amount(&self.currency, self.fee_share)
    }

    /// Headline figure for the proposal: the first duration option.
    pub fn headline_total(&self) -> Decimal {
        self.totals.first().copied().unwrap_or_default()
    }
}

pub fn price_location(policy: &PricingPolicy, net_rates: &[Decimal], fee_share: Decimal) -> LocationPricing {
    let vat_amounts: Vec<Decimal> = net_rates.iter().map(|rate| *rate * policy.vat_rate).collect();
    let totals = net_rates
        .iter()
        .zip(&vat_amounts)
        .map(|(rate, vat)| *rate + *vat + fee_share)
        .collect();

    LocationPricing {
        currency: policy.currency.clone(),
        net_rates: net_rates.to_vec(),
        fee_share,
        vat_amounts,
        totals,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeLine {
    pub location: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedPricing {
    pub currency: String,
    pub net_rate: Decimal,
    pub upload_fees: Vec<FeeLine>,
    pub municipality_fee: Decimal,
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
}

impl CombinedPricing {
    pub fn formatted_total(&self) -> String {
        format_amount(&self.currency, self.total)
    }
}

/// `locations` pairs a display name with its catalog upload fee, when known.
pub fn price_combined(
    policy: &PricingPolicy,
    net_rate: Decimal,
    locations: &[(String, Option<Decimal>)],
) -> CombinedPricing {
    let upload_fees: Vec<FeeLine> = locations
        .iter()
        .map(|(location, fee)| FeeLine {
            location: location.clone(),
            amount: fee.unwrap_or(policy.fallback_upload_fee),
        })
        .collect();
    let fees: Decimal = upload_fees.iter().map(|line| line.amount).sum();
    let subtotal = net_rate + fees + policy.municipality_fee;
    let vat = subtotal * policy.vat_rate;

    CombinedPricing {
        currency: policy.currency.clone(),
        net_rate,
        upload_fees,
        municipality_fee: policy.municipality_fee,
        subtotal,
        vat,
        total: subtotal + vat,
    }
}
