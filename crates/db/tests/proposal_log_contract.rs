use std::sync::Arc;
use std::time::Duration;

use deckyard_core::document::ConversionGate;
use deckyard_core::fixtures::{location_metadata, write_pdf, MarkerConverter};
use deckyard_core::pricing::PricingPolicy;
use deckyard_core::proposal::{ProcessorSettings, ProposalProcessor};
use deckyard_core::store::{InMemoryTemplateStore, TemplateFormat};
use deckyard_core::{LocationEntry, ProposalMode, ProposalRequest};
use deckyard_db::{connect_with_settings, migrations, ProposalLogRepository, SqlProposalLogRepository};
use rust_decimal::Decimal;
use tempfile::TempDir;

#[tokio::test]
async fn generated_proposal_is_recorded_in_the_database() {
    let scratch = TempDir::new().expect("scratch");
    let output = TempDir::new().expect("output");
    let template = write_pdf(scratch.path(), "gateway", &["cover", "body", "close"]).expect("fixture pdf");

    let mut gateway = location_metadata("the_gateway", "The Gateway");
    gateway.upload_fee = Some(Decimal::new(3000, 0));
    let store = InMemoryTemplateStore::new().with_location(gateway).with_template(
        "the_gateway",
        TemplateFormat::Pdf,
        std::fs::read(template).expect("template bytes"),
    );

    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    let repository = Arc::new(SqlProposalLogRepository::new(pool));

    let settings = ProcessorSettings {
        output_dir: output.path().to_path_buf(),
        premium_series: "The Landmark Series".to_owned(),
        pricing: PricingPolicy::default(),
        fetch_timeout: Duration::from_secs(5),
        render_parallelism: 2,
        company_scopes: Vec::new(),
    };
    let gate = ConversionGate::new(Arc::new(MarkerConverter::new()), 2, Duration::from_secs(30));
    let processor = ProposalProcessor::new(Arc::new(store), gate, settings)
        .expect("processor")
        .with_proposal_log(repository.clone());

    let request = ProposalRequest {
        entries: vec![LocationEntry {
            location: "The Gateway".to_owned(),
            durations: vec!["4 Weeks".to_owned()],
            net_rates: vec!["AED 50,000".to_owned()],
            spots: 1,
            start_date: Some("1st December 2025".to_owned()),
            ..LocationEntry::default()
        }],
        mode: ProposalMode::Separate,
        client_name: Some("Emaar Properties".to_owned()),
        submitted_by: "U-42".to_owned(),
        ..ProposalRequest::default()
    };
    let outcome = processor.process(request).await.expect("proposal");

    let logged = repository
        .find_by_request_id(&outcome.request_id)
        .await
        .expect("lookup")
        .expect("proposal should be logged");
    assert_eq!(logged.submitted_by, "U-42");
    assert_eq!(logged.client_name, "Emaar Properties");
    assert_eq!(logged.package_type, "single");
    assert_eq!(logged.total_amount, "AED 55,500.00");
    assert_eq!(logged.filename, outcome.filename);
    assert!(logged.filename.starts_with("Emaar_Properties_"));
}
