//! Opening and closing pages that bracket a multi-location document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::document::{discard, extract_pages, page_count, run_blocking, ConversionGate, Deck};
use crate::domain::location::LocationKey;
use crate::domain::proposal::ValidatedProposal;
use crate::errors::RenderCause;
use crate::store::{normalize_name, with_timeout, TemplateFormat, TemplateStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntroOutroSelection {
    pub index: usize,
    pub source: LocationKey,
    pub series: Option<String>,
    pub is_premium: bool,
    /// Name of the pre-authored asset and the cache key.
    pub asset_name: String,
    pub template_key: String,
    pub company: String,
}

/// First proposal in the premium series wins, otherwise the first proposal.
pub fn select(proposals: &[ValidatedProposal], premium_series: &str) -> Option<IntroOutroSelection> {
    let premium = proposals.iter().find(|proposal| {
        proposal
            .metadata()
            .and_then(|metadata| metadata.series.as_deref())
            .is_some_and(|series| series.trim().eq_ignore_ascii_case(premium_series.trim()))
    });
    let is_premium = premium.is_some();
    let chosen = premium.or_else(|| proposals.first())?;
    let metadata = chosen.metadata()?;

    let asset_name = match (&metadata.series, is_premium) {
        (Some(series), true) => normalize_name(series).replace(' ', "_"),
        _ => metadata.key.as_str().to_owned(),
    };
    Some(IntroOutroSelection {
        index: chosen.index,
        source: metadata.key.clone(),
        series: metadata.series.clone(),
        is_premium,
        asset_name,
        template_key: metadata.template_key().to_owned(),
        company: metadata.company.clone(),
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntroOutroPages {
    pub intro: PathBuf,
    pub outro: PathBuf,
}

impl IntroOutroPages {
    async fn exists(&self) -> bool {
        for path in [&self.intro, &self.outro] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return false;
            }
        }
        true
    }
}

/// Where intro/outro pages come from.
pub struct IntroOutroSource<'a> {
    pub store: &'a dyn TemplateStore,
    pub gate: &'a ConversionGate,
    pub fetch_timeout: Duration,
}

impl IntroOutroSource<'_> {
    /// Pre-authored asset first, then the location's PDF template, then its
    /// editable deck. `None` when the location has none of them.
    async fn materialize(
        &self,
        selection: &IntroOutroSelection,
        dest_dir: &Path,
    ) -> Result<Option<IntroOutroPages>, RenderCause> {
        let company = Some(selection.company.as_str());

        let asset = with_timeout(
            self.fetch_timeout,
            "intro/outro asset download",
            self.store.download_intro_outro_asset(&selection.asset_name, company, dest_dir),
        )
        .await?;
        if let Some(asset) = asset {
            if let Some(pages) = split_pdf(&asset, &selection.asset_name, dest_dir).await? {
                return Ok(Some(pages));
            }
        }

        let template = with_timeout(
            self.fetch_timeout,
            "template download",
            self.store.download_template(&selection.template_key, company, TemplateFormat::Pdf, dest_dir),
        )
        .await?;
        if let Some(template) = template {
            if let Some(pages) = split_pdf(&template, &selection.asset_name, dest_dir).await? {
                return Ok(Some(pages));
            }
        }

        let deck = with_timeout(
            self.fetch_timeout,
            "template download",
            self.store.download_template(&selection.template_key, company, TemplateFormat::Deck, dest_dir),
        )
        .await?;
        match deck {
            Some(deck) => {
                let result = self.split_deck(&deck, &selection.asset_name, dest_dir).await;
                discard(&deck).await;
                result.map(Some)
            }
            None => Ok(None),
        }
    }

    async fn split_deck(
        &self,
        deck: &Path,
        name: &str,
        dest_dir: &Path,
    ) -> Result<IntroOutroPages, RenderCause> {
        let source = deck.to_path_buf();
        let intro_deck = dest_dir.join(format!("intro_{name}.pptx"));
        let outro_deck = dest_dir.join(format!("outro_{name}.pptx"));
        let (intro_target, outro_target) = (intro_deck.clone(), outro_deck.clone());
        run_blocking(move || {
            let mut intro = Deck::open(&source)?;
            intro.keep_first()?;
            intro.save(&intro_target)?;
            let mut outro = Deck::open(&source)?;
            outro.keep_last()?;
            outro.save(&outro_target)?;
            Ok(())
        })
        .await?;

        let intro = self.gate.convert(&intro_deck).await;
        discard(&intro_deck).await;
        let outro = self.gate.convert(&outro_deck).await;
        discard(&outro_deck).await;
        match (intro, outro) {
            (Ok(intro), Ok(outro)) => Ok(IntroOutroPages { intro, outro }),
            (Err(error), other) | (other, Err(error)) => {
                if let Ok(converted) = other {
                    discard(&converted).await;
                }
                Err(error.into())
            }
        }
    }
}

/// Extracts the first and last page of a PDF with at least two pages. The
/// source is always consumed.
async fn split_pdf(source: &Path, name: &str, dest_dir: &Path) -> Result<Option<IntroOutroPages>, RenderCause> {
    let source_path = source.to_path_buf();
    let intro = dest_dir.join(format!("intro_{name}.pdf"));
    let outro = dest_dir.join(format!("outro_{name}.pdf"));
    let pages = IntroOutroPages { intro: intro.clone(), outro: outro.clone() };

    let result = run_blocking(move || {
        let count = page_count(&source_path)?;
        if count < 2 {
            return Ok(false);
        }
        extract_pages(&source_path, &[0], &intro)?;
        extract_pages(&source_path, &[count - 1], &outro)?;
        Ok(true)
    })
    .await;
    discard(source).await;

    match result? {
        true => Ok(Some(pages)),
        false => {
            debug!(event_name = "intro_outro.too_short", source = %source.display(), "source has fewer than two pages");
            Ok(None)
        }
    }
}

/// Request-scoped cache of materialized intro/outro pages, keyed by the
/// selection's asset name. Entries whose files are gone are rebuilt.
#[derive(Debug, Default)]
pub struct IntroOutroCache {
    entries: Mutex<HashMap<String, IntroOutroPages>>,
    materializations: AtomicUsize,
}

impl IntroOutroCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn materializations(&self) -> usize {
        self.materializations.load(Ordering::SeqCst)
    }

    pub async fn pages(
        &self,
        selection: &IntroOutroSelection,
        source: &IntroOutroSource<'_>,
        dest_dir: &Path,
    ) -> Result<Option<IntroOutroPages>, RenderCause> {
        let mut entries = self.entries.lock().await;
        if let Some(cached) = entries.get(&selection.asset_name) {
            if cached.exists().await {
                debug!(event_name = "intro_outro.cache_hit", asset = %selection.asset_name, "reusing intro/outro pages");
                return Ok(Some(cached.clone()));
            }
            debug!(event_name = "intro_outro.cache_stale", asset = %selection.asset_name, "cached intro/outro pages are gone");
            entries.remove(&selection.asset_name);
        }

        let pages = source.materialize(selection, dest_dir).await?;
        self.materializations.fetch_add(1, Ordering::SeqCst);
        match &pages {
            Some(pages) => {
                info!(
                    event_name = "intro_outro.materialized",
                    asset = %selection.asset_name,
                    source = %selection.source,
                    premium = selection.is_premium,
                    "intro/outro pages ready"
                );
                entries.insert(selection.asset_name.clone(), pages.clone());
            }
            None => warn!(
                event_name = "intro_outro.unavailable",
                asset = %selection.asset_name,
                source = %selection.source,
                "no intro/outro source found; continuing without bracketing pages"
            ),
        }
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::document::ConversionGate;
    use crate::fixtures::{location_metadata, page_markers, pdf_with_markers, validated, write_deck, MarkerConverter};
    use crate::proposal::intro_outro::{select, IntroOutroCache, IntroOutroSource};
    use crate::store::{InMemoryTemplateStore, TemplateFormat};

    fn pdf_bytes(markers: &[&str]) -> Vec<u8> {
        let mut document = pdf_with_markers(markers).expect("pdf");
        let mut bytes = Vec::new();
        document.save_to(&mut bytes).expect("save");
        bytes
    }

    #[test]
    fn premium_series_wins_over_earlier_proposals() {
        let plain = location_metadata("marina_walk", "Marina Walk");
        let mut premium = location_metadata("the_gateway", "The Gateway");
        premium.series = Some("The Landmark Series".to_owned());

        let selection =
            select(&[validated(0, plain), validated(1, premium)], "The Landmark Series").expect("selection");

        assert_eq!(selection.source.as_str(), "the_gateway");
        assert!(selection.is_premium);
        assert_eq!(selection.asset_name, "the_landmark_series");
        assert_eq!(selection.index, 1);
    }

    #[test]
    fn first_proposal_is_the_fallback_and_empty_input_selects_nothing() {
        let selection = select(
            &[validated(0, location_metadata("marina_walk", "Marina Walk"))],
            "The Landmark Series",
        )
        .expect("fallback");
        assert!(!selection.is_premium);
        assert_eq!(selection.asset_name, "marina_walk");
        assert_eq!(select(&[], "The Landmark Series"), None);
    }

    #[tokio::test]
    async fn pre_authored_asset_is_extracted_once_per_request() {
        let dir = TempDir::new().expect("temp dir");
        let store = InMemoryTemplateStore::new()
            .with_intro_outro_asset("the_landmark_series", pdf_bytes(&["landmark intro", "filler", "landmark outro"]));
        let converter = Arc::new(MarkerConverter::new());
        let gate = ConversionGate::new(converter.clone(), 2, Duration::from_secs(5));
        let source = IntroOutroSource { store: &store, gate: &gate, fetch_timeout: Duration::from_secs(5) };
        let mut metadata = location_metadata("the_gateway", "The Gateway");
        metadata.series = Some("The Landmark Series".to_owned());
        let selection = select(&[validated(0, metadata)], "The Landmark Series").expect("selection");
        let cache = IntroOutroCache::new();

        let first = cache.pages(&selection, &source, dir.path()).await.expect("pages").expect("available");
        let second = cache.pages(&selection, &source, dir.path()).await.expect("pages").expect("available");

        assert_eq!(first, second);
        assert_eq!(cache.materializations(), 1);
        assert_eq!(store.download_count("asset:the_landmark_series"), 1);
        assert_eq!(page_markers(&first.intro).expect("markers"), vec!["landmark intro"]);
        assert_eq!(page_markers(&first.outro).expect("markers"), vec!["landmark outro"]);
        assert_eq!(converter.conversion_count(), 0);
    }

    #[tokio::test]
    async fn deleted_cache_entry_is_rebuilt() {
        let dir = TempDir::new().expect("temp dir");
        let store = InMemoryTemplateStore::new()
            .with_intro_outro_asset("marina_walk", pdf_bytes(&["intro", "outro"]));
        let gate = ConversionGate::new(Arc::new(MarkerConverter::new()), 2, Duration::from_secs(5));
        let source = IntroOutroSource { store: &store, gate: &gate, fetch_timeout: Duration::from_secs(5) };
        let selection =
            select(&[validated(0, location_metadata("marina_walk", "Marina Walk"))], "The Landmark Series")
                .expect("selection");
        let cache = IntroOutroCache::new();

        let first = cache.pages(&selection, &source, dir.path()).await.expect("pages").expect("available");
        std::fs::remove_file(&first.intro).expect("delete");
        let second = cache.pages(&selection, &source, dir.path()).await.expect("pages").expect("available");

        assert_eq!(cache.materializations(), 2);
        assert!(second.intro.exists());
        assert_eq!(store.download_count("asset:marina_walk"), 2);
    }

    #[tokio::test]
    async fn deck_template_is_split_and_converted_when_no_pdf_exists() {
        let dir = TempDir::new().expect("temp dir");
        let decks = TempDir::new().expect("temp dir");
        let deck = write_deck(decks.path(), "marina.pptx", &["marina cover", "map", "marina closing"])
            .expect("fixture deck");
        let store = InMemoryTemplateStore::new().with_template(
            "marina_walk",
            TemplateFormat::Deck,
            std::fs::read(deck).expect("deck bytes"),
        );
        let converter = Arc::new(MarkerConverter::new());
        let gate = ConversionGate::new(converter.clone(), 2, Duration::from_secs(5));
        let source = IntroOutroSource { store: &store, gate: &gate, fetch_timeout: Duration::from_secs(5) };
        let selection =
            select(&[validated(0, location_metadata("marina_walk", "Marina Walk"))], "The Landmark Series")
                .expect("selection");

        let pages = IntroOutroCache::new()
            .pages(&selection, &source, dir.path())
            .await
            .expect("pages")
            .expect("available");

        assert_eq!(page_markers(&pages.intro).expect("markers"), vec!["marina cover"]);
        assert_eq!(page_markers(&pages.outro).expect("markers"), vec!["marina closing"]);
        assert_eq!(converter.conversion_count(), 2);
    }

    #[tokio::test]
    async fn missing_sources_mean_no_bracketing() {
        let dir = TempDir::new().expect("temp dir");
        let store = InMemoryTemplateStore::new();
        let gate = ConversionGate::new(Arc::new(MarkerConverter::new()), 1, Duration::from_secs(5));
        let source = IntroOutroSource { store: &store, gate: &gate, fetch_timeout: Duration::from_secs(5) };
        let selection =
            select(&[validated(0, location_metadata("marina_walk", "Marina Walk"))], "The Landmark Series")
                .expect("selection");

        let pages = IntroOutroCache::new().pages(&selection, &source, dir.path()).await.expect("pages");
        assert_eq!(pages, None);
    }
}
