//! Synthetic documents and collaborators for exercising the pipeline
//! without LibreOffice or a real template bucket.
//!
//! Every generated PDF page carries one text marker, which is how tests
//! observe page order after extraction and merging.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use regex::Regex;
use rust_decimal::Decimal;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::document::convert::{pdf_sibling, ConversionError, DocumentConverter};
use crate::document::deck::escape;
use crate::document::{run_blocking, Deck, DocumentError};
use crate::domain::location::{LocationKey, LocationMetadata, StorageAddressing};
use crate::domain::proposal::{ProposalSubject, ValidatedProposal};

static HTML_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title>(.*?)</title>").expect("title pattern compiles"));

const SLIDE_LAYOUT_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";

/// Writes a PDF with one page per marker.
pub fn write_pdf(dir: &Path, name: &str, markers: &[&str]) -> Result<PathBuf, DocumentError> {
    let path = dir.join(name);
    let mut document = pdf_with_markers(markers)?;
    document.save(&path).map_err(|error| DocumentError::write(&path, error))?;
    Ok(path)
}

pub fn pdf_with_markers(markers: &[&str]) -> Result<Document, DocumentError> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::with_capacity(markers.len());
    for marker in markers {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*marker)]),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|error| DocumentError::write(Path::new(marker), error))?;
        let content_id = document.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    Ok(document)
}

/// The marker of every page, in page order.
pub fn page_markers(path: &Path) -> Result<Vec<String>, DocumentError> {
    let document = Document::load(path).map_err(|error| DocumentError::unreadable(path, error))?;
    document
        .get_pages()
        .into_values()
        .map(|page_id| {
            let bytes =
                document.get_page_content(page_id).map_err(|error| DocumentError::unreadable(path, error))?;
            let content = Content::decode(&bytes).map_err(|error| DocumentError::unreadable(path, error))?;
            Ok(content
                .operations
                .iter()
                .find(|operation| operation.operator == "Tj")
                .and_then(|operation| operation.operands.first())
                .and_then(|operand| operand.as_str().ok())
                .map(|text| String::from_utf8_lossy(text).into_owned())
                .unwrap_or_default())
        })
        .collect()
}

/// Writes a minimal PPTX whose slides each hold one text run.
pub fn write_deck(dir: &Path, name: &str, texts: &[&str]) -> Result<PathBuf, DocumentError> {
    let path = dir.join(name);
    let file = File::create(&path).map_err(|error| DocumentError::write(&path, error))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let mut parts: Vec<(String, String)> = Vec::new();
    let overrides: String = (1..=texts.len())
        .map(|number| {
            format!(
                "<Override PartName=\"/ppt/slides/slide{number}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slide+xml\"/>"
            )
        })
        .collect();
    parts.push((
        "[Content_Types].xml".to_owned(),
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"><Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/><Default Extension=\"xml\" ContentType=\"application/xml\"/><Override PartName=\"/ppt/presentation.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml\"/><Override PartName=\"/ppt/slideLayouts/slideLayout1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml\"/>{overrides}</Types>"
        ),
    ));

    let slide_ids: String = (1..=texts.len())
        .map(|number| format!("<p:sldId id=\"{}\" r:id=\"rId{}\"/>", 255 + number, number + 1))
        .collect();
    parts.push((
        "ppt/presentation.xml".to_owned(),
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<p:presentation xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\"><p:sldIdLst>{slide_ids}</p:sldIdLst><p:sldSz cx=\"12192000\" cy=\"6858000\"/></p:presentation>"
        ),
    ));

    let slide_rels: String = (1..=texts.len())
        .map(|number| {
            format!(
                "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide\" Target=\"slides/slide{number}.xml\"/>",
                number + 1
            )
        })
        .collect();
    parts.push((
        "ppt/_rels/presentation.xml.rels".to_owned(),
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"><Relationship Id=\"rId1\" Type=\"{SLIDE_LAYOUT_REL_TYPE}\" Target=\"slideLayouts/slideLayout1.xml\"/>{slide_rels}</Relationships>"
        ),
    ));

    for (offset, text) in texts.iter().enumerate() {
        let number = offset + 1;
        parts.push((
            format!("ppt/slides/slide{number}.xml"),
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<p:sld xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\"><p:cSld><p:spTree><p:sp><p:txBody><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                escape(text)
            ),
        ));
        parts.push((
            format!("ppt/slides/_rels/slide{number}.xml.rels"),
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"><Relationship Id=\"rId1\" Type=\"{SLIDE_LAYOUT_REL_TYPE}\" Target=\"../slideLayouts/slideLayout1.xml\"/></Relationships>"
            ),
        ));
    }
    parts.push((
        "ppt/slideLayouts/slideLayout1.xml".to_owned(),
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<p:sldLayout xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\"/>".to_owned(),
    ));

    for (name, body) in parts {
        writer.start_file(name, options).map_err(|error| DocumentError::write(&path, error))?;
        writer.write_all(body.as_bytes()).map_err(|error| DocumentError::write(&path, error))?;
    }
    writer.finish().map_err(|error| DocumentError::write(&path, error))?;
    Ok(path)
}

/// Converter double: an HTML summary becomes one page marked with its
/// `<title>`, a deck becomes one page per slide marked with the slide's
/// first text run.
#[derive(Clone, Debug, Default)]
pub struct MarkerConverter {
    conversions: Arc<Mutex<Vec<PathBuf>>>,
    fail_on: Option<String>,
}

impl MarkerConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every conversion whose input file name contains `fragment`.
    pub fn failing_on(fragment: &str) -> Self {
        Self { fail_on: Some(fragment.to_owned()), ..Self::default() }
    }

    pub fn conversions(&self) -> Vec<PathBuf> {
        match self.conversions.lock() {
            Ok(conversions) => conversions.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn conversion_count(&self) -> usize {
        self.conversions().len()
    }

    fn record(&self, input: &Path) {
        match self.conversions.lock() {
            Ok(mut conversions) => conversions.push(input.to_path_buf()),
            Err(poisoned) => poisoned.into_inner().push(input.to_path_buf()),
        }
    }
}

#[async_trait]
impl DocumentConverter for MarkerConverter {
    async fn convert(&self, input: &Path) -> Result<PathBuf, ConversionError> {
        self.record(input);
        let file_name = input.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        if self.fail_on.as_deref().is_some_and(|fragment| file_name.contains(fragment)) {
            return Err(ConversionError::Failed { status: 1, stderr: format!("cannot convert {file_name}") });
        }

        let input = input.to_path_buf();
        let output = pdf_sibling(&input);
        let failure = |error: DocumentError| ConversionError::Failed { status: 1, stderr: error.to_string() };
        run_blocking(move || {
            let markers = match input.extension().and_then(|ext| ext.to_str()) {
                Some("html") => {
                    let html =
                        std::fs::read_to_string(&input).map_err(|error| DocumentError::unreadable(&input, error))?;
                    let title = HTML_TITLE
                        .captures(&html)
                        .map(|captures| unescape_html(captures[1].trim()))
                        .unwrap_or_default();
                    vec![title]
                }
                Some("pptx") => Deck::open(&input)?.slide_titles()?,
                _ => return Err(DocumentError::unreadable(&input, "unsupported input")),
            };
            let markers: Vec<&str> = markers.iter().map(String::as_str).collect();
            let mut document = pdf_with_markers(&markers)?;
            document.save(&output).map_err(|error| DocumentError::write(&output, error))?;
            Ok(output)
        })
        .await
        .map_err(failure)
    }
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#x2F;", "/")
        .replace("&amp;", "&")
}

pub fn location_metadata(key: &str, display_name: &str) -> LocationMetadata {
    LocationMetadata {
        key: LocationKey::new(key),
        display_name: display_name.to_owned(),
        series: None,
        height: Some("4m".to_owned()),
        width: Some("12m".to_owned()),
        number_of_faces: 1,
        sov_percent: Decimal::new(125, 1),
        spot_duration_secs: 10,
        loop_duration_secs: 80,
        upload_fee: None,
        template: None,
        company: "backlite_dubai".to_owned(),
        storage: StorageAddressing::Standalone,
    }
}

/// A validated four-week booking at AED 50,000 starting 1st December 2025.
pub fn validated(index: usize, metadata: LocationMetadata) -> ValidatedProposal {
    ValidatedProposal {
        index,
        key: metadata.key.clone(),
        display_name: metadata.display_name.clone(),
        company: metadata.company.clone(),
        subject: ProposalSubject::Location(metadata),
        durations: vec!["4 Weeks".to_owned()],
        net_rates: vec![Decimal::new(50_000, 0)],
        spots: 1,
        start_date: "1st December 2025".to_owned(),
        end_dates: vec!["29th December 2025".to_owned()],
        production_fee: None,
        payment_terms: None,
    }
}

pub fn gateway_proposal() -> ValidatedProposal {
    let mut metadata = location_metadata("the_gateway", "The Gateway");
    metadata.upload_fee = Some(Decimal::new(3000, 0));
    validated(0, metadata)
}
