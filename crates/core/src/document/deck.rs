//! Editable PPTX decks: slide listing, removal and summary-slide insertion.
//!
//! Slide order is defined by `<p:sldIdLst>` in `ppt/presentation.xml`; each
//! entry points through `ppt/_rels/presentation.xml.rels` at a slide part.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::document::DocumentError;

const PRESENTATION: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";
const CONTENT_TYPES: &str = "[Content_Types].xml";
const SLIDE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
const SLIDE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";

static SLIDE_ID_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<p:sldId\b[^>]*/>").expect("slide id pattern compiles"));
static NUMERIC_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sid="(\d+)""#).expect("numeric id pattern compiles"));
static REL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"r:id="([^"]+)""#).expect("relationship ref pattern compiles"));
static RELATIONSHIP_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<Relationship\b[^>]*>").expect("relationship pattern compiles")
});
static REL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sId="([^"]+)""#).expect("relationship id pattern compiles"));
static REL_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sTarget="([^"]+)""#).expect("target pattern compiles"));
static SLIDE_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("slide part pattern compiles")
});
static TEXT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<a:t>([^<]*)</a:t>").expect("text run pattern compiles"));

#[derive(Clone, Debug, PartialEq, Eq)]
struct SlideRef {
    tag: String,
    id: u32,
    rel_id: String,
    part: String,
}

/// An OOXML presentation held in memory until saved.
#[derive(Clone, Debug)]
pub struct Deck {
    path: PathBuf,
    entries: Vec<(String, Vec<u8>)>,
}

impl Deck {
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        let file = File::open(path).map_err(|error| DocumentError::unreadable(path, error))?;
        let mut archive =
            ZipArchive::new(file).map_err(|error| DocumentError::unreadable(path, error))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry =
                archive.by_index(index).map_err(|error| DocumentError::unreadable(path, error))?;
            if entry.is_dir() {
                continue;
            }
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes).map_err(|error| DocumentError::unreadable(path, error))?;
            entries.push((entry.name().to_string(), bytes));
        }

        let deck = Self { path: path.to_path_buf(), entries };
        deck.slides()?;
        Ok(deck)
    }

    pub fn slide_count(&self) -> Result<usize, DocumentError> {
        Ok(self.slides()?.len())
    }

    /// Visible text of each slide, in presentation order.
    pub fn slide_texts(&self) -> Result<Vec<String>, DocumentError> {
        self.slides()?
            .iter()
            .map(|slide| {
                let xml = self.text(&slide.part)?;
                Ok(TEXT_RUN
                    .captures_iter(&xml)
                    .map(|captures| unescape(&captures[1]))
                    .collect::<Vec<_>>()
                    .join(" "))
            })
            .collect()
    }

    /// First text run of each slide, empty for slides without text.
    pub fn slide_titles(&self) -> Result<Vec<String>, DocumentError> {
        self.slides()?
            .iter()
            .map(|slide| {
                let xml = self.text(&slide.part)?;
                Ok(TEXT_RUN.captures(&xml).map(|captures| unescape(&captures[1])).unwrap_or_default())
            })
            .collect()
    }

    /// Keeps only slides whose zero-based position satisfies `keep`.
    pub fn retain_slides<F>(&mut self, keep: F) -> Result<(), DocumentError>
    where
        F: Fn(usize) -> bool,
    {
        let slides = self.slides()?;
        let (kept, dropped): (Vec<_>, Vec<_>) =
            slides.into_iter().enumerate().partition(|(position, _)| keep(*position));
        if kept.is_empty() {
            return Err(DocumentError::malformed(&self.path, "every slide would be removed"));
        }

        for (_, slide) in dropped {
            self.remove_slide(&slide)?;
        }
        Ok(())
    }

    pub fn keep_first(&mut self) -> Result<(), DocumentError> {
        self.retain_slides(|position| position == 0)
    }

    pub fn keep_last(&mut self) -> Result<(), DocumentError> {
        let last = self.slide_count()?.saturating_sub(1);
        self.retain_slides(move |position| position == last)
    }

    pub fn remove_first_last(&mut self, remove_first: bool, remove_last: bool) -> Result<(), DocumentError> {
        let last = self.slide_count()?.saturating_sub(1);
        self.retain_slides(move |position| {
            !(remove_first && position == 0) && !(remove_last && position == last)
        })
    }

    /// Inserts a text slide so that it ends up at zero-based `position`
    /// (clamped to the end). The slide reuses the layout of the last slide.
    pub fn insert_summary_slide(
        &mut self,
        position: usize,
        title: &str,
        lines: &[String],
    ) -> Result<usize, DocumentError> {
        let slides = self.slides()?;
        let layout_source = slides
            .last()
            .ok_or_else(|| DocumentError::malformed(&self.path, "deck has no slides"))?;
        let layout_rel = self.layout_relationship(&layout_source.part)?;

        let number = self
            .entries
            .iter()
            .filter_map(|(name, _)| SLIDE_PART.captures(name).and_then(|caps| caps[1].parse::<u32>().ok()))
            .max()
            .unwrap_or(0)
            + 1;
        let part = format!("ppt/slides/slide{number}.xml");
        let part_rels = format!("ppt/slides/_rels/slide{number}.xml.rels");

        self.entries.push((part.clone(), summary_slide_xml(title, lines).into_bytes()));
        self.entries.push((
            part_rels,
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{layout_rel}</Relationships>"
            )
            .into_bytes(),
        ));

        let rels = self.text(PRESENTATION_RELS)?;
        let next_rel = RELATIONSHIP_TAG
            .find_iter(&rels)
            .filter_map(|tag| REL_ID.captures(tag.as_str()))
            .filter_map(|caps| caps[1].trim_start_matches("rId").parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let rel_id = format!("rId{next_rel}");
        let relationship = format!(
            "<Relationship Id=\"{rel_id}\" Type=\"{SLIDE_REL_TYPE}\" Target=\"slides/slide{number}.xml\"/>"
        );
        let rels = insert_before(&rels, "</Relationships>", &relationship)
            .ok_or_else(|| self.missing_anchor(PRESENTATION_RELS))?;
        self.set_text(PRESENTATION_RELS, rels);

        let slide_id = slides.iter().map(|slide| slide.id).max().unwrap_or(255).max(255) + 1;
        let tag = format!("<p:sldId id=\"{slide_id}\" r:id=\"{rel_id}\"/>");
        let presentation = self.text(PRESENTATION)?;
        let anchor = slides.get(position).map_or("</p:sldIdLst>", |slide| slide.tag.as_str());
        let updated = insert_before(&presentation, anchor, &tag)
            .ok_or_else(|| self.missing_anchor(PRESENTATION))?;
        self.set_text(PRESENTATION, updated);

        let content_types = self.text(CONTENT_TYPES)?;
        let override_tag = format!(
            "<Override PartName=\"/{part}\" ContentType=\"{SLIDE_CONTENT_TYPE}\"/>"
        );
        let content_types = insert_before(&content_types, "</Types>", &override_tag)
            .ok_or_else(|| self.missing_anchor(CONTENT_TYPES))?;
        self.set_text(CONTENT_TYPES, content_types);

        Ok(position.min(slides.len()))
    }

    pub fn save(&self, dest: &Path) -> Result<PathBuf, DocumentError> {
        let file = File::create(dest).map_err(|error| DocumentError::write(dest, error))?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, bytes) in &self.entries {
            writer
                .start_file(name.as_str(), options)
                .map_err(|error| DocumentError::write(dest, error))?;
            writer.write_all(bytes).map_err(|error| DocumentError::write(dest, error))?;
        }
        writer.finish().map_err(|error| DocumentError::write(dest, error))?;
        Ok(dest.to_path_buf())
    }

    fn slides(&self) -> Result<Vec<SlideRef>, DocumentError> {
        let presentation = self.text(PRESENTATION)?;
        let rels = self.text(PRESENTATION_RELS)?;

        SLIDE_ID_TAG
            .find_iter(&presentation)
            .map(|found| {
                let tag = found.as_str();
                let id = NUMERIC_ID
                    .captures(tag)
                    .and_then(|caps| caps[1].parse::<u32>().ok())
                    .ok_or_else(|| DocumentError::malformed(&self.path, format!("slide id missing in `{tag}`")))?;
                let rel_id = REL_REF
                    .captures(tag)
                    .map(|caps| caps[1].to_string())
                    .ok_or_else(|| DocumentError::malformed(&self.path, format!("relationship missing in `{tag}`")))?;
                let target = relationship_target(&rels, &rel_id).ok_or_else(|| {
                    DocumentError::malformed(&self.path, format!("relationship `{rel_id}` not found"))
                })?;
                Ok(SlideRef { tag: tag.to_string(), id, rel_id, part: resolve_part(&target) })
            })
            .collect()
    }

    fn remove_slide(&mut self, slide: &SlideRef) -> Result<(), DocumentError> {
        let presentation = self.text(PRESENTATION)?.replacen(&slide.tag, "", 1);
        self.set_text(PRESENTATION, presentation);

        let rels = self.text(PRESENTATION_RELS)?;
        let pruned = RELATIONSHIP_TAG
            .find_iter(&rels)
            .find(|tag| {
                REL_ID.captures(tag.as_str()).is_some_and(|caps| caps[1] == *slide.rel_id)
            })
            .map(|tag| rels.replacen(tag.as_str(), "", 1))
            .unwrap_or_else(|| rels.clone());
        self.set_text(PRESENTATION_RELS, pruned);

        let content_types = self.text(CONTENT_TYPES)?;
        let override_pattern = format!("<Override PartName=\"/{}\"", slide.part);
        let pruned = match content_types.find(&override_pattern) {
            Some(start) => match content_types[start..].find("/>") {
                Some(end) => {
                    let mut updated = content_types.clone();
                    updated.replace_range(start..start + end + 2, "");
                    updated
                }
                None => content_types,
            },
            None => content_types,
        };
        self.set_text(CONTENT_TYPES, pruned);

        let slide_rels = slide_rels_part(&slide.part);
        self.entries.retain(|(name, _)| *name != slide.part && *name != slide_rels);
        Ok(())
    }

    fn layout_relationship(&self, slide_part: &str) -> Result<String, DocumentError> {
        let rels = self.text(&slide_rels_part(slide_part))?;
        RELATIONSHIP_TAG
            .find_iter(&rels)
            .map(|tag| tag.as_str())
            .find(|tag| tag.contains("/slideLayout\""))
            .map(|tag| REL_ID.replace(tag, " Id=\"rId1\"").into_owned())
            .ok_or_else(|| DocumentError::malformed(&self.path, "last slide has no layout relationship"))
    }

    fn missing_anchor(&self, part: &str) -> DocumentError {
        DocumentError::malformed(&self.path, format!("part `{part}` has no insertion point"))
    }

    fn text(&self, name: &str) -> Result<String, DocumentError> {
        let bytes = self
            .entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, bytes)| bytes)
            .ok_or_else(|| DocumentError::malformed(&self.path, format!("missing part `{name}`")))?;
        String::from_utf8(bytes.clone())
            .map_err(|_| DocumentError::malformed(&self.path, format!("part `{name}` is not UTF-8")))
    }

    fn set_text(&mut self, name: &str, text: String) {
        match self.entries.iter_mut().find(|(entry, _)| entry == name) {
            Some((_, bytes)) => *bytes = text.into_bytes(),
            None => self.entries.push((name.to_string(), text.into_bytes())),
        }
    }
}

fn relationship_target(rels: &str, rel_id: &str) -> Option<String> {
    RELATIONSHIP_TAG.find_iter(rels).find_map(|tag| {
        let id = REL_ID.captures(tag.as_str())?;
        if &id[1] != rel_id {
            return None;
        }
        REL_TARGET.captures(tag.as_str()).map(|caps| caps[1].to_string())
    })
}

fn resolve_part(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{target}"),
    }
}

fn slide_rels_part(slide_part: &str) -> String {
    match slide_part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{slide_part}.rels"),
    }
}

fn insert_before(haystack: &str, anchor: &str, insertion: &str) -> Option<String> {
    let index = haystack.find(anchor)?;
    let mut updated = String::with_capacity(haystack.len() + insertion.len());
    updated.push_str(&haystack[..index]);
    updated.push_str(insertion);
    updated.push_str(&haystack[index..]);
    Some(updated)
}

pub(crate) fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn summary_slide_xml(title: &str, lines: &[String]) -> String {
    let paragraphs: String = lines
        .iter()
        .map(|line| format!("<a:p><a:r><a:rPr lang=\"en-US\" sz=\"1800\"/><a:t>{}</a:t></a:r></a:p>", escape(line)))
        .collect();

    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
            "<p:sld xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" ",
            "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" ",
            "xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\">",
            "<p:cSld><p:spTree>",
            "<p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>",
            "<p:sp><p:nvSpPr><p:cNvPr id=\"2\" name=\"Summary Title\"/><p:cNvSpPr txBox=\"1\"/><p:nvPr/></p:nvSpPr>",
            "<p:spPr><a:xfrm><a:off x=\"457200\" y=\"274638\"/><a:ext cx=\"8229600\" cy=\"1143000\"/></a:xfrm>",
            "<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></p:spPr>",
            "<p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:r><a:rPr lang=\"en-US\" sz=\"3200\" b=\"1\"/><a:t>{title}</a:t></a:r></a:p></p:txBody></p:sp>",
            "<p:sp><p:nvSpPr><p:cNvPr id=\"3\" name=\"Summary Body\"/><p:cNvSpPr txBox=\"1\"/><p:nvPr/></p:nvSpPr>",
            "<p:spPr><a:xfrm><a:off x=\"457200\" y=\"1600200\"/><a:ext cx=\"8229600\" cy=\"4525963\"/></a:xfrm>",
            "<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></p:spPr>",
            "<p:txBody><a:bodyPr/><a:lstStyle/>{body}</p:txBody></p:sp>",
            "</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"
        ),
        title = escape(title),
        body = paragraphs,
    )
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::document::deck::Deck;
    use crate::document::DocumentError;
    use crate::fixtures::write_deck;

    #[test]
    fn slides_follow_presentation_order() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_deck(dir.path(), "deck.pptx", &["intro", "body", "closing"]).expect("fixture deck");

        let deck = Deck::open(&path).expect("open");
        assert_eq!(deck.slide_count().expect("count"), 3);
        assert_eq!(deck.slide_texts().expect("texts"), vec!["intro", "body", "closing"]);
    }

    #[test]
    fn remove_first_last_strips_boundary_slides() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_deck(dir.path(), "deck.pptx", &["intro", "map", "specs", "closing"]).expect("fixture deck");

        let mut deck = Deck::open(&path).expect("open");
        deck.remove_first_last(true, true).expect("strip");
        let saved = deck.save(&dir.path().join("stripped.pptx")).expect("save");

        let reopened = Deck::open(&saved).expect("reopen");
        assert_eq!(reopened.slide_texts().expect("texts"), vec!["map", "specs"]);
    }

    #[test]
    fn keep_first_and_keep_last_isolate_single_slides() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_deck(dir.path(), "deck.pptx", &["intro", "body", "closing"]).expect("fixture deck");

        let mut intro = Deck::open(&path).expect("open");
        intro.keep_first().expect("keep first");
        assert_eq!(intro.slide_texts().expect("texts"), vec!["intro"]);

        let mut outro = Deck::open(&path).expect("open");
        outro.keep_last().expect("keep last");
        assert_eq!(outro.slide_texts().expect("texts"), vec!["closing"]);
    }

    #[test]
    fn summary_slide_lands_second_to_last() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_deck(dir.path(), "deck.pptx", &["intro", "body", "closing"]).expect("fixture deck");

        let mut deck = Deck::open(&path).expect("open");
        let position = deck
            .insert_summary_slide(2, "Financial Summary", &["Net rate: AED 50,000.00 & more".to_owned()])
            .expect("insert");
        let saved = deck.save(&dir.path().join("with-summary.pptx")).expect("save");

        let reopened = Deck::open(&saved).expect("reopen");
        let texts = reopened.slide_texts().expect("texts");
        assert_eq!(position, 2);
        assert_eq!(texts.len(), 4);
        assert_eq!(texts[2], "Financial Summary Net rate: AED 50,000.00 & more");
        assert_eq!(texts[3], "closing");
    }

    #[test]
    fn removing_every_slide_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_deck(dir.path(), "deck.pptx", &["only"]).expect("fixture deck");

        let mut deck = Deck::open(&path).expect("open");
        let error = deck.remove_first_last(true, false).expect_err("nothing left");
        assert!(matches!(error, DocumentError::MalformedDeck { .. }));
    }
}
