//! Page-level PDF manipulation on top of `lopdf`.
//!
//! Both extraction and merging rebuild a flat page tree: every kept page is
//! re-parented under a fresh `Pages` node, with attributes it used to inherit
//! from its old ancestors copied onto the page itself.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use crate::document::DocumentError;

const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_TREE_DEPTH: usize = 64;

pub fn page_count(path: &Path) -> Result<usize, DocumentError> {
    Ok(load(path)?.get_pages().len())
}

/// Copies the pages at `indices` (zero-based) into `dest`, keeping document
/// order. Out-of-range indices are skipped.
pub fn extract_pages(source: &Path, indices: &[usize], dest: &Path) -> Result<PathBuf, DocumentError> {
    let document = load(source)?;
    let keep: BTreeSet<usize> = indices.iter().copied().collect();
    let flattened = flatten(document, Some(&keep));
    if flattened.pages.is_empty() {
        return Err(DocumentError::Empty { path: source.to_path_buf() });
    }
    save(assemble(vec![flattened]), dest)
}

/// Concatenates every page of every input, in input order. Any unreadable
/// input fails the whole merge.
pub fn merge_ordered(inputs: &[PathBuf], dest: &Path) -> Result<PathBuf, DocumentError> {
    if inputs.is_empty() {
        return Err(DocumentError::NothingToMerge);
    }

    let mut next_id = 1;
    let mut sources = Vec::with_capacity(inputs.len());
    for input in inputs {
        let mut document = load(input)?;
        document.renumber_objects_with(next_id);
        next_id = document.max_id + 1;
        sources.push(flatten(document, None));
    }
    save(assemble(sources), dest)
}

fn load(path: &Path) -> Result<Document, DocumentError> {
    Document::load(path).map_err(|error| DocumentError::unreadable(path, error))
}

fn save(mut document: Document, dest: &Path) -> Result<PathBuf, DocumentError> {
    document.save(dest).map_err(|error| DocumentError::write(dest, error))?;
    Ok(dest.to_path_buf())
}

struct Flattened {
    objects: BTreeMap<ObjectId, Object>,
    pages: Vec<(ObjectId, Dictionary)>,
    catalog: Option<Dictionary>,
}

fn object_type(object: &Object) -> Option<&[u8]> {
    let dictionary = match object {
        Object::Dictionary(dictionary) => dictionary,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dictionary.get(b"Type").and_then(Object::as_name).ok()
}

fn flatten(document: Document, keep: Option<&BTreeSet<usize>>) -> Flattened {
    let mut pages = Vec::new();
    for (index, page_id) in document.get_pages().into_values().enumerate() {
        if keep.is_some_and(|keep| !keep.contains(&index)) {
            continue;
        }
        if let Ok(page) = document.get_dictionary(page_id) {
            pages.push((page_id, with_inherited(&document, page)));
        }
    }

    let catalog = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .and_then(|root| document.get_dictionary(root))
        .ok()
        .cloned();

    let objects = document
        .objects
        .into_iter()
        .filter(|(_, object)| {
            !matches!(
                object_type(object),
                Some(b"Page" | b"Pages" | b"Catalog" | b"Outlines" | b"Outline")
            )
        })
        .collect();

    Flattened { objects, pages, catalog }
}

fn with_inherited(document: &Document, page: &Dictionary) -> Dictionary {
    let mut page = page.clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        if depth == MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = document.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    page
}

fn assemble(sources: Vec<Flattened>) -> Document {
    let highest = sources
        .iter()
        .flat_map(|source| {
            source.objects.keys().map(|id| id.0).chain(source.pages.iter().map(|(id, _)| id.0))
        })
        .max()
        .unwrap_or(0);
    let pages_id: ObjectId = (highest + 1, 0);
    let catalog_id: ObjectId = (highest + 2, 0);

    let mut document = Document::with_version("1.5");
    let mut kids = Vec::new();
    let mut catalog = None;

    for source in sources {
        if catalog.is_none() {
            catalog = source.catalog;
        }
        document.objects.extend(source.objects);
        for (page_id, mut page) in source.pages {
            page.set("Parent", pages_id);
            document.objects.insert(page_id, Object::Dictionary(page));
            kids.push(Object::Reference(page_id));
        }
    }

    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let mut catalog = catalog.unwrap_or_else(Dictionary::new);
    catalog.set("Type", "Catalog");
    catalog.set("Pages", pages_id);
    catalog.remove(b"Outlines");
    catalog.remove(b"PageLabels");
    document.objects.insert(catalog_id, Object::Dictionary(catalog));
    document.trailer.set("Root", catalog_id);
    document.max_id = catalog_id.0;
    document.prune_objects();
    document
}
