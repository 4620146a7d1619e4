//! Structural PDF edits: merge, split, rotate, page extraction and removal
//!
//! Every operation parses a private working copy of its inputs, serializes the
//! result, and sends the bytes back through the buffer guard before loading
//! them as a new [`DocumentHandle`]. Inputs are never modified.

use crate::buffer::{guard, OwnedBuffer};
use crate::document::DocumentHandle;
use crate::error::EditError;
use crate::pdf;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// Output of [`merge`].
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub buffer: OwnedBuffer,
    pub page_count: u32,
}

/// Output of [`split`]: pages `[1, at]` and `[at + 1, N]`.
#[derive(Debug, Clone)]
pub struct SplitResult {
    pub first: OwnedBuffer,
    pub first_page_count: u32,
    pub second: OwnedBuffer,
    pub second_page_count: u32,
}

/// Concatenate the pages of `docs` in order.
#[instrument(skip(docs), fields(inputs = docs.len()))]
pub fn merge(docs: &[DocumentHandle]) -> Result<MergeResult, EditError> {
    let first = docs.first().ok_or(EditError::NoInputs)?;

    let version = docs
        .iter()
        .map(|doc| doc.version())
        .max()
        .unwrap_or(first.version());
    let mut assembler = Assembler::new(version);

    for doc in docs {
        let source = working_copy(doc)?;
        let page_ids = source.get_pages().into_values().collect::<Vec<_>>();
        assembler.append(&source, &page_ids);
    }

    let merged = assembler.finish()?;
    tracing::info!(
        "Merged {} documents into {} pages",
        docs.len(),
        merged.page_count()
    );

    Ok(MergeResult {
        page_count: merged.page_count(),
        buffer: merged.into_bytes(),
    })
}

/// Split after page `at`. Both halves must be non-empty.
#[instrument(skip(doc), fields(pages = doc.page_count()))]
pub fn split(doc: &DocumentHandle, at: u32) -> Result<SplitResult, EditError> {
    let page_count = doc.page_count();
    if page_count < 2 || at < 1 || at >= page_count {
        return Err(EditError::InvalidSplitPoint { at, page_count });
    }

    let first_pages = (1..=at).collect::<Vec<_>>();
    let second_pages = (at + 1..=page_count).collect::<Vec<_>>();

    let first = extract_pages(doc, &first_pages)?;
    let second = extract_pages(doc, &second_pages)?;

    tracing::info!(
        "Split {} pages at {}: {} + {}",
        page_count,
        at,
        first.page_count(),
        second.page_count()
    );

    Ok(SplitResult {
        first_page_count: first.page_count(),
        first: first.into_bytes(),
        second_page_count: second.page_count(),
        second: second.into_bytes(),
    })
}

/// Rotate one page clockwise by `degrees`, relative to its current rotation.
#[instrument(skip(doc), fields(pages = doc.page_count()))]
pub fn rotate(doc: &DocumentHandle, page: u32, degrees: i32) -> Result<DocumentHandle, EditError> {
    if degrees % 90 != 0 {
        return Err(EditError::InvalidRotation(degrees));
    }
    check_page(doc, page)?;

    let mut working = working_copy(doc)?;
    let page_id = page_id(&working, page)?;

    let current = pdf::rotation(&working, page_id);
    let rotation = pdf::normalize_rotation(current + pdf::normalize_rotation(degrees));

    working
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| EditError::Pdf(format!("Page {} is not a dictionary: {}", page, e)))?
        .set("Rotate", Object::Integer(rotation as i64));

    let rotated = reload(&mut working)?;
    tracing::info!("Rotated page {} from {} to {} degrees", page, current, rotation);
    Ok(rotated)
}

/// New document holding the listed pages (1-indexed) in the given order.
#[instrument(skip(doc), fields(pages = doc.page_count()))]
pub fn extract_pages(doc: &DocumentHandle, pages: &[u32]) -> Result<DocumentHandle, EditError> {
    if pages.is_empty() {
        return Err(EditError::EmptySelection);
    }
    for &page in pages {
        check_page(doc, page)?;
    }

    let source = working_copy(doc)?;
    let page_ids = pages
        .iter()
        .map(|&page| page_id(&source, page))
        .collect::<Result<Vec<_>, _>>()?;

    let mut assembler = Assembler::new(doc.version());
    assembler.append(&source, &page_ids);
    let extracted = assembler.finish()?;

    tracing::debug!(
        "Extracted {} of {} pages",
        extracted.page_count(),
        doc.page_count()
    );
    Ok(extracted)
}

/// New document without the listed pages (1-indexed).
#[instrument(skip(doc), fields(pages = doc.page_count()))]
pub fn remove_pages(doc: &DocumentHandle, pages: &[u32]) -> Result<DocumentHandle, EditError> {
    for &page in pages {
        check_page(doc, page)?;
    }

    let removed = pages.iter().copied().collect::<HashSet<u32>>();
    let kept = (1..=doc.page_count())
        .filter(|page| !removed.contains(page))
        .collect::<Vec<_>>();
    if kept.is_empty() {
        return Err(EditError::EmptySelection);
    }

    extract_pages(doc, &kept)
}

fn check_page(doc: &DocumentHandle, page: u32) -> Result<(), EditError> {
    let total = doc.page_count();
    if page < 1 || page > total {
        return Err(EditError::PageOutOfRange { page, total });
    }
    Ok(())
}

fn working_copy(doc: &DocumentHandle) -> Result<Document, EditError> {
    doc.parse().map_err(|e| EditError::Pdf(e.to_string()))
}

fn page_id(doc: &Document, page: u32) -> Result<ObjectId, EditError> {
    doc.get_pages()
        .get(&page)
        .copied()
        .ok_or_else(|| EditError::Pdf(format!("Page {} not found in page tree", page)))
}

/// Serialize, guard and load the edited document.
fn reload(doc: &mut Document) -> Result<DocumentHandle, EditError> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| EditError::Pdf(format!("Failed to serialize PDF: {}", e)))?;
    let buffer = guard(&bytes)?;
    Ok(DocumentHandle::load(buffer)?)
}

/// Builds a fresh document out of pages cloned from one or more sources.
struct Assembler {
    target: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Assembler {
    fn new(version: &str) -> Self {
        let mut target = Document::with_version(version);
        let pages_id = target.new_object_id();
        Self {
            target,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Append deep copies of `page_ids` from `source`, in order.
    fn append(&mut self, source: &Document, page_ids: &[ObjectId]) {
        let mut cloner = Cloner::new(source);

        // Selected pages get their ids up front so links between them survive.
        let mut planned = Vec::with_capacity(page_ids.len());
        for &page_id in page_ids {
            let new_id = self.target.new_object_id();
            cloner.memo.entry(page_id).or_insert(new_id);
            planned.push((page_id, new_id));
        }

        for (page_id, new_id) in planned {
            let mut page = cloner.page(&mut self.target, page_id);
            page.set("Parent", Object::Reference(self.pages_id));
            self.target.objects.insert(new_id, Object::Dictionary(page));
            self.kids.push(Object::Reference(new_id));
        }
    }

    fn finish(mut self) -> Result<DocumentHandle, EditError> {
        let count = self.kids.len() as i64;
        self.target.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.target.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.target.trailer.set("Root", Object::Reference(catalog_id));

        reload(&mut self.target)
    }
}

/// Memoized deep copy of objects from one source document.
struct Cloner<'a> {
    source: &'a Document,
    /// Every leaf page in the source. References to pages that are not
    /// being copied become null.
    source_pages: HashSet<ObjectId>,
    /// Source object id to target object id.
    memo: HashMap<ObjectId, ObjectId>,
}

impl<'a> Cloner<'a> {
    fn new(source: &'a Document) -> Self {
        Self {
            source,
            source_pages: source.get_pages().into_values().collect(),
            memo: HashMap::new(),
        }
    }

    /// Copy of the page dictionary with inherited attributes folded in and no
    /// /Parent.
    fn page(&mut self, target: &mut Document, page_id: ObjectId) -> Dictionary {
        let source = self.source;
        let Some(original) = pdf::page_dict(source, page_id) else {
            tracing::warn!("Page object {:?} is not a dictionary", page_id);
            return dictionary! { "Type" => "Page" };
        };

        let mut page = Dictionary::new();
        for (key, value) in original.iter() {
            if key == b"Parent" {
                continue;
            }
            page.set(key.clone(), self.copy(target, value));
        }

        for key in pdf::INHERITABLE_KEYS {
            if page.has(key) {
                continue;
            }
            if let Some(value) = pdf::inherited(source, page_id, key) {
                page.set(key.to_vec(), self.copy(target, value));
            }
        }

        page
    }

    fn copy(&mut self, target: &mut Document, object: &Object) -> Object {
        match object {
            Object::Reference(id) => self.copy_reference(target, *id),
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dict(target, dict)),
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.copy(target, item)).collect())
            }
            Object::Stream(stream) => {
                let mut copy = stream.clone();
                copy.dict = self.copy_dict(target, &stream.dict);
                Object::Stream(copy)
            }
            other => other.clone(),
        }
    }

    fn copy_dict(&mut self, target: &mut Document, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            copy.set(key.clone(), self.copy(target, value));
        }
        copy
    }

    fn copy_reference(&mut self, target: &mut Document, id: ObjectId) -> Object {
        if let Some(&new_id) = self.memo.get(&id) {
            return Object::Reference(new_id);
        }
        if self.source_pages.contains(&id) {
            return Object::Null;
        }

        let source = self.source;
        let object = match source.get_object(id) {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!("Cannot resolve reference {:?}, using null: {}", id, e);
                return Object::Null;
            }
        };
        if is_page_tree_node(object) {
            return Object::Null;
        }

        // Reserve the id before descending so cycles resolve to it.
        let new_id = target.new_object_id();
        self.memo.insert(id, new_id);
        let copy = self.copy(target, object);
        target.objects.insert(new_id, copy);
        Object::Reference(new_id)
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
        .is_some_and(|t| t == b"Pages")
}
