//! Loaded, validated PDF documents

use crate::buffer::{BufferGuard, OwnedBuffer};
use crate::error::DocError;
use crate::pdf;
use lopdf::Document;
use serde::Serialize;
use std::path::Path;

/// Geometry of a single page, in PDF points.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Page number (1-indexed)
    pub number: u32,
    pub width: f32,
    pub height: f32,
    /// Page rotation in degrees (0, 90, 180, 270)
    pub rotation: i32,
}

/// Entries from the trailer /Info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
}

/// An immutable, validated PDF.
///
/// A handle only exists for documents that parsed and have at least one page.
/// Structural edits never touch a handle; they produce a new one.
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    buffer: OwnedBuffer,
    version: String,
    pages: Vec<PageInfo>,
    info: DocumentInfo,
}

impl DocumentHandle {
    /// Parse guarded bytes into a handle.
    pub fn load(buffer: OwnedBuffer) -> Result<Self, DocError> {
        let doc = parse(&buffer)?;

        let page_ids = doc.get_pages();
        if page_ids.is_empty() {
            return Err(DocError::Empty);
        }

        let pages = page_ids
            .iter()
            .map(|(&number, &page_id)| {
                let [x0, y0, x1, y1] = pdf::media_box(&doc, page_id);
                PageInfo {
                    number,
                    width: x1 - x0,
                    height: y1 - y0,
                    rotation: pdf::rotation(&doc, page_id),
                }
            })
            .collect::<Vec<_>>();

        let info = document_info(&doc);

        tracing::debug!(
            "Loaded PDF {}: {} pages, {} bytes",
            doc.version,
            pages.len(),
            buffer.len()
        );

        Ok(Self {
            version: doc.version.clone(),
            buffer,
            pages,
            info,
        })
    }

    /// Read a PDF from disk through the buffer guard.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocError> {
        let bytes = std::fs::read(path.as_ref())?;
        let buffer = BufferGuard::new().guard(&bytes)?;
        Self::load(buffer)
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn bytes(&self) -> &OwnedBuffer {
        &self.buffer
    }

    pub fn into_bytes(self) -> OwnedBuffer {
        self.buffer
    }

    /// PDF header version, e.g. "1.5".
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn pages(&self) -> &[PageInfo] {
        &self.pages
    }

    /// Page geometry for a 1-indexed page number.
    pub fn page(&self, number: u32) -> Option<&PageInfo> {
        let index = number.checked_sub(1)? as usize;
        self.pages.get(index)
    }

    pub fn info(&self) -> &DocumentInfo {
        &self.info
    }

    /// Parse a private working copy of the document.
    pub(crate) fn parse(&self) -> Result<Document, DocError> {
        parse(&self.buffer)
    }
}

fn parse(buffer: &OwnedBuffer) -> Result<Document, DocError> {
    let doc = match Document::load_mem(buffer) {
        Ok(doc) => doc,
        Err(e) => {
            if contains(buffer, b"/Encrypt") {
                return Err(DocError::Encrypted);
            }
            return Err(DocError::Corrupt(e.to_string()));
        }
    };

    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(DocError::Encrypted);
    }

    Ok(doc)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn document_info(doc: &Document) -> DocumentInfo {
    let Some(dict) = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|info| pdf::resolve_dict(doc, info))
    else {
        return DocumentInfo::default();
    };

    let field = |key: &[u8]| {
        dict.get(key)
            .ok()
            .and_then(|value| pdf::resolve(doc, value))
            .and_then(pdf::text_string)
            .filter(|value| !value.trim().is_empty())
    };

    DocumentInfo {
        title: field(b"Title"),
        author: field(b"Author"),
        creator: field(b"Creator"),
        producer: field(b"Producer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::guard;
    use lopdf::{dictionary, Object, StringFormat};

    fn build(page_count: usize, info: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for i in 0..page_count {
            let width = 612 + i as i64;
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), Object::Integer(width), 792.into()],
            });
            kids.push(Object::from(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        if info {
            let info_id = doc.add_object(dictionary! {
                "Title" => Object::String(b"Quarterly Report".to_vec(), StringFormat::Literal),
                "Author" => Object::String(b"  ".to_vec(), StringFormat::Literal),
            });
            doc.trailer.set("Info", info_id);
        }

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_load_reports_pages() {
        let handle = DocumentHandle::load(guard(&build(3, false)).unwrap()).unwrap();
        assert_eq!(handle.page_count(), 3);
        assert_eq!(handle.version(), "1.5");

        let second = handle.page(2).unwrap();
        assert_eq!(second.number, 2);
        assert_eq!(second.width, 613.0);
        assert_eq!(second.height, 792.0);
        assert_eq!(second.rotation, 0);

        assert!(handle.page(0).is_none());
        assert!(handle.page(4).is_none());
    }

    #[test]
    fn test_load_rejects_zero_pages() {
        let result = DocumentHandle::load(guard(&build(0, false)).unwrap());
        assert!(matches!(result, Err(DocError::Empty)));
    }

    #[test]
    fn test_load_rejects_garbage_body() {
        let bytes = b"%PDF-1.4\nthis is not a pdf body at all\n%%EOF\n";
        let result = DocumentHandle::load(guard(&bytes[..]).unwrap());
        assert!(matches!(
            result,
            Err(DocError::Corrupt(_)) | Err(DocError::Empty)
        ));
    }

    #[test]
    fn test_load_reads_info() {
        let handle = DocumentHandle::load(guard(&build(1, true)).unwrap()).unwrap();
        assert_eq!(handle.info().title.as_deref(), Some("Quarterly Report"));
        // Blank values are treated as absent
        assert_eq!(handle.info().author, None);
    }

    #[test]
    fn test_bytes_are_the_loaded_buffer() {
        let raw = build(1, false);
        let handle = DocumentHandle::load(guard(&raw).unwrap()).unwrap();
        assert_eq!(handle.bytes().as_bytes(), raw.as_slice());
    }
}
