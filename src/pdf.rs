//! Shared lopdf helpers

use lopdf::{Dictionary, Document, Object, ObjectId};

/// US Letter, used when a page has no usable /MediaBox.
pub(crate) const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Attributes a page may inherit from its ancestors in the page tree.
pub(crate) const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guards against malformed page trees whose /Parent chain loops.
const MAX_TREE_DEPTH: usize = 64;

/// Numeric value of an Integer or Real object.
pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Follow a reference to the object it names. Non-references are returned as-is.
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

pub(crate) fn page_dict(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    doc.get_object(page_id).ok()?.as_dict().ok()
}

/// Look up `key` on the page, walking up /Parent links for inherited values.
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict = page_dict(doc, page_id)?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

/// Rectangle as `[llx, lly, urx, ury]`, normalized so that ll < ur.
pub(crate) fn rectangle(doc: &Document, object: &Object) -> Option<[f32; 4]> {
    let array = resolve(doc, object)?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0f32; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = number(resolve(doc, item)?)?;
    }
    let [x0, y0, x1, y1] = values;
    Some([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
}

pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|object| rectangle(doc, object))
        .filter(|[x0, y0, x1, y1]| x1 > x0 && y1 > y0)
        .unwrap_or(DEFAULT_MEDIA_BOX)
}

/// Inherited /Rotate normalized into {0, 90, 180, 270}.
pub(crate) fn rotation(doc: &Document, page_id: ObjectId) -> i32 {
    let raw = inherited(doc, page_id, b"Rotate")
        .and_then(|object| resolve(doc, object))
        .and_then(number)
        .map(|value| value as i32)
        .unwrap_or(0);
    normalize_rotation(raw)
}

/// Normalize a multiple of 90 into {0, 90, 180, 270}.
pub(crate) fn normalize_rotation(degrees: i32) -> i32 {
    (degrees - degrees % 90).rem_euclid(360)
}

/// Decode a PDF text string: UTF-16BE with BOM, else PDFDocEncoding as Latin-1.
pub(crate) fn text_string(object: &Object) -> Option<String> {
    let bytes = match object {
        Object::String(bytes, _) => bytes,
        _ => return None,
    };

    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return Some(String::from_utf8_lossy(utf8).into_owned());
    }

    Some(bytes.iter().map(|&b| b as char).collect())
}
