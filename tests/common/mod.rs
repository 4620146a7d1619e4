//! PDF fixtures built in-process with lopdf.

#![allow(dead_code)]

use docproc::{guard, rasterize, DocumentHandle};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// A letter-size PDF whose page `n` carries a black bar `n * 10` points wide,
/// so pages can be told apart after edits.
pub fn pdf(page_count: usize) -> Vec<u8> {
    build(page_count, |doc, n| {
        let content = format!("0 g 72 700 {} 20 re f", n * 10);
        (doc.add_object(Stream::new(dictionary! {}, content.into_bytes())), None)
    })
}

/// A PDF whose first page is a scanned image: an 8-bit gray XObject drawn
/// over the whole page. Remaining pages are plain.
pub fn scanned_pdf(page_count: usize) -> Vec<u8> {
    build(page_count, |doc, n| {
        if n > 1 {
            let content = b"0 g 72 700 40 20 re f".to_vec();
            return (doc.add_object(Stream::new(dictionary! {}, content)), None);
        }

        let (width, height) = (64u32, 32u32);
        let pixels = (0..width * height)
            .map(|i| if (i % width) / 8 % 2 == 0 { 0u8 } else { 255u8 })
            .collect::<Vec<_>>();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
            },
            pixels,
        ));
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"q 612 0 0 792 0 0 cm /Scan Do Q".to_vec(),
        ));
        let resources_id = doc.add_object(dictionary! {
            "XObject" => dictionary! { "Scan" => image_id },
        });
        (content_id, Some(resources_id))
    })
}

/// Width in points of each page's black bar, in page order.
pub fn bar_widths(doc: &DocumentHandle) -> Vec<u32> {
    (1..=doc.page_count())
        .map(|page| {
            let gray = rasterize(doc, page, 1.0).unwrap().into_image().to_luma8();
            // The bar spans 72..92 px from the top at scale 1
            (0..gray.width())
                .filter(|&x| gray.get_pixel(x, 82)[0] < 128)
                .count() as u32
        })
        .collect()
}

pub fn handle(page_count: usize) -> DocumentHandle {
    load(&pdf(page_count))
}

pub fn load(bytes: &[u8]) -> DocumentHandle {
    DocumentHandle::load(guard(bytes).unwrap()).unwrap()
}

fn build(
    page_count: usize,
    mut content: impl FnMut(&mut Document, usize) -> (ObjectId, Option<ObjectId>),
) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for n in 1..=page_count {
        let (content_id, resources_id) = content(&mut doc, n);
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if let Some(resources_id) = resources_id {
            page.set("Resources", resources_id);
        }
        let page_id = doc.add_object(page);
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
