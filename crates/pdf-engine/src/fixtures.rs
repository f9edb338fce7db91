//! Minimal PDF documents for tests.

use crate::PageSize;
use lopdf::{dictionary, Document, Object};

/// Builds a PDF with one empty page per entry in `page_sizes`.
pub fn blank_pdf(page_sizes: &[PageSize]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = page_sizes
        .iter()
        .map(|size| {
            let media_box: Vec<Object> = vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(size.width_pt.round() as i64),
                Object::Integer(size.height_pt.round() as i64),
            ];
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => media_box,
            });
            Object::Reference(page_id)
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("in-memory PDF should serialize");
    bytes
}
