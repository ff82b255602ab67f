//! PDF profiling for the `analyze_pdf` operation

use lopdf::{Dictionary, Document, Object};
use serde_json::{json, Value};
use tracing::debug;

use super::StoreError;

const PREVIEW_CHARS: usize = 200;
const METADATA_FIELDS: [(&str, &[u8]); 7] = [
    ("title", b"Title"),
    ("author", b"Author"),
    ("subject", b"Subject"),
    ("creator", b"Creator"),
    ("producer", b"Producer"),
    ("creation_date", b"CreationDate"),
    ("modification_date", b"ModDate"),
];

/// Follow a reference to the object it points at
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, object).and_then(|o| o.as_dict().ok())
}

/// Page attributes such as `Resources` may live on an ancestor `Pages` node
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    // bounded walk; malformed files can loop
    for _ in 0..32 {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        node = node.get(b"Parent").ok().and_then(|p| resolve_dict(doc, p))?;
    }
    None
}

/// PDF text strings are UTF-16BE with a BOM or single-byte encoded
fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn metadata(doc: &Document) -> Value {
    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|info| resolve_dict(doc, info));

    let mut fields = serde_json::Map::new();
    for (name, key) in METADATA_FIELDS {
        let value = info
            .and_then(|info| info.get(key).ok())
            .and_then(|value| resolve(doc, value))
            .and_then(|value| match value {
                Object::String(bytes, _) => Some(decode_text_string(bytes)),
                _ => None,
            })
            .unwrap_or_default();
        fields.insert(name.to_string(), json!(value));
    }
    Value::Object(fields)
}

fn image_count(doc: &Document, page: &Dictionary) -> usize {
    let Some(xobjects) = inherited(doc, page, b"Resources")
        .and_then(|resources| resolve_dict(doc, resources))
        .and_then(|resources| resources.get(b"XObject").ok())
        .and_then(|xobjects| resolve_dict(doc, xobjects))
    else {
        return 0;
    };

    xobjects
        .iter()
        .filter_map(|(_, xobject)| resolve(doc, xobject))
        .filter_map(|xobject| xobject.as_stream().ok())
        .filter(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map_or(false, |subtype| subtype == b"Image")
        })
        .count()
}

fn link_count(doc: &Document, page: &Dictionary) -> usize {
    let Some(annotations) = page
        .get(b"Annots")
        .ok()
        .and_then(|annots| resolve(doc, annots))
        .and_then(|annots| annots.as_array().ok())
    else {
        return 0;
    };

    annotations
        .iter()
        .filter_map(|annotation| resolve_dict(doc, annotation))
        .filter(|annotation| {
            annotation
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map_or(false, |subtype| subtype == b"Link")
        })
        .count()
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Profile a PDF document: metadata, per-page text and element counts
pub fn analyze(body: &[u8], file_size: u64) -> Result<Value, StoreError> {
    let doc = Document::load_mem(body)?;
    let pages = doc.get_pages();

    let mut pages_analysis = Vec::with_capacity(pages.len());
    let mut extracted_text = Vec::with_capacity(pages.len());
    let mut total_words = 0;
    let mut total_images = 0;
    let mut total_links = 0;
    let mut pages_with_content = 0;

    for (&number, &page_id) in &pages {
        let text = doc.extract_text(&[number]).unwrap_or_else(|e| {
            debug!("no text extracted from page {}: {}", number, e);
            String::new()
        });
        let (images, links) = match doc.get_dictionary(page_id) {
            Ok(page) => (image_count(&doc, page), link_count(&doc, page)),
            Err(_) => (0, 0),
        };

        let text_length = text.chars().count();
        if text_length > 0 {
            pages_with_content += 1;
        }
        total_words += text.split_whitespace().count();
        total_images += images;
        total_links += links;

        pages_analysis.push(json!({
            "page_number": number,
            "text_length": text_length,
            "text_preview": preview(&text),
            "image_count": images,
            "link_count": links,
        }));
        extracted_text.push(text);
    }

    let file_size_mb = (file_size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;

    Ok(json!({
        "basic_info": {
            "file_size_bytes": file_size,
            "file_size_mb": file_size_mb,
            "total_pages": pages.len(),
            "is_encrypted": doc.trailer.get(b"Encrypt").is_ok(),
            "metadata": metadata(&doc),
        },
        "statistics": {
            "text_extraction": {
                "total_pages_processed": pages_analysis.len(),
                "pages_with_content": pages_with_content,
                "total_words": total_words,
            },
            "document_elements": {
                "total_images": total_images,
                "total_links": total_links,
            },
        },
        "pages_analysis": pages_analysis,
        "extracted_text": extracted_text,
    }))
}
