use std::panic::{catch_unwind, AssertUnwindSafe};

use super::types::PdfTextBackend;
use super::ExtractionError;

/// Primary text-layer backend using the pdf-extract crate.
///
/// pdf-extract panics on some malformed font tables, so the call runs
/// under `catch_unwind` and a panic becomes a parse error.
pub struct PdfExtractBackend;

impl PdfTextBackend for PdfExtractBackend {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        }))
        .map_err(|_| ExtractionError::PdfParsing("pdf-extract panicked".into()))?
        .map_err(|e| ExtractionError::PdfParsing(e.to_string()))
    }
}

/// Secondary backend reading each page's content stream through lopdf.
///
/// Pages lopdf cannot decode come back empty rather than failing the
/// whole document.
pub struct LopdfTextBackend;

impl PdfTextBackend for LopdfTextBackend {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        let doc = lopdf::Document::load_mem(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        let pages = doc
            .get_pages()
            .keys()
            .map(|&number| match doc.extract_text(&[number]) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(page = number, error = %e, "lopdf could not read page text");
                    String::new()
                }
            })
            .collect();

        Ok(pages)
    }
}

/// Join per-page text as `Page N:\n<text>`, pages separated by a blank
/// line. Pages with no visible text are skipped.
pub fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| format!("Page {}:\n{}", i + 1, text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::dictionary;
    use lopdf::{Document, Object, Stream};

    /// Build a PDF whose pages each draw one line of Helvetica text.
    pub fn make_test_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let pages_id = doc.new_object_id();

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = format!("BT /F1 12 Tf 100 700 Td ({text}) Tj ET");
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }
}
