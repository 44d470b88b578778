//! Scanned-PDF page rasterization using lopdf.
//!
//! Scanned reports carry each page as an image XObject (JPEG, TIFF, or raw
//! pixels). The largest image on the page is taken as the page scan and
//! scaled toward the requested resolution.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use lopdf::{Document, Object, ObjectId};

use super::types::PdfPageRenderer;
use super::ExtractionError;

/// Letter width in points, for pages without a readable /MediaBox.
const DEFAULT_PAGE_WIDTH_PT: f32 = 612.0;
const MAX_UPSCALE: f32 = 4.0;

/// Renders scanned PDF pages by extracting their embedded page image.
///
/// The last parsed document is kept, so counting pages and rendering each
/// of them parses the PDF once.
#[derive(Default)]
pub struct LopdfPageRenderer {
    cached: Mutex<Option<CachedDocument>>,
    parses: AtomicUsize,
}

struct CachedDocument {
    bytes: Vec<u8>,
    doc: Arc<Document>,
}

impl LopdfPageRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn document(&self, pdf_bytes: &[u8]) -> Result<Arc<Document>, ExtractionError> {
        if let Ok(cached) = self.cached.lock() {
            if let Some(entry) = cached.as_ref().filter(|c| c.bytes == pdf_bytes) {
                return Ok(Arc::clone(&entry.doc));
            }
        }

        let doc = Arc::new(load(pdf_bytes)?);
        self.parses.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(CachedDocument {
                bytes: pdf_bytes.to_vec(),
                doc: Arc::clone(&doc),
            });
        }
        Ok(doc)
    }

    #[cfg(test)]
    fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }
}

impl PdfPageRenderer for LopdfPageRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let doc = self.document(pdf_bytes)?;
        Ok(doc.get_pages().len())
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<PathBuf, ExtractionError> {
        let document = self.document(pdf_bytes)?;
        let doc: &Document = &document;

        let page_ids: Vec<ObjectId> = doc.page_iter().collect();
        let &page_id = page_ids.get(page_index).ok_or_else(|| {
            ExtractionError::PageRender(format!(
                "Page {} not found (PDF has {} pages)",
                page_index + 1,
                page_ids.len()
            ))
        })?;

        let image_bytes = extract_largest_page_image(doc, page_id)?;
        let img = image::load_from_memory(&image_bytes).map_err(|e| {
            ExtractionError::PageRender(format!("Failed to decode page image: {e}"))
        })?;

        let img = scale_to_dpi(img, page_width_pt(doc, page_id), dpi);

        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;

        let path = out_dir.join(format!("page-{}.png", page_index + 1));
        std::fs::write(&path, png.get_ref())?;

        tracing::debug!(
            page = page_index + 1,
            raw_size = image_bytes.len(),
            png_size = png.get_ref().len(),
            width = img.width(),
            height = img.height(),
            "Rendered PDF page"
        );

        Ok(path)
    }
}

fn load(pdf_bytes: &[u8]) -> Result<Document, ExtractionError> {
    Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionError::PdfParsing(format!("Failed to parse PDF: {e}")))
}

/// Upscale so the page spans `dpi` pixels per inch, at most 4x the
/// embedded resolution. Never downscales. `dpi == 0` keeps native size.
fn scale_to_dpi(img: DynamicImage, page_width_pt: f32, dpi: u32) -> DynamicImage {
    if dpi == 0 || img.width() == 0 {
        return img;
    }
    let target_width = page_width_pt / 72.0 * dpi as f32;
    let factor = (target_width / img.width() as f32).min(MAX_UPSCALE);
    if factor <= 1.0 {
        return img;
    }
    let width = (img.width() as f32 * factor).round() as u32;
    let height = (img.height() as f32 * factor).round() as u32;
    img.resize_exact(width, height, FilterType::Lanczos3)
}

fn page_width_pt(doc: &Document, page_id: ObjectId) -> f32 {
    let media_box = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .and_then(|d| d.get(b"MediaBox"))
        .map(|obj| resolve_object(doc, obj));

    match media_box {
        Ok(Object::Array(values)) if values.len() == 4 => {
            match (values[0].as_float(), values[2].as_float()) {
                (Ok(x0), Ok(x1)) if x1 > x0 => x1 - x0,
                _ => DEFAULT_PAGE_WIDTH_PT,
            }
        }
        _ => DEFAULT_PAGE_WIDTH_PT,
    }
}

/// Walks: page dict → /Resources → /XObject, keeping the largest
/// /Subtype /Image entry (the page scan).
fn extract_largest_page_image(
    doc: &Document,
    page_id: ObjectId,
) -> Result<Vec<u8>, ExtractionError> {
    let page_dict = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| ExtractionError::PdfParsing(format!("Page object error: {e}")))?;

    let resources = resolve_dict_entry(doc, page_dict, b"Resources")?;
    let xobjects = resolve_dict_entry(doc, resources, b"XObject")?;

    let mut largest: Option<Vec<u8>> = None;
    let mut last_error = None;

    for (name, obj_ref) in xobjects.iter() {
        let stream = match resolve_object(doc, obj_ref) {
            Object::Stream(s) => s,
            _ => continue,
        };
        if !is_image_subtype(&stream.dict) {
            continue;
        }

        let image_bytes = match extract_image_bytes(doc, stream) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(
                    xobject = %String::from_utf8_lossy(name),
                    error = %e,
                    "Skipping undecodable page image"
                );
                last_error = Some(e);
                continue;
            }
        };
        if largest.as_ref().map_or(true, |prev| image_bytes.len() > prev.len()) {
            largest = Some(image_bytes);
        }
    }

    match (largest, last_error) {
        (Some(bytes), _) => Ok(bytes),
        (None, Some(e)) => Err(e),
        (None, None) => Err(ExtractionError::PageRender("No page image found".into())),
    }
}

fn is_image_subtype(dict: &lopdf::Dictionary) -> bool {
    dict.get(b"Subtype")
        .map(|obj| matches!(obj, Object::Name(n) if n == b"Image"))
        .unwrap_or(false)
}

fn extract_image_bytes(
    doc: &Document,
    stream: &lopdf::Stream,
) -> Result<Vec<u8>, ExtractionError> {
    let is_dct = match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => n == b"DCTDecode",
        Ok(Object::Array(arr)) => arr
            .iter()
            .any(|o| matches!(o, Object::Name(n) if n == b"DCTDecode")),
        _ => false,
    };

    // DCTDecode content is the JPEG file itself
    if is_dct {
        return Ok(stream.content.clone());
    }

    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    // Some streams hold complete image files (TIFF, PNG)
    if image::load_from_memory(&content).is_ok() {
        return Ok(content);
    }

    reconstruct_raw_image(doc, &stream.dict, &content)
}

/// Rebuild raw 8-bit pixel data into a PNG using the image dictionary.
fn reconstruct_raw_image(
    doc: &Document,
    dict: &lopdf::Dictionary,
    raw_pixels: &[u8],
) -> Result<Vec<u8>, ExtractionError> {
    let width = u32::try_from(get_int(dict, b"Width")?)
        .map_err(|_| ExtractionError::PdfParsing("Negative /Width".into()))?;
    let height = u32::try_from(get_int(dict, b"Height")?)
        .map_err(|_| ExtractionError::PdfParsing("Negative /Height".into()))?;
    let bpc = get_int(dict, b"BitsPerComponent").unwrap_or(8);
    if bpc != 8 {
        return Err(ExtractionError::PageRender(format!(
            "Unsupported bits per component: {bpc}"
        )));
    }

    let channels = determine_channels(doc, dict);
    let expected = width as usize * height as usize * channels as usize;
    if raw_pixels.len() < expected {
        return Err(ExtractionError::PageRender(format!(
            "Raw pixel buffer too small: {} bytes, expected {expected}",
            raw_pixels.len()
        )));
    }
    let pixels = raw_pixels[..expected].to_vec();

    let img = match channels {
        1 => image::GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        3 => image::RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        // CMYK read as RGBA; colour accuracy does not matter for OCR
        4 => image::RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8),
        n => {
            return Err(ExtractionError::PageRender(format!(
                "Unsupported channel count: {n}"
            )))
        }
    }
    .ok_or_else(|| ExtractionError::PageRender("Pixel buffer does not match size".into()))?;

    let mut png = Cursor::new(Vec::new());
    img.write_to(&mut png, ImageFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(png.into_inner())
}

fn determine_channels(doc: &Document, dict: &lopdf::Dictionary) -> u32 {
    let cs = match dict.get(b"ColorSpace") {
        Ok(obj) => resolve_object(doc, obj),
        Err(_) => return 3,
    };

    match cs {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" => 1,
            b"DeviceCMYK" => 4,
            _ => 3,
        },
        Object::Array(arr) => match arr.first() {
            Some(Object::Name(n)) if n == b"ICCBased" => arr
                .get(1)
                .map(|o| resolve_object(doc, o))
                .and_then(|o| match o {
                    Object::Stream(s) => get_int(&s.dict, b"N").ok(),
                    _ => None,
                })
                .map_or(3, |n| n as u32),
            Some(Object::Name(n)) if n == b"Indexed" => 1,
            _ => 3,
        },
        _ => 3,
    }
}

fn resolve_object<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn resolve_dict_entry<'a>(
    doc: &'a Document,
    dict: &'a lopdf::Dictionary,
    key: &[u8],
) -> Result<&'a lopdf::Dictionary, ExtractionError> {
    let name = String::from_utf8_lossy(key);
    let obj = dict
        .get(key)
        .map_err(|_| ExtractionError::PageRender(format!("Missing /{name} on page")))?;
    resolve_object(doc, obj)
        .as_dict()
        .map_err(|_| ExtractionError::PdfParsing(format!("/{name} is not a dictionary")))
}

fn get_int(dict: &lopdf::Dictionary, key: &[u8]) -> Result<i64, ExtractionError> {
    let name = String::from_utf8_lossy(key);
    dict.get(key)
        .map_err(|_| ExtractionError::PdfParsing(format!("Missing /{name} in image dictionary")))?
        .as_i64()
        .map_err(|_| ExtractionError::PdfParsing(format!("/{name} is not an integer")))
}

#[cfg(test)]
pub(crate) mod scan_support {
    use lopdf::{dictionary, Document, Object, Stream};

    pub fn make_test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([128u8, 128, 128]));
        let mut jpeg = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut jpeg, image::ImageFormat::Jpeg)
            .unwrap();
        jpeg.into_inner()
    }

    pub fn image_stream(jpeg: Vec<u8>, width: i64, height: i64) -> Stream {
        let mut stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
                "Length" => jpeg.len() as i64,
            },
            jpeg,
        );
        stream.allows_compression = false;
        stream
    }

    /// Raw 8-bit grey image whose pixel buffer is far too short for its size.
    pub fn broken_image_stream() -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1000,
                "Height" => 1000,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            b"not pixels".to_vec(),
        )
    }

    /// One page per entry; each page holds the given (width, height) JPEGs.
    pub fn make_scanned_pdf(pages: &[&[(u32, u32)]]) -> Vec<u8> {
        let pages = pages
            .iter()
            .map(|images| {
                images
                    .iter()
                    .map(|&(w, h)| image_stream(make_test_jpeg(w, h), w as i64, h as i64))
                    .collect()
            })
            .collect();
        make_pdf_with_images(pages)
    }

    /// One page per entry, each page drawing the given image streams.
    pub fn make_pdf_with_images(pages: Vec<Vec<Stream>>) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();

        for images in pages {
            let mut xobjects = lopdf::Dictionary::new();
            let mut ops = String::new();
            for (i, stream) in images.into_iter().enumerate() {
                let id = doc.add_object(stream);
                let name = format!("Im{i}");
                xobjects.set(name.as_bytes().to_vec(), id);
                ops.push_str(&format!("q 612 0 0 792 0 0 cm /{name} Do Q "));
            }
            let content_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
                "Resources" => dictionary! { "XObject" => xobjects },
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
