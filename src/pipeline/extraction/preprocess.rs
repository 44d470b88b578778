//! Image preprocessing ahead of OCR.
//!
//! The chain yields at most two candidates per image: the processed one
//! (grayscale, edge-preserving denoise, tiled contrast equalization,
//! adaptive threshold) and then the raw bytes as they arrived. The engine
//! only sees the raw bytes if the processed candidate produced no lines,
//! so a bad preprocessing pass can never lose text the engine would have
//! found on the original.

use std::borrow::Cow;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use tracing::debug;

use super::normalize::normalize;
use super::types::{ExtractionWarning, OcrEngine, TextLine};
use super::ExtractionError;
use crate::pipeline_config::PreprocessConfig;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum accepted image payload.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Smallest payload that can hold a valid PNG/JPEG header plus pixels.
const MIN_IMAGE_BYTES: usize = 67;

// ═══════════════════════════════════════════════════════════
// Candidates
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Processed,
    Raw,
}

/// One representation of the source image, encoded for the engine.
#[derive(Debug)]
pub struct Candidate<'a> {
    pub kind: CandidateKind,
    pub bytes: Cow<'a, [u8]>,
}

/// Decoded source image plus the bytes it came from.
pub struct SourceImage<'a> {
    raw: &'a [u8],
    image: DynamicImage,
}

impl<'a> SourceImage<'a> {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Lazily yields `Processed` then `Raw`. The processed image is only
/// computed when pulled; if processing fails the iterator moves straight
/// to `Raw`.
pub struct Candidates<'c, 'a> {
    chain: &'c PreprocessingChain,
    source: &'c SourceImage<'a>,
    next: Option<CandidateKind>,
}

impl<'c, 'a> Iterator for Candidates<'c, 'a> {
    type Item = Candidate<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next.take()? {
            CandidateKind::Processed => {
                self.next = Some(CandidateKind::Raw);
                match self
                    .chain
                    .process(&self.source.image)
                    .and_then(|gray| encode_png(&gray))
                {
                    Ok(png) => Some(Candidate {
                        kind: CandidateKind::Processed,
                        bytes: Cow::Owned(png),
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, "Preprocessing failed, using raw image");
                        self.next()
                    }
                }
            }
            CandidateKind::Raw => Some(Candidate {
                kind: CandidateKind::Raw,
                bytes: Cow::Borrowed(self.source.raw),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// PreprocessingChain
// ═══════════════════════════════════════════════════════════

pub struct PreprocessingChain {
    config: PreprocessConfig,
}

/// Lines found on one image and which candidate produced them.
#[derive(Debug)]
pub struct ImageOcrOutcome {
    pub lines: Vec<TextLine>,
    pub candidate: CandidateKind,
    pub warnings: Vec<ExtractionWarning>,
}

impl PreprocessingChain {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Validate, decode and orient the source. A decode failure means the
    /// document itself is unreadable.
    pub fn prepare<'a>(&self, image_bytes: &'a [u8]) -> Result<SourceImage<'a>, ExtractionError> {
        validate_image_bytes(image_bytes)?;
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| ExtractionError::ImageDecode(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(ExtractionError::ImageDecode("Image has no pixels".into()));
        }
        let image = apply_orientation(image, read_exif_orientation(image_bytes));
        Ok(SourceImage {
            raw: image_bytes,
            image,
        })
    }

    pub fn candidates<'c, 'a>(&'c self, source: &'c SourceImage<'a>) -> Candidates<'c, 'a> {
        Candidates {
            chain: self,
            source,
            next: Some(CandidateKind::Processed),
        }
    }

    /// grayscale → denoise → local contrast → adaptive threshold
    pub fn process(&self, image: &DynamicImage) -> Result<GrayImage, ExtractionError> {
        let gray = image.to_luma8();
        let gray = pre_downscale(&gray, self.config.max_dimension);

        // bilateral_filter panics on empty input and gains nothing on a flat page
        let denoised = if is_uniform(&gray) {
            gray.into_owned()
        } else {
            imageproc::filter::bilateral_filter(
                &gray,
                self.config.denoise_window.max(1),
                self.config.denoise_sigma_color,
                self.config.denoise_sigma_spatial,
            )
        };

        let enhanced = equalize_local_contrast(
            &denoised,
            self.config.contrast_tiles,
            self.config.contrast_clip_limit,
        );

        let thresholded = imageproc::contrast::adaptive_threshold(
            &enhanced,
            self.config.threshold_block_radius.max(1),
        );

        debug!(
            width = thresholded.width(),
            height = thresholded.height(),
            "Preprocessed image for OCR"
        );
        Ok(thresholded)
    }

    /// Quality warnings for the source, computed on its grayscale form.
    pub fn assess(&self, source: &SourceImage<'_>) -> Vec<ExtractionWarning> {
        let gray = source.image.to_luma8();
        let gray = pre_downscale(&gray, self.config.max_dimension);
        let blur = compute_laplacian_variance(&gray);
        if blur < self.config.blur_threshold {
            debug!(blur_score = blur, "Image looks blurry");
            vec![ExtractionWarning::BlurryImage]
        } else {
            Vec::new()
        }
    }

    /// Two-attempt OCR: processed candidate first, raw image if that yields
    /// no lines. Engine errors on the first attempt also fall through to
    /// the raw image; an error is returned only if every attempt failed.
    pub fn ocr_with_fallback(
        &self,
        engine: &dyn OcrEngine,
        image_bytes: &[u8],
    ) -> Result<ImageOcrOutcome, ExtractionError> {
        let source = self.prepare(image_bytes)?;
        let mut warnings = self.assess(&source);
        let mut last_error = None;
        let mut any_succeeded = false;
        let mut last_kind = CandidateKind::Processed;

        for candidate in self.candidates(&source) {
            last_kind = candidate.kind;
            match engine.detect_text(&candidate.bytes) {
                Ok(pages) => {
                    any_succeeded = true;
                    let lines = normalize(&pages);
                    debug!(
                        engine = engine.name(),
                        candidate = ?candidate.kind,
                        lines = lines.len(),
                        "OCR attempt finished"
                    );
                    if !lines.is_empty() {
                        if candidate.kind == CandidateKind::Raw {
                            warnings.push(ExtractionWarning::RawImageFallback);
                        }
                        return Ok(ImageOcrOutcome {
                            lines,
                            candidate: candidate.kind,
                            warnings,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        engine = engine.name(),
                        candidate = ?candidate.kind,
                        error = %e,
                        "OCR attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        match (any_succeeded, last_error) {
            (false, Some(e)) => Err(e),
            _ => Ok(ImageOcrOutcome {
                lines: Vec::new(),
                candidate: last_kind,
                warnings,
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

/// Reject payloads too small to be an image or too large to process.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::ImageDecode(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageDecode(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
///
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Scale oversized scans down before the per-pixel filters run.
fn pre_downscale(img: &GrayImage, max_dim: u32) -> Cow<'_, GrayImage> {
    let (w, h) = img.dimensions();
    let largest = w.max(h);

    if max_dim == 0 || largest <= max_dim {
        return Cow::Borrowed(img);
    }

    let scale = max_dim as f32 / largest as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);

    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Pre-downscaling oversized image"
    );

    Cow::Owned(image::imageops::resize(img, new_w, new_h, FilterType::Triangle))
}

fn is_uniform(img: &GrayImage) -> bool {
    let mut pixels = img.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p == first),
        None => true,
    }
}

/// Contrast-limited tiled histogram equalization.
///
/// Each tile gets its own clipped-histogram lookup table and every pixel is
/// mapped through a bilinear blend of the four nearest tile tables, so tile
/// seams do not show up as edges in the thresholded output.
pub fn equalize_local_contrast(img: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let tile_w = w.div_ceil(tiles.clamp(1, w));
    let tile_h = h.div_ceil(tiles.clamp(1, h));
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, y0) = (tx * tile_w, ty * tile_h);
            let (x1, y1) = ((x0 + tile_w).min(w), (y0 + tile_h).min(h));
            luts.push(tile_lut(img, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(w, h, |x, y| {
        let v = img.get_pixel(x, y).0[0] as usize;

        let gx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).max(0.0);
        let gy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).max(0.0);
        let tx0 = (gx.floor() as u32).min(tiles_x - 1);
        let ty0 = (gy.floor() as u32).min(tiles_y - 1);
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let fx = (gx - tx0 as f32).clamp(0.0, 1.0);
        let fy = (gy - ty0 as f32).clamp(0.0, 1.0);

        let top = lut_at(tx0, ty0)[v] as f32 * (1.0 - fx) + lut_at(tx1, ty0)[v] as f32 * fx;
        let bottom = lut_at(tx0, ty1)[v] as f32 * (1.0 - fx) + lut_at(tx1, ty1)[v] as f32 * fx;
        let value = top * (1.0 - fy) + bottom * fy;
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_lut(img: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[img.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) * (y1 - y0);

    // Clip and spread the excess evenly across all bins
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let bonus = excess / 256;
    let remainder = excess % 256;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus + u32::from((i as u32) < remainder);
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = ((cdf as f32 * 255.0 / area as f32).round()).min(255.0) as u8;
    }
    lut
}

/// Laplacian variance, a sharpness measure. Blurry scans sit below ~100,
/// sharp text well above 500. Uses the 3x3 kernel `[0,1,0; 1,-4,1; 0,1,0]`.
pub fn compute_laplacian_variance(img: &GrayImage) -> f32 {
    let (w, h) = (img.width() as i32, img.height() as i32);
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let px = |dx: i32, dy: i32| img.get_pixel((x + dx) as u32, (y + dy) as u32).0[0] as f64;
            let laplacian = px(0, -1) + px(0, 1) + px(-1, 0) + px(1, 0) - 4.0 * px(0, 0);
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0) as f32
}

pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, ExtractionError> {
    let dynamic = DynamicImage::ImageLuma8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
