//! Fee payment receipt as a one-page A4 PDF.
//!
//! Layout: school logo with name and address beside it, a header rule, the
//! title, a nine-row label/value table with alternating shading and a
//! column separator, then a footer rule and a verification line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use printpdf::image_crate::{DynamicImage as PdfRaster, RgbImage as PdfRgb};
use printpdf::{
    BuiltinFont, Color, CustomPdfConformance, Greyscale, Image, ImageTransform, Line, Mm,
    PdfConformance, PdfDocument, Point, Pt, Rect,
};
use printpdf::path::PaintMode;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::{AppConfig, LogoSource};
use crate::error::{DeskError, Result};
use crate::ledger::{format_inr, remaining_due};
use crate::models::{day_of, Payment, Student};

/// A4 in points.
pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;

const LOGO_W: f32 = 80.0;
const LOGO_H: f32 = 70.0;
const LOGO_X: f32 = 40.0;
/// Logo is kept at most 4x its drawn size.
const LOGO_MAX_PX: (u32, u32) = (320, 280);

const MARGIN: f32 = 40.0;
const BORDER_GRAY: f32 = 0.8;
const HEADER_GRAY: f32 = 0.3;

const TABLE_X: f32 = 80.0;
const ROW_H: f32 = 30.0;
const LABEL_W: f32 = 160.0;
const VALUE_W: f32 = 300.0;
const ROW_DARK: f32 = 0.85;
const ROW_LIGHT: f32 = 0.97;

pub const TITLE: &str = "FEE PAYMENT RECEIPT";
pub const FOOTER: &str = "This receipt is electronically verified.";

/// Fixed document id so identical receipts are byte-identical.
const DOCUMENT_ID: &str = "school-desk-fee-receipt";

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptLayout {
    pub school_name: String,
    pub school_address: String,
}

impl ReceiptLayout {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            school_name: cfg.school_name.clone(),
            school_address: cfg.school_address.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub filename: String,
    pub bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

fn or_na(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("N/A")
        .to_string()
}

/// `DD/MM/YYYY`, `-` when absent.
fn display_date(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return "-".to_string();
    };
    match NaiveDate::parse_from_str(day_of(raw), "%Y-%m-%d") {
        Ok(d) => d.format("%d/%m/%Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// The table rows, in order.
pub fn receipt_rows(student: &Student, payment: &Payment) -> Vec<(&'static str, String)> {
    let name = if student.name.trim().is_empty() {
        None
    } else {
        Some(student.name.as_str())
    };
    vec![
        ("Student Name", or_na(name)),
        ("Class", or_na(student.class.as_deref())),
        ("Admission No", or_na(student.admission_number.as_deref())),
        ("Amount Paid", format_inr(payment.amount)),
        ("Date", display_date(payment.date.as_deref())),
        ("Payment Mode", payment.mode.to_string()),
        ("Total Fee", format_inr(student.total_fee_amount)),
        ("Remaining Due", format_inr(remaining_due(student))),
        ("Due Date", display_date(student.fee_due_date.as_deref())),
    ]
}

fn file_component(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// `receipt_{admission number or "student"}_{payment id}.pdf`
pub fn receipt_filename(student: &Student, payment: &Payment) -> String {
    let admission = student
        .admission_number
        .as_deref()
        .map(file_component)
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| "student".to_string());
    format!("receipt_{admission}_{}.pdf", file_component(&payment.id))
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Logo pixels, RGB8, translucency already composited onto white paper.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptLogo {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// One drawing instruction on the page. Coordinates are PDF points from the
/// bottom-left corner; gray levels run from 0 (black) to 1 (white).
#[derive(Debug, Clone, PartialEq)]
pub enum Mark {
    Logo { x: f32, y: f32, w: f32, h: f32 },
    Text { x: f32, y: f32, size: f32, gray: f32, text: String },
    Rule { from: (f32, f32), to: (f32, f32), gray: f32, width: f32 },
    Band { x: f32, y: f32, w: f32, h: f32, gray: f32 },
}

fn text(x: f32, y: f32, size: f32, gray: f32, text: &str) -> Mark {
    Mark::Text {
        x,
        y,
        size,
        gray,
        text: text.to_string(),
    }
}

/// Lay out the page: header with logo, title, shaded table, footer.
pub fn receipt_marks(layout: &ReceiptLayout, student: &Student, payment: &Payment) -> Vec<Mark> {
    let mut marks = Vec::new();

    let logo_y = PAGE_HEIGHT - 100.0;
    marks.push(Mark::Logo {
        x: LOGO_X,
        y: logo_y,
        w: LOGO_W,
        h: LOGO_H,
    });
    let center_y = logo_y + LOGO_H / 2.0 - 10.0;
    marks.push(text(LOGO_X + LOGO_W + 70.0, center_y, 20.0, HEADER_GRAY, &layout.school_name));
    marks.push(text(
        LOGO_X + LOGO_W + 100.0,
        center_y - 18.0,
        12.0,
        HEADER_GRAY,
        &layout.school_address,
    ));

    let header_bottom = logo_y - 20.0;
    marks.push(Mark::Rule {
        from: (MARGIN, header_bottom),
        to: (PAGE_WIDTH - MARGIN, header_bottom),
        gray: BORDER_GRAY,
        width: 1.0,
    });
    marks.push(text(210.0, header_bottom - 30.0, 16.0, 0.0, TITLE));

    let mut y = header_bottom - 70.0;
    for (index, (label, value)) in receipt_rows(student, payment).iter().enumerate() {
        let shade = if index % 2 == 0 { ROW_DARK } else { ROW_LIGHT };
        marks.push(Mark::Band {
            x: TABLE_X - 10.0,
            y: y - 8.0,
            w: LABEL_W + VALUE_W + 20.0,
            h: ROW_H - 2.0,
            gray: shade,
        });
        marks.push(text(TABLE_X, y, 11.0, 0.1, label));
        marks.push(Mark::Rule {
            from: (TABLE_X + LABEL_W, y + 15.0),
            to: (TABLE_X + LABEL_W, y - 10.0),
            gray: BORDER_GRAY,
            width: 0.5,
        });
        marks.push(text(TABLE_X + LABEL_W + 15.0, y, 11.0, 0.15, value));
        y -= ROW_H;
    }

    y -= 20.0;
    marks.push(Mark::Rule {
        from: (MARGIN, y),
        to: (PAGE_WIDTH - MARGIN, y),
        gray: 0.2,
        width: 0.6,
    });
    marks.push(text(160.0, y - 20.0, 11.0, 0.3, FOOTER));
    marks
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Decode PNG/JPEG bytes, shrink oversized logos and flatten any alpha onto
/// white.
pub fn decode_logo(bytes: &[u8]) -> Result<ReceiptLogo> {
    let mut img = image::load_from_memory(bytes)
        .map_err(|e| DeskError::Receipt(format!("logo could not be decoded: {e}")))?;
    let (max_w, max_h) = LOGO_MAX_PX;
    if img.width() > max_w || img.height() > max_h {
        img = img.thumbnail(max_w, max_h);
    }
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for px in rgba.pixels() {
        let alpha = u32::from(px.0[3]);
        for channel in &px.0[..3] {
            let c = u32::from(*channel);
            rgb.push(((c * alpha + 255 * (255 - alpha) + 127) / 255) as u8);
        }
    }
    Ok(ReceiptLogo { width, height, rgb })
}

fn pt(value: f32) -> Mm {
    Mm::from(Pt(value))
}

fn gray(level: f32) -> Color {
    Color::Greyscale(Greyscale::new(level, None))
}

fn pdf_error(e: impl std::fmt::Display) -> DeskError {
    DeskError::Receipt(format!("document assembly failed: {e}"))
}

/// Render the receipt. Identical inputs give identical bytes.
pub fn render_receipt(
    layout: &ReceiptLayout,
    logo: ReceiptLogo,
    student: &Student,
    payment: &Payment,
) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(TITLE, pt(PAGE_WIDTH), pt(PAGE_HEIGHT), "Receipt");
    let doc = doc
        .with_document_id(DOCUMENT_ID.to_string())
        .with_creation_date(OffsetDateTime::UNIX_EPOCH)
        .with_mod_date(OffsetDateTime::UNIX_EPOCH)
        .with_conformance(PdfConformance::Custom(CustomPdfConformance {
            requires_icc_profile: false,
            requires_xmp_metadata: false,
            ..Default::default()
        }));
    let layer = doc.get_page(page).get_layer(layer);
    let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;

    let (logo_w, logo_h) = (logo.width, logo.height);
    let raster = PdfRgb::from_raw(logo_w, logo_h, logo.rgb)
        .ok_or_else(|| pdf_error("logo buffer does not match its size"))?;
    let mut logo_image = Some(Image::from_dynamic_image(&PdfRaster::ImageRgb8(raster)));

    for mark in receipt_marks(layout, student, payment) {
        match mark {
            Mark::Logo { x, y, w, h } => {
                if let Some(image) = logo_image.take() {
                    // At 72 dpi one pixel is one point.
                    image.add_to_layer(
                        layer.clone(),
                        ImageTransform {
                            translate_x: Some(pt(x)),
                            translate_y: Some(pt(y)),
                            scale_x: Some(w / logo_w as f32),
                            scale_y: Some(h / logo_h as f32),
                            dpi: Some(72.0),
                            ..Default::default()
                        },
                    );
                }
            }
            Mark::Text {
                x,
                y,
                size,
                gray: level,
                text,
            } => {
                layer.set_fill_color(gray(level));
                layer.use_text(text, size, pt(x), pt(y), &font);
            }
            Mark::Rule {
                from,
                to,
                gray: level,
                width,
            } => {
                layer.set_outline_color(gray(level));
                layer.set_outline_thickness(width);
                layer.add_line(Line {
                    points: vec![
                        (Point::new(pt(from.0), pt(from.1)), false),
                        (Point::new(pt(to.0), pt(to.1)), false),
                    ],
                    is_closed: false,
                });
            }
            Mark::Band {
                x,
                y,
                w,
                h,
                gray: level,
            } => {
                layer.set_fill_color(gray(level));
                layer.add_rect(
                    Rect::new(pt(x), pt(y), pt(x + w), pt(y + h)).with_mode(PaintMode::Fill),
                );
            }
        }
    }

    doc.save_to_bytes().map_err(pdf_error)
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Where logo bytes come from.
#[async_trait]
pub trait LogoFetcher: Send + Sync {
    async fn fetch_logo(&self, source: &LogoSource) -> Result<Vec<u8>>;
}

#[async_trait]
impl LogoFetcher for ApiClient {
    async fn fetch_logo(&self, source: &LogoSource) -> Result<Vec<u8>> {
        match source {
            LogoSource::Url(url) => self.fetch_bytes(url).await,
            LogoSource::File(path) => Ok(tokio::fs::read(path).await?),
            LogoSource::Inline(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Fetch the logo once, then render. Any failure is reported as one
/// [`DeskError::Receipt`].
pub async fn generate_receipt(
    fetcher: &dyn LogoFetcher,
    source: &LogoSource,
    layout: &ReceiptLayout,
    student: &Student,
    payment: &Payment,
) -> Result<Receipt> {
    let result = async {
        let bytes = fetcher.fetch_logo(source).await?;
        debug!(len = bytes.len(), "receipt logo fetched");
        let logo = decode_logo(&bytes)?;
        Ok::<_, DeskError>(Receipt {
            filename: receipt_filename(student, payment),
            bytes: render_receipt(layout, logo, student, payment)?,
        })
    }
    .await;

    match result {
        Ok(receipt) => {
            info!(student_id = %student.id, payment_id = %payment.id, size = receipt.bytes.len(), "receipt rendered");
            Ok(receipt)
        }
        Err(e) => {
            warn!(student_id = %student.id, payment_id = %payment.id, error = %e, "receipt generation failed");
            Err(match e {
                DeskError::Receipt(msg) => DeskError::Receipt(msg),
                other => DeskError::Receipt(other.to_string()),
            })
        }
    }
}

/// Write the receipt into `dir`. The file only appears once fully written.
pub fn save_receipt(dir: &Path, receipt: &Receipt) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let target = dir.join(&receipt.filename);
    let partial = dir.join(format!(".{}.part", receipt.filename));
    std::fs::write(&partial, &receipt.bytes)?;
    if let Err(e) = std::fs::rename(&partial, &target) {
        let _ = std::fs::remove_file(&partial);
        return Err(e.into());
    }
    info!(path = %target.display(), "receipt saved");
    Ok(target)
}
