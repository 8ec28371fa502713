//! Printable sample report.
//!
//! One A4 page: a QR code and a Code128 barcode of the sample number on top,
//! then every section of the form as a grid with two label/value pairs per
//! line. Codes are drawn as vector rectangles, so no image pipeline is needed.

use barcoders::sym::code128::Code128;
use printpdf::path::PaintMode;
use printpdf::*;
use qrcode::QrCode;

use crate::error::RenderError;
use crate::schema::{FieldValue, IDENTIFIER_LABEL, ResponseRecord, Section};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 10.0;
const QR_SIZE: f32 = 25.0;
const QR_QUIET_ZONE: usize = 4;
const BARCODE_W: f32 = 30.0;
const BARCODE_H: f32 = 12.0;
const LABEL_RATIO: f32 = 0.655;
const ROW_H: f32 = 4.5;
const SECTION_H: f32 = 7.0;
const PT_TO_MM: f32 = 0.3528;

/// Payload encoded when the record has no sample number.
pub const MISSING_SAMPLE: &str = "SEM_NUMERO";

/// Builds a printable artifact from a filled-in record.
pub trait DocumentRenderer {
    fn render(&self, schema: &[Section], record: &ResponseRecord) -> Result<Vec<u8>, RenderError>;
}

#[derive(Clone, Debug)]
pub struct PdfReport {
    pub title: String,
}

impl Default for PdfReport {
    fn default() -> Self {
        PdfReport {
            title: "Oliveira Energia - Amostra de óleo".to_string(),
        }
    }
}

/// Download name for a sample's report, identifier used verbatim.
pub fn report_file_name(identifier: &str) -> String {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        "amostra_sem_numero.pdf".to_string()
    } else {
        format!("amostra_{}.pdf", identifier)
    }
}

/// Reduce text to what the built-in PDF fonts can show (Latin-1).
pub fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' | '\u{2011}' => '-',
            '\u{00A0}' | '\n' | '\r' => ' ',
            c if (c as u32) <= 0xFF => c,
            _ => '?',
        })
        .collect()
}

/// QR modules, row-major, quiet zone excluded. Returns (width, dark flags).
fn qr_modules(payload: &str) -> Result<(usize, Vec<bool>), RenderError> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| RenderError::Qr(e.to_string()))?;
    let dark = code
        .to_colors()
        .into_iter()
        .map(|color| color == qrcode::Color::Dark)
        .collect();
    Ok((code.width(), dark))
}

/// Code128 (character set B) bars, one entry per module, 1 = bar.
fn barcode_modules(payload: &str) -> Result<Vec<u8>, RenderError> {
    let code = Code128::new(format!("\u{0181}{}", payload))
        .map_err(|e| RenderError::Barcode(e.to_string()))?;
    Ok(code.encode())
}

/// Drawing helpers with a top-left origin in millimetres.
struct Canvas {
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl Canvas {
    fn rect(&self, x: f32, top: f32, w: f32, h: f32, mode: PaintMode) {
        let rect = Rect::new(
            Mm(x),
            Mm(PAGE_H - top - h),
            Mm(x + w),
            Mm(PAGE_H - top),
        )
        .with_mode(mode);
        self.layer.add_rect(rect);
    }

    fn black(&self) {
        self.layer
            .set_fill_color(Color::Greyscale(Greyscale::new(0.0, None)));
    }

    fn text(&self, text: &str, size: f32, x: f32, baseline: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer
            .use_text(pdf_safe(text), size, Mm(x), Mm(PAGE_H - baseline), font);
    }

    /// Bordered box with text vertically centred inside.
    fn cell(&self, x: f32, top: f32, w: f32, h: f32, text: &str, size: f32, bold: bool) {
        self.rect(x, top, w, h, PaintMode::Stroke);
        let baseline = top + h / 2.0 + size * PT_TO_MM * 0.35;
        self.text(text, size, x + 1.0, baseline, bold);
    }

    fn qr(&self, payload: &str, x: f32, top: f32) -> Result<(), RenderError> {
        let (width, dark) = qr_modules(payload)?;
        let module = QR_SIZE / (width + 2 * QR_QUIET_ZONE) as f32;
        let origin_x = x + QR_QUIET_ZONE as f32 * module;
        let origin_y = top + QR_QUIET_ZONE as f32 * module;
        self.black();
        for (idx, _) in dark.iter().enumerate().filter(|(_, is_dark)| **is_dark) {
            let (row, col) = (idx / width, idx % width);
            self.rect(
                origin_x + col as f32 * module,
                origin_y + row as f32 * module,
                module,
                module,
                PaintMode::Fill,
            );
        }
        Ok(())
    }

    fn barcode(&self, payload: &str, x: f32, top: f32) -> Result<(), RenderError> {
        let bars = barcode_modules(payload)?;
        let module = BARCODE_W / bars.len().max(1) as f32;
        self.black();
        for (idx, _) in bars.iter().enumerate().filter(|(_, bar)| **bar == 1) {
            self.rect(x + idx as f32 * module, top, module, BARCODE_H, PaintMode::Fill);
        }
        let size = 8.0;
        let text_w = approx_text_width(payload, size);
        self.text(
            payload,
            size,
            x + (BARCODE_W - text_w).max(0.0) / 2.0,
            top + BARCODE_H + 3.5,
            false,
        );
        Ok(())
    }
}

/// Helvetica averages about half an em per character.
fn approx_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5 * PT_TO_MM
}

fn display(record: &ResponseRecord, label: &str) -> String {
    record.get(label).map(FieldValue::to_cell).unwrap_or_default()
}

impl DocumentRenderer for PdfReport {
    fn render(&self, schema: &[Section], record: &ResponseRecord) -> Result<Vec<u8>, RenderError> {
        let sample = display(record, IDENTIFIER_LABEL).trim().to_string();
        let payload = if sample.is_empty() {
            MISSING_SAMPLE.to_string()
        } else {
            sample
        };

        let (doc, page, layer) =
            PdfDocument::new(pdf_safe(&self.title), Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let canvas = Canvas {
            layer: doc.get_page(page).get_layer(layer),
            regular: doc
                .add_builtin_font(BuiltinFont::Helvetica)
                .map_err(|e| RenderError::Pdf(e.to_string()))?,
            bold: doc
                .add_builtin_font(BuiltinFont::HelveticaBold)
                .map_err(|e| RenderError::Pdf(e.to_string()))?,
        };
        canvas
            .layer
            .set_outline_color(Color::Greyscale(Greyscale::new(0.0, None)));
        canvas.layer.set_outline_thickness(0.5);

        // Header: QR left, barcode right, title centred between them.
        canvas.qr(&payload, MARGIN, MARGIN)?;
        canvas.barcode(&payload, PAGE_W - MARGIN - BARCODE_W, MARGIN + 5.0)?;
        let title_w = approx_text_width(&self.title, 16.0);
        canvas.text(
            &self.title,
            16.0,
            (PAGE_W - title_w) / 2.0,
            MARGIN + 8.0 + 7.0,
            false,
        );

        let inner_w = PAGE_W - 2.0 * MARGIN;
        let group_w = inner_w / 2.0;
        let label_w = group_w * LABEL_RATIO;
        let value_w = group_w - label_w;
        let mut top = MARGIN + 8.0 + 10.0 + 8.0;

        for section in schema {
            canvas
                .layer
                .set_fill_color(Color::Greyscale(Greyscale::new(240.0 / 255.0, None)));
            canvas.rect(MARGIN, top, inner_w, SECTION_H, PaintMode::FillStroke);
            canvas.black();
            canvas.text(
                section.title,
                11.0,
                MARGIN + 1.0,
                top + SECTION_H / 2.0 + 11.0 * PT_TO_MM * 0.35,
                true,
            );
            top += SECTION_H;

            let pairs: Vec<(&str, String)> = section
                .fields
                .iter()
                .map(|def| (def.label, display(record, def.label)))
                .collect();
            for line in pairs.chunks(2) {
                for slot in 0..2 {
                    let x = MARGIN + slot as f32 * group_w;
                    let (label, value) = line
                        .get(slot)
                        .map(|(label, value)| (*label, value.as_str()))
                        .unwrap_or(("", ""));
                    canvas.cell(x, top, label_w, ROW_H, label, 7.0, false);
                    canvas.cell(x + label_w, top, value_w, ROW_H, value, 7.0, false);
                }
                top += ROW_H;
            }
            top += 1.0;
        }

        doc.save_to_bytes()
            .map_err(|e| RenderError::Pdf(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FORM_SCHEMA, defaults};

    #[test]
    fn renders_a_pdf() {
        let mut record = defaults();
        record.insert(
            IDENTIFIER_LABEL.to_string(),
            FieldValue::Text("1234".to_string()),
        );
        let bytes = PdfReport::default().render(FORM_SCHEMA, &record).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn blank_sample_still_renders() {
        let bytes = PdfReport::default().render(FORM_SCHEMA, &defaults()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn codes_encode_the_sample() {
        let (width, dark) = qr_modules("1234").unwrap();
        assert_eq!(dark.len(), width * width);
        assert!(dark.iter().any(|d| *d));

        let bars = barcode_modules("1234").unwrap();
        assert!(!bars.is_empty());
        assert_eq!(bars[0], 1);
    }

    #[test]
    fn file_names() {
        assert_eq!(report_file_name("1234"), "amostra_1234.pdf");
        assert_eq!(report_file_name(" 12/34 "), "amostra_12/34.pdf");
        assert_eq!(report_file_name(""), "amostra_sem_numero.pdf");
    }

    #[test]
    fn text_is_reduced_to_latin1() {
        assert_eq!(pdf_safe("a\u{2013}b\u{00A0}c\nd"), "a-b c d");
        assert_eq!(pdf_safe("Óleo ção"), "Óleo ção");
        assert_eq!(pdf_safe("🛢️ ok"), "?? ok");
    }
}
