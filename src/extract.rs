//! Raw document → intermediate form.
//!
//! | Form | Input | Method |
//! |------|-------|--------|
//! | `plain_text` | PDF bytes | `pdf-extract` over the whole document |
//! | `table_grid` | PDF bytes | positioned text runs and ruling lines from each page's content stream (`lopdf`) |
//! | `dom_listing` | browser listing | passed through |
//!
//! Every failure is [`ExtractError::Malformed`] and terminal for the
//! source. PDF decoding is CPU-bound; the pipeline calls
//! [`extract_blocking`], which runs it on the blocking pool and turns a
//! panicking decoder into an error.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use lopdf::content::Content;
use lopdf::{Document, Encoding, Object, ObjectId};

use roster_core::{ExtractError, IntermediateData, IntermediateForm, RawDocument, TablePage};

/// Runs whose baselines differ by at most this many points share a row.
const ROW_TOLERANCE: f32 = 2.0;

/// Runs whose x-starts lie within this many points of a column's first
/// run share that column (pages without vertical rules).
const COLUMN_TOLERANCE: f32 = 6.0;

/// Rules closer than this are one rule; text this close to a vertical
/// rule belongs to the cell on its right.
const RULE_TOLERANCE: f32 = 1.0;

/// Shorter segments are glyph decoration, not table rules.
const MIN_RULE_LENGTH: f32 = 4.0;

/// A `TJ` kerning adjustment at least this wide (thousandths of an em)
/// is rendered as a word gap.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Convert `raw` into the intermediate `form`.
pub fn extract(raw: RawDocument, form: IntermediateForm) -> Result<IntermediateData, ExtractError> {
    match (form, raw) {
        (IntermediateForm::PlainText, RawDocument::Bytes { bytes, .. }) => {
            extract_plain_text(&bytes).map(IntermediateData::PlainText)
        }
        (IntermediateForm::TableGrid, RawDocument::Bytes { bytes, .. }) => {
            extract_table_grid(&bytes).map(IntermediateData::TableGrid)
        }
        (IntermediateForm::DomListing, RawDocument::Listing { items, .. }) => {
            if items.iter().all(|i| i.trim().is_empty()) {
                Err(ExtractError::Malformed("listing is empty".to_string()))
            } else {
                Ok(IntermediateData::DomListing(items))
            }
        }
        (form, raw) => Err(ExtractError::Malformed(format!(
            "cannot extract {} from {}",
            form,
            match raw {
                RawDocument::Bytes { .. } => "a downloaded document",
                RawDocument::Listing { .. } => "a DOM listing",
            }
        ))),
    }
}

/// [`extract`] on the blocking thread pool.
pub async fn extract_blocking(
    raw: RawDocument,
    form: IntermediateForm,
) -> Result<IntermediateData, ExtractError> {
    tokio::task::spawn_blocking(move || extract(raw, form))
        .await
        .map_err(|e| ExtractError::Malformed(format!("extraction task failed: {}", e)))?
}

pub fn extract_plain_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractError::Malformed(format!("PDF text extraction failed: {}", e)))?;
    if text.trim().is_empty() {
        return Err(ExtractError::Malformed("PDF contains no text".to_string()));
    }
    Ok(text)
}

/// One `Tj`/`TJ` show at its text-space origin.
#[derive(Debug, Clone, PartialEq)]
struct TextRun {
    x: f32,
    y: f32,
    text: String,
}

/// Ruling lines stroked or filled on a page.
#[derive(Debug, Default)]
struct Rules {
    /// y of each horizontal rule, ascending.
    horizontal: Vec<f32>,
    /// x of each vertical rule, ascending.
    vertical: Vec<f32>,
}

impl Rules {
    fn segment(&mut self, (x0, y0): (f32, f32), (x1, y1): (f32, f32)) {
        if (y1 - y0).abs() <= RULE_TOLERANCE && (x1 - x0).abs() >= MIN_RULE_LENGTH {
            self.horizontal.push(y0);
        } else if (x1 - x0).abs() <= RULE_TOLERANCE && (y1 - y0).abs() >= MIN_RULE_LENGTH {
            self.vertical.push(x0);
        }
    }

    fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        if h.abs() <= RULE_TOLERANCE || w.abs() <= RULE_TOLERANCE {
            // A hairline drawn as a filled rectangle.
            self.segment((x, y), (x + w, y + h));
            return;
        }
        self.horizontal.extend([y, y + h]);
        self.vertical.extend([x, x + w]);
    }

    fn finish(self) -> Self {
        Rules {
            horizontal: cluster_starts(self.horizontal, RULE_TOLERANCE),
            vertical: cluster_starts(self.vertical, RULE_TOLERANCE),
        }
    }
}

/// First value of each cluster in `values`, ascending. A cluster spans
/// `tolerance` from its first value, so `v` belongs to the last start
/// that is `<= v`.
fn cluster_starts(mut values: Vec<f32>, tolerance: f32) -> Vec<f32> {
    values.sort_by(f32::total_cmp);
    let mut starts: Vec<f32> = Vec::new();
    for v in values {
        match starts.last() {
            Some(start) if v - start <= tolerance => {}
            _ => starts.push(v),
        }
    }
    starts
}

/// Tracks the text line matrix origin through a content stream.
///
/// Scaling, rotation, and `cm` are ignored; roster tables are laid out
/// with plain translations, which is all cell placement needs.
#[derive(Default)]
struct TextCursor {
    line_x: f32,
    line_y: f32,
    leading: f32,
    /// Set by a positioning operator; the next show starts a new run.
    moved: bool,
}

impl TextCursor {
    fn begin(&mut self) {
        *self = TextCursor {
            leading: self.leading,
            moved: true,
            ..TextCursor::default()
        };
    }

    fn set(&mut self, x: f32, y: f32) {
        self.line_x = x;
        self.line_y = y;
        self.moved = true;
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        self.set(self.line_x + tx, self.line_y + ty);
    }

    fn next_line(&mut self) {
        self.translate(0.0, -self.leading);
    }
}

fn number(operands: &[Object], i: usize) -> Option<f32> {
    operands.get(i).and_then(|o| o.as_float().ok())
}

/// Decoders for the page's fonts that declare an encoding or a
/// `ToUnicode` map, keyed by resource name.
fn page_encodings(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, Encoding<'_>> {
    let Ok(fonts) = doc.get_page_fonts(page_id) else {
        return HashMap::new();
    };
    fonts
        .into_iter()
        .filter(|(_, font)| font.get(b"Encoding").is_ok() || font.get(b"ToUnicode").is_ok())
        .filter_map(|(name, font)| match font.get_font_encoding(doc) {
            Ok(encoding) => Some((name, encoding)),
            Err(e) => {
                tracing::debug!(font = %String::from_utf8_lossy(&name), error = %e, "unsupported font encoding");
                None
            }
        })
        .collect()
}

/// Fallback for fonts without a usable encoding: UTF-16 with a byte order
/// mark, otherwise one byte per character.
fn decode_bytes(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn decode_string(bytes: &[u8], encoding: Option<&Encoding<'_>>) -> String {
    encoding
        .and_then(|enc| Document::decode_text(enc, bytes).ok())
        .unwrap_or_else(|| decode_bytes(bytes))
}

fn shown_text(operand: &Object, encoding: Option<&Encoding<'_>>) -> String {
    match operand {
        Object::String(bytes, _) => decode_string(bytes, encoding),
        Object::Array(items) => {
            let mut out = String::new();
            for item in items {
                match item {
                    Object::String(bytes, _) => out.push_str(&decode_string(bytes, encoding)),
                    other => {
                        if let Ok(adjust) = other.as_float() {
                            if -adjust >= TJ_SPACE_THRESHOLD && !out.ends_with(' ') {
                                out.push(' ');
                            }
                        }
                    }
                }
            }
            out
        }
        _ => String::new(),
    }
}

/// Text runs and ruling lines of one page's content stream.
fn scan_page(content: &Content, encodings: &HashMap<Vec<u8>, Encoding<'_>>) -> (Vec<TextRun>, Rules) {
    let mut runs: Vec<TextRun> = Vec::new();
    let mut rules = Rules::default();
    let mut cursor = TextCursor::default();
    let mut font: Option<&[u8]> = None;
    let mut pen: Option<(f32, f32)> = None;

    for op in &content.operations {
        let operands = &op.operands;
        let encoding = font.and_then(|name| encodings.get(name));
        let shown = match op.operator.as_str() {
            "BT" => {
                cursor.begin();
                None
            }
            "Tf" => {
                font = operands.first().and_then(|o| o.as_name().ok());
                None
            }
            "Tm" => {
                if let (Some(e), Some(f)) = (number(operands, 4), number(operands, 5)) {
                    cursor.set(e, f);
                }
                None
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (number(operands, 0), number(operands, 1)) {
                    cursor.translate(tx, ty);
                }
                None
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (number(operands, 0), number(operands, 1)) {
                    cursor.leading = -ty;
                    cursor.translate(tx, ty);
                }
                None
            }
            "TL" => {
                if let Some(leading) = number(operands, 0) {
                    cursor.leading = leading;
                }
                None
            }
            "T*" => {
                cursor.next_line();
                None
            }
            "Tj" | "TJ" => operands.first().map(|o| shown_text(o, encoding)),
            "'" => {
                cursor.next_line();
                operands.first().map(|o| shown_text(o, encoding))
            }
            "\"" => {
                cursor.next_line();
                operands.get(2).map(|o| shown_text(o, encoding))
            }
            "m" => {
                pen = number(operands, 0).zip(number(operands, 1));
                None
            }
            "l" => {
                let to = number(operands, 0).zip(number(operands, 1));
                if let (Some(from), Some(to)) = (pen, to) {
                    rules.segment(from, to);
                }
                pen = to;
                None
            }
            "re" => {
                if let (Some(x), Some(y), Some(w), Some(h)) = (
                    number(operands, 0),
                    number(operands, 1),
                    number(operands, 2),
                    number(operands, 3),
                ) {
                    rules.rect(x, y, w, h);
                }
                None
            }
            _ => None,
        };

        let Some(text) = shown else { continue };
        match runs.last_mut() {
            Some(last) if !cursor.moved => last.text.push_str(&text),
            _ => runs.push(TextRun {
                x: cursor.line_x,
                y: cursor.line_y,
                text,
            }),
        }
        cursor.moved = false;
    }

    (runs, rules.finish())
}

/// Place runs into a grid of rows (top to bottom) and cells (left to
/// right).
///
/// Columns come from the page's vertical rules when it has at least two,
/// otherwise from clustering run x-starts. Every row carries one cell
/// per column, `""` where the column is blank. Rows come from horizontal
/// rules when there are at least two, and then runs stacked inside one
/// cell join with `\n`; otherwise each baseline is a row.
fn runs_to_rows(mut runs: Vec<TextRun>, rules: &Rules) -> Vec<Vec<String>> {
    runs.retain(|r| !r.text.trim().is_empty());
    if runs.is_empty() {
        return Vec::new();
    }

    let ruled_columns = rules.vertical.len() >= 2;
    let column_starts = if ruled_columns {
        rules.vertical.clone()
    } else {
        cluster_starts(runs.iter().map(|r| r.x).collect(), COLUMN_TOLERANCE)
    };
    let column_of = |x: f32| -> usize {
        if ruled_columns {
            column_starts.iter().filter(|&&c| c <= x + RULE_TOLERANCE).count()
        } else {
            column_starts.iter().filter(|&&c| c <= x).count()
        }
    };

    let ruled_rows = rules.horizontal.len() >= 2;
    // Baselines clustered top-down, via negated y.
    let baseline_starts = cluster_starts(runs.iter().map(|r| -r.y).collect(), ROW_TOLERANCE);
    let row_of = |y: f32| -> usize {
        if ruled_rows {
            rules.horizontal.iter().filter(|&&h| h > y).count()
        } else {
            baseline_starts.iter().filter(|&&b| b <= -y).count()
        }
    };

    // Only columns that hold text on this page get a cell.
    let used: BTreeSet<usize> = runs.iter().map(|r| column_of(r.x)).collect();
    let index: HashMap<usize, usize> = used.iter().enumerate().map(|(i, c)| (*c, i)).collect();

    runs.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));
    let mut rows: BTreeMap<usize, Vec<(String, Option<f32>)>> = BTreeMap::new();
    for run in &runs {
        let cells = rows
            .entry(row_of(run.y))
            .or_insert_with(|| vec![(String::new(), None); used.len()]);
        let (cell, last_y) = &mut cells[index[&column_of(run.x)]];
        match *last_y {
            None => {}
            Some(y) if (y - run.y).abs() <= ROW_TOLERANCE => cell.push(' '),
            Some(_) => cell.push('\n'),
        }
        cell.push_str(run.text.trim());
        *last_y = Some(run.y);
    }

    rows.into_values()
        .map(|cells| cells.into_iter().map(|(text, _)| text).collect())
        .collect()
}

pub fn extract_table_grid(bytes: &[u8]) -> Result<Vec<TablePage>, ExtractError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| ExtractError::Malformed(format!("PDF parse failed: {}", e)))?;

    let mut pages = Vec::new();
    for (page_no, page_id) in doc.get_pages() {
        let data = doc.get_page_content(page_id).map_err(|e| {
            ExtractError::Malformed(format!("page {}: unreadable content: {}", page_no, e))
        })?;
        let content = Content::decode(&data).map_err(|e| {
            ExtractError::Malformed(format!("page {}: undecodable content: {}", page_no, e))
        })?;
        let encodings = page_encodings(&doc, page_id);
        let (runs, rules) = scan_page(&content, &encodings);
        pages.push(TablePage {
            rows: runs_to_rows(runs, &rules),
        });
    }

    if pages.iter().all(|p| p.rows.is_empty()) {
        return Err(ExtractError::Malformed("no table cells found".to_string()));
    }
    Ok(pages)
}
