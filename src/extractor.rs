//! Page text extraction from invoice PDFs using lopdf
//!
//! Invoice fields are located by their position relative to fixed phrases, so
//! this module turns one page into an ordered list of non-empty text lines.

use crate::tounicode::ToUnicodeCMap;
use crate::FaturaError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Items whose baselines differ by less than this belong to the same line
const Y_TOLERANCE: f32 = 3.0;

/// Gap between two items on one baseline, in font sizes, that starts a new cell
const CELL_GAP_FACTOR: f32 = 2.0;

/// Average glyph advance as a fraction of the font size
const GLYPH_WIDTH_FACTOR: f32 = 0.5;

/// Largest vertical distance, in font sizes, between stacked cells
const STACK_GAP_FACTOR: f32 = 3.0;

/// Which page of the document to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelector {
    First,
    Last,
}

/// A text item with position information
#[derive(Debug, Clone)]
pub struct TextItem {
    /// The text content
    pub text: String,
    /// X position on page
    pub x: f32,
    /// Y position on page (PDF coordinates, origin at bottom-left)
    pub y: f32,
    /// Rendered font size
    pub font_size: f32,
}

impl TextItem {
    /// Estimated right edge; glyph widths are not read from the font
    fn right(&self) -> f32 {
        self.x + self.text.chars().count() as f32 * self.font_size * GLYPH_WIDTH_FACTOR
    }
}

/// A line of text (grouped text items)
#[derive(Debug, Clone)]
pub struct TextLine {
    pub items: Vec<TextItem>,
    pub y: f32,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.items
            .iter()
            .map(|i| i.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn left(&self) -> f32 {
        self.items.first().map_or(0.0, |i| i.x)
    }

    fn right(&self) -> f32 {
        self.items.iter().map(TextItem::right).fold(self.left(), f32::max)
    }

    fn font_size(&self) -> f32 {
        self.items.iter().map(|i| i.font_size).fold(0.0, f32::max)
    }
}

/// Read the non-empty text lines of one page of a PDF file
pub fn page_lines<P: AsRef<Path>>(
    path: P,
    page: PageSelector,
) -> Result<Vec<String>, FaturaError> {
    let doc = Document::load(path)?;
    page_lines_from_doc(&doc, page)
}

/// Read the non-empty text lines of one page of a PDF held in memory
pub fn page_lines_mem(buffer: &[u8], page: PageSelector) -> Result<Vec<String>, FaturaError> {
    let doc = Document::load_mem(buffer)?;
    page_lines_from_doc(&doc, page)
}

fn page_lines_from_doc(doc: &Document, page: PageSelector) -> Result<Vec<String>, FaturaError> {
    let pages = doc.get_pages();
    let page_id = match page {
        PageSelector::First => pages.values().next(),
        PageSelector::Last => pages.values().next_back(),
    }
    .copied()
    .ok_or(FaturaError::MissingPage)?;

    let items = extract_page_text_items(doc, page_id)?;
    Ok(group_into_lines(items)
        .iter()
        .map(TextLine::text)
        .filter(|line| !line.trim().is_empty())
        .collect())
}

/// Multiply two 2D transformation matrices
/// Matrix format: [a, b, c, d, e, f] representing:
/// | a  b  0 |
/// | c  d  0 |
/// | e  f  1 |
fn multiply_matrices(m1: &[f32; 6], m2: &[f32; 6]) -> [f32; 6] {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

/// Fonts of a page with what is needed to decode their strings
struct PageFonts<'a> {
    dicts: BTreeMap<Vec<u8>, &'a Dictionary>,
    cmaps: HashMap<Vec<u8>, ToUnicodeCMap>,
}

impl<'a> PageFonts<'a> {
    fn load(doc: &'a Document, page_id: ObjectId) -> Self {
        let dicts = doc.get_page_fonts(page_id).unwrap_or_default();
        let cmaps = dicts
            .iter()
            .filter(|(_, dict)| is_composite_font(dict))
            .filter_map(|(name, dict)| {
                ToUnicodeCMap::from_font(doc, dict).map(|cmap| (name.clone(), cmap))
            })
            .collect();
        Self { dicts, cmaps }
    }

    /// Decode a string operand shown with the given font resource name
    fn decode(&self, doc: &Document, font: &[u8], obj: &Object) -> Option<String> {
        let Object::String(bytes, _) = obj else {
            return None;
        };

        if let Some(cmap) = self.cmaps.get(font) {
            return Some(cmap.decode_cids(bytes));
        }

        if let Some(font_dict) = self.dicts.get(font) {
            if let Ok(encoding) = font_dict.get_font_encoding(doc) {
                if let Ok(text) = Document::decode_text(&encoding, bytes) {
                    return Some(text);
                }
            }
        }

        // Fallback: UTF-16BE with BOM, then Latin-1
        if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
            let utf16: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                .collect();
            return Some(String::from_utf16_lossy(&utf16));
        }

        Some(bytes.iter().map(|&b| b as char).collect())
    }
}

fn is_composite_font(dict: &Dictionary) -> bool {
    dict.get(b"Subtype")
        .and_then(Object::as_name)
        .map(|name| name == b"Type0")
        .unwrap_or(false)
}

/// Text and graphics state while walking a content stream
struct TextState {
    ctm: [f32; 6],
    ctm_stack: Vec<[f32; 6]>,
    font: Vec<u8>,
    font_size: f32,
    leading: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    in_text_block: bool,
}

impl TextState {
    const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

    fn new() -> Self {
        Self {
            ctm: Self::IDENTITY,
            ctm_stack: Vec::new(),
            font: Vec::new(),
            font_size: 12.0,
            leading: 0.0,
            text_matrix: Self::IDENTITY,
            line_matrix: Self::IDENTITY,
            in_text_block: false,
        }
    }

    fn next_line(&mut self) {
        let leading = if self.leading != 0.0 {
            self.leading
        } else {
            self.font_size * 1.2
        };
        self.line_matrix[5] -= leading;
        self.text_matrix = self.line_matrix;
    }

    /// Position a shown string at the current point, in page space
    fn place(&self, text: String) -> TextItem {
        let combined = multiply_matrices(&self.text_matrix, &self.ctm);
        TextItem {
            text,
            x: combined[4],
            y: combined[5],
            font_size: effective_font_size(self.font_size, &self.text_matrix),
        }
    }
}

/// Extract text items from a single page, in content stream order
fn extract_page_text_items(
    doc: &Document,
    page_id: ObjectId,
) -> Result<Vec<TextItem>, FaturaError> {
    use lopdf::content::Content;

    let fonts = PageFonts::load(doc, page_id);
    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| FaturaError::Parse(e.to_string()))?;
    let content = Content::decode(&content_data).map_err(|e| FaturaError::Parse(e.to_string()))?;

    let mut items = Vec::new();
    let mut state = TextState::new();

    for op in &content.operations {
        let shown: Option<String> = match op.operator.as_str() {
            "q" => {
                state.ctm_stack.push(state.ctm);
                None
            }
            "Q" => {
                if let Some(saved) = state.ctm_stack.pop() {
                    state.ctm = saved;
                }
                None
            }
            "cm" => {
                if let Some(m) = matrix_operands(&op.operands) {
                    state.ctm = multiply_matrices(&m, &state.ctm);
                }
                None
            }
            "BT" => {
                state.in_text_block = true;
                state.text_matrix = TextState::IDENTITY;
                state.line_matrix = TextState::IDENTITY;
                None
            }
            "ET" => {
                state.in_text_block = false;
                None
            }
            "Tf" => {
                if let [name, size, ..] = op.operands.as_slice() {
                    if let Ok(name) = name.as_name() {
                        state.font = name.to_vec();
                    }
                    if let Some(size) = get_number(size) {
                        state.font_size = size;
                    }
                }
                None
            }
            "TL" => {
                if let Some(leading) = op.operands.first().and_then(get_number) {
                    state.leading = leading;
                }
                None
            }
            "Td" | "TD" => {
                if let [tx, ty, ..] = op.operands.as_slice() {
                    let tx = get_number(tx).unwrap_or(0.0);
                    let ty = get_number(ty).unwrap_or(0.0);
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    state.line_matrix = multiply_matrices(
                        &[1.0, 0.0, 0.0, 1.0, tx, ty],
                        &state.line_matrix,
                    );
                    state.text_matrix = state.line_matrix;
                }
                None
            }
            "Tm" => {
                if let Some(m) = matrix_operands(&op.operands) {
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
                None
            }
            "T*" => {
                state.next_line();
                None
            }
            "Tj" if state.in_text_block => op
                .operands
                .first()
                .and_then(|obj| fonts.decode(doc, &state.font, obj)),
            "TJ" if state.in_text_block => op.operands.first().and_then(|obj| {
                obj.as_array().ok().map(|array| {
                    array
                        .iter()
                        .filter_map(|part| fonts.decode(doc, &state.font, part))
                        .collect::<String>()
                })
            }),
            "'" => {
                state.next_line();
                op.operands
                    .first()
                    .and_then(|obj| fonts.decode(doc, &state.font, obj))
            }
            "\"" => {
                state.next_line();
                op.operands
                    .get(2)
                    .and_then(|obj| fonts.decode(doc, &state.font, obj))
            }
            _ => None,
        };

        if let Some(text) = shown {
            if !text.trim().is_empty() {
                items.push(state.place(text));
            }
        }
    }

    Ok(items)
}

fn matrix_operands(operands: &[Object]) -> Option<[f32; 6]> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = TextState::IDENTITY;
    for (i, operand) in operands.iter().take(6).enumerate() {
        if let Some(v) = get_number(operand) {
            m[i] = v;
        }
    }
    Some(m)
}

/// Helper to get f32 from Object
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Compute effective font size from base size and text matrix
fn effective_font_size(base_size: f32, text_matrix: &[f32; 6]) -> f32 {
    let scale_x = (text_matrix[0].powi(2) + text_matrix[1].powi(2)).sqrt();
    let scale_y = (text_matrix[2].powi(2) + text_matrix[3].powi(2)).sqrt();
    base_size * scale_x.max(scale_y)
}

/// A column of cells stacked directly below each other
struct Block {
    lines: Vec<TextLine>,
    /// Row index of the last cell
    row: usize,
    /// Whether the cells come from rows holding several cells
    multi: bool,
}

impl Block {
    fn accepts(&self, cell: &TextLine, row: usize, multi: bool) -> bool {
        let Some(last) = self.lines.last() else {
            return false;
        };
        let size = last.font_size().max(cell.font_size());
        self.row + 1 == row
            && self.multi == multi
            && last.left() < cell.right()
            && cell.left() < last.right()
            && (last.y - cell.y).abs() <= STACK_GAP_FACTOR * size
    }
}

/// Group text items into lines.
///
/// Rows are built from consecutive items sharing a baseline, in content stream
/// order (which is the slip's reading order), and ordered left to right. A row
/// is cut into cells wherever the horizontal gap exceeds a few font sizes.
/// Cells that sit directly below a cell of the previous row, in a row of the
/// same shape, are stacked into one column, and columns are emitted top to
/// bottom. A value printed above its label therefore stays the line before the
/// label even when several value/label pairs share the same two baselines.
pub fn group_into_lines(items: Vec<TextItem>) -> Vec<TextLine> {
    let mut blocks: Vec<Block> = Vec::new();

    for (row, line) in group_into_rows(items).into_iter().enumerate() {
        let cells = split_cells(line);
        let multi = cells.len() > 1;
        for cell in cells {
            match blocks.iter_mut().find(|b| b.accepts(&cell, row, multi)) {
                Some(block) => {
                    block.row = row;
                    block.lines.push(cell);
                }
                None => blocks.push(Block {
                    lines: vec![cell],
                    row,
                    multi,
                }),
            }
        }
    }

    blocks.into_iter().flat_map(|b| b.lines).collect()
}

/// Merge consecutive items sharing a baseline, sorted left to right
fn group_into_rows(items: Vec<TextItem>) -> Vec<TextLine> {
    let mut rows: Vec<TextLine> = Vec::new();

    for item in items {
        match rows.last_mut() {
            Some(last) if (last.y - item.y).abs() < Y_TOLERANCE => last.items.push(item),
            _ => rows.push(TextLine {
                y: item.y,
                items: vec![item],
            }),
        }
    }

    for row in &mut rows {
        row.items
            .sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    }

    rows
}

/// Cut a row wherever the gap to the previous item is wider than
/// `CELL_GAP_FACTOR` font sizes
fn split_cells(row: TextLine) -> Vec<TextLine> {
    let mut cells: Vec<TextLine> = Vec::new();

    for item in row.items {
        match cells.last_mut() {
            Some(cell)
                if item.x - cell.right()
                    <= CELL_GAP_FACTOR * item.font_size.max(cell.font_size()) =>
            {
                cell.items.push(item)
            }
            _ => cells.push(TextLine {
                y: row.y,
                items: vec![item],
            }),
        }
    }

    cells
}
