//! Positional field extraction for each vendor's payment slip
//!
//! Every slip prints its Multibanco fields next to fixed phrases. The functions
//! here find those phrases in the page's text lines and read the fields at a
//! known offset from them.

use crate::invoice::{Invoice, Vendor};
use crate::FaturaError;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

const GOLD_REFERENCE: &str = "REFERÊNCIA";
const GOLD_ENTITY: &str = "ENTIDADE";
const GOLD_AMOUNT: &str = "MONTANTE";
const EPAL_PAYMENT_BLOCK: &str = "PARA PAGAMENTO EM AGENTES";
const EPAL_DUE_DATE: &str = "DATA LIMITE DE PAGAMENTO";
const EDP_DUE_DATE: &str = "Data limite de pagamento:";

const DATE_FORMAT: &str = "%d-%m-%Y";

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})|(\d{4})[-/.](\d{1,2})[-/.](\d{1,2}))\b").unwrap()
});

static NEXT_READING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)pr[óo]xima\s+leitura").unwrap());

/// Read the vendor's page from a PDF and extract its payment fields
pub fn extract<P: AsRef<Path>>(vendor: Vendor, path: P) -> Result<Invoice, FaturaError> {
    let lines = crate::read_invoice_lines(path.as_ref(), vendor.page())?;
    extract_lines(vendor, &lines)
}

/// Extract payment fields from a page's text lines
pub fn extract_lines(vendor: Vendor, lines: &[String]) -> Result<Invoice, FaturaError> {
    let invoice = match vendor {
        Vendor::Edp => extract_edp(lines),
        Vendor::Epal => extract_epal(lines),
        Vendor::Gold => extract_gold(lines),
    }?;
    log::debug!("{} invoice fields: {:?}", vendor, invoice);
    Ok(invoice)
}

/// Gold Energy: each value sits on the line above its label.
/// The due date is the second-to-last line of the first page.
pub fn extract_gold(lines: &[String]) -> Result<Invoice, FaturaError> {
    let vendor = Vendor::Gold;
    let ref_index = find_line(vendor, lines, GOLD_REFERENCE, 0)?
        .checked_sub(1)
        .ok_or_else(|| layout(vendor, format!("{GOLD_REFERENCE:?} is the first line")))?;

    let reference = field(vendor, lines, ref_index, "reference")?;
    let entity = value_above(vendor, lines, GOLD_ENTITY, ref_index)?;
    let amount = value_above(vendor, lines, GOLD_AMOUNT, ref_index)?;

    let due_index = lines
        .len()
        .checked_sub(2)
        .ok_or_else(|| layout(vendor, "page has fewer than two lines".to_string()))?;
    let due_date = parse_due_date(vendor, &dashed(lines[due_index].trim()))?;

    Ok(Invoice {
        reference,
        entity,
        amount,
        due_date,
        next_reading_date: next_reading_date(lines),
    })
}

/// EPAL: entity, reference and amount follow the agents payment header.
/// The due date is printed year first on the line after its label.
pub fn extract_epal(lines: &[String]) -> Result<Invoice, FaturaError> {
    let vendor = Vendor::Epal;
    let index = find_line(vendor, lines, EPAL_PAYMENT_BLOCK, 0)? + 1;
    let entity = field(vendor, lines, index, "entity")?;
    let reference = field(vendor, lines, index + 1, "reference")?;
    let amount = field(vendor, lines, index + 2, "amount")?;

    let due_index = find_line(vendor, lines, EPAL_DUE_DATE, 0)? + 1;
    let printed = field(vendor, lines, due_index, "due date")?;
    let dashed = dashed(&printed);
    let day_first = dashed.split('-').rev().collect::<Vec<_>>().join("-");
    let due_date = parse_due_date(vendor, &day_first)?;

    Ok(Invoice {
        reference,
        entity,
        amount,
        due_date,
        next_reading_date: next_reading_date(lines),
    })
}

/// EDP: entity, reference, amount and due date follow the due date label,
/// on the last page.
pub fn extract_edp(lines: &[String]) -> Result<Invoice, FaturaError> {
    let vendor = Vendor::Edp;
    let index = find_line(vendor, lines, EDP_DUE_DATE, 0)? + 1;
    let entity = field(vendor, lines, index, "entity")?;
    let reference = field(vendor, lines, index + 1, "reference")?;
    let amount = field(vendor, lines, index + 2, "amount")?;
    let due_date = field(vendor, lines, index + 3, "due date")?;
    let due_date = parse_due_date(vendor, &dashed(&due_date))?;

    Ok(Invoice {
        reference,
        entity,
        amount,
        due_date,
        next_reading_date: next_reading_date(lines),
    })
}

/// First date on the line announcing the next meter reading, or on the line after it
pub fn next_reading_date(lines: &[String]) -> Option<NaiveDate> {
    let index = lines.iter().position(|line| NEXT_READING_RE.is_match(line))?;
    lines[index..]
        .iter()
        .take(2)
        .find_map(|line| find_date(line))
}

/// Find the first `dd-mm-yyyy` or `yyyy-mm-dd` shaped date in a line.
/// `/` and `.` separators are accepted too.
pub fn find_date(line: &str) -> Option<NaiveDate> {
    DATE_RE.captures_iter(line).find_map(|caps| {
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let (day, month, year) = if caps.get(1).is_some() {
            (num(1)?, num(2)?, num(3)?)
        } else {
            (num(6)?, num(5)?, num(4)?)
        };
        NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
    })
}

/// Index of the first line equal to `anchor` (ignoring surrounding whitespace)
/// at or after `from`
fn find_line(
    vendor: Vendor,
    lines: &[String],
    anchor: &str,
    from: usize,
) -> Result<usize, FaturaError> {
    lines
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, line)| line.trim() == anchor)
        .map(|(i, _)| i)
        .ok_or_else(|| layout(vendor, format!("line {anchor:?} not found")))
}

/// The line right above the first `label` found at or after `from`
fn value_above(
    vendor: Vendor,
    lines: &[String],
    label: &str,
    from: usize,
) -> Result<String, FaturaError> {
    let index = find_line(vendor, lines, label, from)?
        .checked_sub(1)
        .ok_or_else(|| layout(vendor, format!("nothing above {label:?}")))?;
    field(vendor, lines, index, &label.to_lowercase())
}

fn field(
    vendor: Vendor,
    lines: &[String],
    index: usize,
    name: &str,
) -> Result<String, FaturaError> {
    let value = lines
        .get(index)
        .map(|line| line.trim())
        .ok_or_else(|| layout(vendor, format!("no {name} line at index {index}")))?;
    if value.is_empty() {
        return Err(layout(vendor, format!("{name} is empty")));
    }
    Ok(value.to_string())
}

/// Replace every non-alphanumeric character with `-`
fn dashed(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

fn parse_due_date(vendor: Vendor, text: &str) -> Result<NaiveDate, FaturaError> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map_err(|e| layout(vendor, format!("due date {text:?}: {e}")))
}

fn layout(vendor: Vendor, reason: String) -> FaturaError {
    FaturaError::Layout { vendor, reason }
}
