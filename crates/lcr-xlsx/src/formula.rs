//! A1 reference shifting in formula text

use lazy_regex::regex;
use lcr_core::{CellAddress, MAX_COLS, MAX_ROWS};

/// Rewrite `formula` as it reads when copied `rows` down and `cols` right.
///
/// Relative parts of A1 references move and `$`-anchored parts stay. String
/// literals and quoted sheet names are copied unchanged. A reference moved
/// off the sheet becomes `#REF!`. Whole-row and whole-column references
/// (`1:1`, `A:A`) are left as written.
pub fn shift_references(formula: &str, rows: i64, cols: i64) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut rest = formula;
    while let Some(start) = rest.find(|c: char| c == '"' || c == '\'') {
        out.push_str(&shift_unquoted(&rest[..start], rows, cols));
        let end = start + quoted_len(&rest[start..]);
        out.push_str(&rest[start..end]);
        rest = &rest[end..];
    }
    out.push_str(&shift_unquoted(rest, rows, cols));
    out
}

/// Length of the quoted run opening `s`, closing quote included. A doubled
/// quote inside the run is an escaped one.
fn quoted_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let quote = bytes[0];
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '\\')
}

fn shift_unquoted(text: &str, rows: i64, cols: i64) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    for caps in regex!(r"(\$?)([A-Z]{1,3})(\$?)([0-9]{1,7})").captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        // Part of a name, a number or a function call such as LOG10(
        let before = text[..whole.start()].chars().next_back();
        let after = text[whole.end()..].chars().next();
        if before.is_some_and(is_name_char) || after.is_some_and(|c| is_name_char(c) || c == '(') {
            continue;
        }

        let part = |i: usize| caps.get(i).map_or("", |m| m.as_str());
        let Some(shifted) = shift_one(!part(1).is_empty(), part(2), !part(3).is_empty(), part(4), rows, cols)
        else {
            continue;
        };
        out.push_str(&text[copied..whole.start()]);
        out.push_str(&shifted);
        copied = whole.end();
    }
    out.push_str(&text[copied..]);
    out
}

/// The moved reference, or `None` when the text is not a cell reference
fn shift_one(
    col_fixed: bool,
    letters: &str,
    row_fixed: bool,
    digits: &str,
    rows: i64,
    cols: i64,
) -> Option<String> {
    let col = i64::from(CellAddress::letters_to_column(letters).ok()?);
    let row = digits.parse::<i64>().ok()? - 1;
    if !(0..i64::from(MAX_ROWS)).contains(&row) {
        return None;
    }

    let col = if col_fixed { col } else { col + cols };
    let row = if row_fixed { row } else { row + rows };
    if !(0..i64::from(MAX_COLS)).contains(&col) || !(0..i64::from(MAX_ROWS)).contains(&row) {
        return Some("#REF!".to_string());
    }

    Some(format!(
        "{}{}{}{}",
        if col_fixed { "$" } else { "" },
        CellAddress::column_to_letters(col as u16),
        if row_fixed { "$" } else { "" },
        row + 1
    ))
}
