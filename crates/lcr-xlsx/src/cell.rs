//! Cell codec: raw `<c>` fragments to logical text and back

use lazy_regex::regex_is_match;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use lcr_core::CellAddress;

use crate::error::XlsxResult;
use crate::shared_strings::{decode_excel_escapes, SharedStrings};

/// Attributes that describe the old value and are dropped on rewrite
const VALUE_ATTRIBUTES: &[&[u8]] = &[b"r", b"t", b"cm", b"vm"];

/// A worksheet cell as it appears in the XML, before interpretation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCell {
    /// The `r` attribute
    pub reference: Option<String>,
    /// The `t` attribute
    pub cell_type: Option<String>,
    /// Text of `<v>`
    pub value: Option<String>,
    /// Text of `<f>`
    pub formula: Option<String>,
    /// Concatenated `<t>` text inside `<is>`
    pub inline_text: Option<String>,
}

impl RawCell {
    /// Logical text of the cell.
    ///
    /// Shared-string cells resolve through `table` (an unknown index reads as
    /// empty), then inline strings, then the direct value. Anything else is empty.
    pub fn text(&self, table: &SharedStrings) -> String {
        match self.cell_type.as_deref() {
            Some("s") => self
                .value
                .as_deref()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .and_then(|index| table.get(index))
                .unwrap_or_default()
                .to_string(),
            _ => {
                if let Some(text) = &self.inline_text {
                    return decode_excel_escapes(text);
                }
                match (&self.value, self.cell_type.as_deref()) {
                    (Some(v), Some("str")) => decode_excel_escapes(v),
                    (Some(v), _) => v.clone(),
                    (None, _) => String::new(),
                }
            }
        }
    }
}

/// What a patched cell will hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellContent {
    /// No type, value, formula or inline string
    Blank,
    /// Numeric cell; the literal is written as-is
    Number(String),
    /// Reference into the shared-string table
    SharedString(usize),
}

impl CellContent {
    /// Classify `text` for writing, interning non-numeric text into `table`
    pub fn encode(text: &str, table: &mut SharedStrings) -> Self {
        if text.is_empty() {
            CellContent::Blank
        } else if is_numeric_literal(text) {
            CellContent::Number(text.to_string())
        } else {
            CellContent::SharedString(table.intern(text))
        }
    }

    /// Serialize as a `<c>` element at `address`.
    ///
    /// Attributes of `existing` (style, phonetic flag) are kept, except those
    /// describing the previous value. No previous child content survives.
    pub fn render(&self, address: &CellAddress, existing: Option<&BytesStart<'_>>) -> XlsxResult<Vec<u8>> {
        let reference = address.to_a1_string();
        let mut start = BytesStart::new("c");
        start.push_attribute(("r", reference.as_str()));
        if let Some(existing) = existing {
            for a in existing.attributes().flatten() {
                if !VALUE_ATTRIBUTES.contains(&a.key.as_ref()) {
                    start.push_attribute((a.key.as_ref(), a.value.as_ref()));
                }
            }
        }

        let mut writer = Writer::new(Vec::with_capacity(64));
        match self {
            CellContent::Blank => {
                writer.write_event(Event::Empty(start))?;
            }
            CellContent::Number(literal) => {
                writer.write_event(Event::Start(start))?;
                write_value(&mut writer, literal)?;
                writer.write_event(Event::End(BytesEnd::new("c")))?;
            }
            CellContent::SharedString(index) => {
                start.push_attribute(("t", "s"));
                writer.write_event(Event::Start(start))?;
                write_value(&mut writer, &index.to_string())?;
                writer.write_event(Event::End(BytesEnd::new("c")))?;
            }
        }

        Ok(writer.into_inner())
    }
}

fn write_value(writer: &mut Writer<Vec<u8>>, text: &str) -> XlsxResult<()> {
    writer.write_event(Event::Start(BytesStart::new("v")))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new("v")))?;
    Ok(())
}

/// Optional sign, digits, at most one decimal point. No exponent, no grouping.
pub fn is_numeric_literal(text: &str) -> bool {
    regex_is_match!(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)$", text)
}
