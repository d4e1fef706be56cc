//! Shared-string table (`xl/sharedStrings.xml`)

use ahash::AHashMap;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{XlsxError, XlsxResult};

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// Ordered, append-only pool of the package's string values.
///
/// Entries read from the part keep their original `<si>` markup (rich text
/// runs, phonetic hints), so re-serializing only appends. An entry's position
/// is its index for as long as the table lives.
#[derive(Debug, Clone)]
pub struct SharedStrings {
    root: BytesStart<'static>,
    items: Vec<String>,
    markup: Vec<String>,
    index: AHashMap<String, usize>,
    appended: usize,
}

impl Default for SharedStrings {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStrings {
    /// An empty table
    pub fn new() -> Self {
        Self {
            root: BytesStart::new("sst").with_attributes([("xmlns", MAIN_NS)]),
            items: Vec::new(),
            markup: Vec::new(),
            index: AHashMap::new(),
            appended: 0,
        }
    }

    /// Parse a shared-string part
    pub fn parse(xml: &[u8]) -> XlsxResult<Self> {
        let mut table = Self::new();
        let mut reader = Reader::from_reader(xml);

        let mut si_start: Option<usize> = None;
        let mut current = String::new();
        let mut in_t = false;
        let mut in_phonetic = false;

        loop {
            let position = reader.buffer_position();
            match reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"sst" => table.root = e.into_owned(),
                    b"si" => {
                        si_start = Some(position);
                        current.clear();
                    }
                    b"rPh" => in_phonetic = true,
                    b"t" if si_start.is_some() && !in_phonetic => in_t = true,
                    _ => {}
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"sst" => table.root = e.into_owned(),
                    b"si" => {
                        let fragment = utf8_slice(xml, position, reader.buffer_position())?;
                        table.push_parsed(String::new(), fragment);
                    }
                    _ => {}
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"si" => {
                        let start = si_start.take().ok_or_else(|| {
                            XlsxError::InvalidFormat("unbalanced <si> in shared strings".into())
                        })?;
                        let fragment = utf8_slice(xml, start, reader.buffer_position())?;
                        let text = decode_excel_escapes(&current);
                        table.push_parsed(text, fragment);
                    }
                    b"rPh" => in_phonetic = false,
                    b"t" => in_t = false,
                    _ => {}
                },
                Event::Text(e) if in_t => {
                    current.push_str(&e.unescape()?);
                }
                Event::CData(e) if in_t => {
                    current.push_str(&String::from_utf8_lossy(&e));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        log::debug!("parsed {} shared strings", table.items.len());
        Ok(table)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of entries appended since the table was parsed
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Plain text of entry `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(String::as_str)
    }

    /// Index of the first entry whose plain text equals `text`
    pub fn position(&self, text: &str) -> Option<usize> {
        self.index.get(text).copied()
    }

    /// Index of `text`, appending it when absent
    pub fn intern(&mut self, text: &str) -> usize {
        if let Some(index) = self.position(text) {
            return index;
        }

        let index = self.items.len();
        self.items.push(text.to_string());
        self.markup.push(si_markup(text));
        self.index.insert(text.to_string(), index);
        self.appended += 1;
        index
    }

    /// Serialize the part with `count`/`uniqueCount` matching the table size
    pub fn to_xml(&self) -> XlsxResult<Vec<u8>> {
        let total = self.items.len().to_string();
        let name = String::from_utf8_lossy(self.root.name().as_ref()).into_owned();

        let mut root = BytesStart::new(name.clone());
        for a in self.root.attributes().flatten() {
            if a.key.as_ref() != b"count" && a.key.as_ref() != b"uniqueCount" {
                root.push_attribute((a.key.as_ref(), a.value.as_ref()));
            }
        }
        root.push_attribute(("count", total.as_str()));
        root.push_attribute(("uniqueCount", total.as_str()));

        let capacity = self.markup.iter().map(String::len).sum::<usize>() + 256;
        let mut writer = Writer::new(Vec::with_capacity(capacity));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        writer.get_mut().push(b'\n');
        writer.write_event(Event::Start(root))?;
        for fragment in &self.markup {
            writer.get_mut().extend_from_slice(fragment.as_bytes());
        }
        writer.write_event(Event::End(BytesEnd::new(name)))?;

        Ok(writer.into_inner())
    }

    fn push_parsed(&mut self, text: String, markup: String) {
        let index = self.items.len();
        self.index.entry(text.clone()).or_insert(index);
        self.items.push(text);
        self.markup.push(markup);
    }
}

fn utf8_slice(xml: &[u8], start: usize, end: usize) -> XlsxResult<String> {
    let bytes = xml
        .get(start..end)
        .ok_or_else(|| XlsxError::InvalidFormat("shared string out of range".into()))?;
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| XlsxError::InvalidFormat(format!("shared strings are not UTF-8: {e}")))
}

/// `<si>` markup for a new plain-text entry
fn si_markup(text: &str) -> String {
    let encoded = encode_excel_escapes(text);
    let escaped = quick_xml::escape::escape(encoded.as_str());
    let preserve = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
    if preserve {
        format!(r#"<si><t xml:space="preserve">{escaped}</t></si>"#)
    } else {
        format!("<si><t>{escaped}</t></si>")
    }
}

/// Decode Excel's `_xHHHH_` escape sequences in strings.
///
/// Excel uses this format to encode characters XML cannot carry:
/// - `_x000d_` = CR (carriage return)
/// - `_x0001_` = a control character
/// - `_x005f_` = an escaped underscore
pub(crate) fn decode_excel_escapes(s: &str) -> String {
    if !s.contains("_x") {
        return s.to_string();
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find("_x") {
        result.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        let decoded = candidate
            .get(2..6)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .filter(|_| candidate.as_bytes().get(6) == Some(&b'_'))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);

        match decoded {
            Some(c) => {
                result.push(c);
                rest = &candidate[7..];
            }
            None => {
                result.push('_');
                rest = &candidate[1..];
            }
        }
    }

    result.push_str(rest);
    result
}

/// Inverse of [`decode_excel_escapes`]: protect literal `_xHHHH_` runs and
/// encode characters that XML 1.0 cannot represent.
pub(crate) fn encode_excel_escapes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());

    for (i, c) in s.char_indices() {
        match c {
            '_' if looks_like_escape(&s[i..]) => result.push_str("_x005F_"),
            '\t' | '\n' => result.push(c),
            c if (c as u32) < 0x20 => result.push_str(&format!("_x{:04X}_", c as u32)),
            c => result.push(c),
        }
    }

    result
}

fn looks_like_escape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 7
        && bytes[1] == b'x'
        && bytes[2..6].iter().all(u8::is_ascii_hexdigit)
        && bytes[6] == b'_'
}
