use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mxfkit_klv::{KlvRecord, Label};
use mxfkit_object::Decoded;
use mxfkit_types::{Fields, Value};
use serde::Serialize;

/// Byte values longer than this print as a size marker.
const PREVIEW_BYTES: usize = 32;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// One dumped record.
#[derive(Debug, Serialize)]
pub struct DumpEntry {
    pub offset: u64,
    pub key: Label,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub length_field_width: u8,
    #[serde(skip_serializing_if = "Fields::is_empty")]
    pub fields: Fields,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl DumpEntry {
    /// `symbol` names keys the detailer passed through.
    pub fn new(decoded: Decoded, symbol: impl FnOnce(&Label) -> Option<String>) -> Self {
        match decoded {
            Decoded::Object(object) => Self {
                offset: object.stream_offset,
                key: object.key,
                class: Some(object.object_class),
                length_field_width: object.length_field_width,
                fields: summarize_fields(&object.fields),
                issues: object.issues.iter().map(ToString::to_string).collect(),
            },
            Decoded::Passthrough(record) => Self {
                offset: record.stream_offset,
                class: symbol(&record.key),
                key: record.key,
                length_field_width: record.length_field_width,
                fields: Fields::new(),
                issues: Vec::new(),
            },
        }
    }

    fn class_name(&self) -> &str {
        self.class.as_deref().unwrap_or("?")
    }
}

/// One framed record listed without decoding.
#[derive(Debug, Serialize)]
pub struct KeyEntry {
    pub offset: u64,
    pub key: Label,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub length: u64,
    pub length_field_width: u8,
}

impl KeyEntry {
    pub fn new(record: &KlvRecord, symbol: Option<String>) -> Self {
        Self {
            offset: record.key_offset(),
            key: record.key,
            symbol,
            length: record.length,
            length_field_width: record.length_field_width,
        }
    }
}

/// Replace long byte values with a size marker and render the rest as hex.
pub fn summarize(value: &Value) -> Value {
    match value {
        Value::Bytes(bytes) if bytes.len() > PREVIEW_BYTES => {
            Value::Str(format!("<binary {} bytes>", bytes.len()))
        }
        Value::Bytes(_) => Value::Str(value.to_string()),
        Value::List(items) => Value::List(items.iter().map(summarize).collect()),
        Value::Record(fields) => Value::Record(summarize_fields(fields)),
        other => other.clone(),
    }
}

pub fn summarize_fields(fields: &Fields) -> Fields {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), summarize(value)))
        .collect()
}

/// Prints records as they stream. Table output is collected and printed
/// by [`Printer::finish`].
pub struct Printer {
    format: OutputFormat,
    flatten: bool,
    table: Option<Table>,
}

impl Printer {
    pub fn new(format: OutputFormat, flatten: bool) -> Self {
        Self {
            format,
            flatten,
            table: None,
        }
    }

    pub fn dump(&mut self, entry: &DumpEntry) {
        if self.flatten {
            if entry.fields.is_empty() {
                return;
            }
            match self.format {
                OutputFormat::Json => print_json(&entry.fields),
                OutputFormat::Table => {
                    let table = self.table_with(&["CLASS", "FIELD", "VALUE"]);
                    for (name, value) in &entry.fields {
                        table.add_row(vec![
                            entry.class_name().to_string(),
                            name.clone(),
                            value.to_string(),
                        ]);
                    }
                }
                OutputFormat::Pretty => print_fields(&entry.fields),
            }
            return;
        }

        match self.format {
            OutputFormat::Json => print_json(entry),
            OutputFormat::Table => {
                let table = self.table_with(&["OFFSET", "CLASS", "KEY", "FIELDS", "ISSUES"]);
                table.add_row(vec![
                    entry.offset.to_string(),
                    entry.class_name().to_string(),
                    entry.key.to_string(),
                    entry.fields.len().to_string(),
                    entry.issues.len().to_string(),
                ]);
            }
            OutputFormat::Pretty => {
                println!(
                    "offset={} class={} key={} width={}",
                    entry.offset,
                    entry.class_name(),
                    entry.key,
                    entry.length_field_width
                );
                print_fields(&entry.fields);
                for issue in &entry.issues {
                    println!("  ! {issue}");
                }
            }
        }
    }

    pub fn key(&mut self, entry: &KeyEntry) {
        match self.format {
            OutputFormat::Json => print_json(entry),
            OutputFormat::Table => {
                let table = self.table_with(&["OFFSET", "KEY", "SYMBOL", "LENGTH", "WIDTH"]);
                table.add_row(vec![
                    entry.offset.to_string(),
                    entry.key.to_string(),
                    entry.symbol.clone().unwrap_or_default(),
                    entry.length.to_string(),
                    entry.length_field_width.to_string(),
                ]);
            }
            OutputFormat::Pretty => println!(
                "offset={} key={} symbol={} length={} width={}",
                entry.offset,
                entry.key,
                entry.symbol.as_deref().unwrap_or("?"),
                entry.length,
                entry.length_field_width
            ),
        }
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            println!("{table}");
        }
    }

    fn table_with(&mut self, header: &[&str]) -> &mut Table {
        self.table.get_or_insert_with(|| {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(header.to_vec());
            table
        })
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_fields(fields: &Fields) {
    for (name, value) in fields {
        println!("  {name}: {value}");
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn summarize_shortens_long_bytes() {
        let long = Value::Bytes(Bytes::from(vec![0u8; 100]));
        assert_eq!(summarize(&long), Value::Str("<binary 100 bytes>".into()));

        let short = Value::Bytes(Bytes::from_static(&[0x0a, 0xff]));
        assert_eq!(summarize(&short), Value::Str("0aff".into()));

        let nested = Value::List(vec![long, Value::Int(3)]);
        assert_eq!(
            summarize(&nested),
            Value::List(vec![Value::Str("<binary 100 bytes>".into()), Value::Int(3)])
        );
    }

    #[test]
    fn passthrough_entries_take_the_resolved_symbol() {
        let key: Label = "060e2b34.01010102.03010210.01000000".parse().unwrap();
        let mut record = KlvRecord::new(key, vec![0u8; 3], 4);
        record.stream_offset = 20;

        let entry = DumpEntry::new(Decoded::Passthrough(record.clone()), |_| {
            Some("KLVFill".to_string())
        });
        assert_eq!(entry.class.as_deref(), Some("KLVFill"));
        assert_eq!(entry.offset, 20);
        assert!(entry.fields.is_empty());

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["class"], "KLVFill");
        assert!(json.get("fields").is_none());

        let listed = KeyEntry::new(&record, None);
        assert_eq!(listed.offset, 0);
        assert_eq!(listed.length, 3);
    }
}
