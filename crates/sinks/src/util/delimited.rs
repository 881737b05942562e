//! Delimited row rendering
//!
//! Turns decoded rows into CSV or TSV lines, one line per row:
//!
//! - CSV quotes a field containing a comma, a quote or a line break, and
//!   doubles embedded quotes (RFC 4180)
//! - TSV escapes backslash, tab, CR and LF with a backslash
//! - nulls are written as a bare `NULL` in both flavors

use std::fmt::Write as _;

use chrono::DateTime;

use export_config::OutputFormat;
use export_protocol::{ExportRow, INTERNAL_COLUMN_COUNT, Value};

/// Text written for a null value
pub const NULL_TEXT: &str = "NULL";

/// Timestamp layout (UTC, microseconds)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Renders rows as delimited text
#[derive(Debug, Clone, Copy)]
pub struct RowFormatter {
    format: OutputFormat,
    skip_internals: bool,
}

impl RowFormatter {
    pub fn new(format: OutputFormat, skip_internals: bool) -> Self {
        Self {
            format,
            skip_internals,
        }
    }

    #[inline]
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Index of the first column written
    #[inline]
    pub fn first_column(&self) -> usize {
        if self.skip_internals {
            INTERNAL_COLUMN_COUNT
        } else {
            0
        }
    }

    #[inline]
    fn separator(&self) -> char {
        match self.format {
            OutputFormat::Csv => ',',
            OutputFormat::Tsv => '\t',
        }
    }

    /// Append one line for `row` to `out`
    pub fn write_row(&self, row: &ExportRow, out: &mut String) {
        let mut field = String::new();
        for (i, value) in row.values_from(self.first_column()).iter().enumerate() {
            if i > 0 {
                out.push(self.separator());
            }
            if value.is_null() {
                out.push_str(NULL_TEXT);
                continue;
            }
            field.clear();
            render_value(value, &mut field);
            match self.format {
                OutputFormat::Csv => push_csv_field(&field, out),
                OutputFormat::Tsv => push_tsv_field(&field, out),
            }
        }
        out.push('\n');
    }

    /// Render one row as a line
    pub fn format_row(&self, row: &ExportRow) -> String {
        let mut out = String::new();
        self.write_row(row, &mut out);
        out
    }
}

/// Render a non-null value as plain text
pub fn render_value(value: &Value, out: &mut String) {
    // Writing to a String cannot fail
    let _ = match value {
        Value::Null => {
            out.push_str(NULL_TEXT);
            Ok(())
        }
        Value::TinyInt(v) => write!(out, "{v}"),
        Value::SmallInt(v) => write!(out, "{v}"),
        Value::Integer(v) => write!(out, "{v}"),
        Value::BigInt(v) => write!(out, "{v}"),
        Value::Float(v) => write!(out, "{v}"),
        Value::Timestamp(micros) => match DateTime::from_timestamp_micros(*micros) {
            Some(at) => write!(out, "{}", at.format(TIMESTAMP_FORMAT)),
            None => write!(out, "{micros}"),
        },
        Value::String(s) => {
            out.push_str(s);
            Ok(())
        }
        Value::VarBinary(bytes) | Value::Geography(bytes) => {
            out.push_str(&hex::encode(bytes));
            Ok(())
        }
        Value::Decimal(d) => write!(out, "{d}"),
        Value::GeographyPoint {
            longitude,
            latitude,
        } => write!(out, "POINT ({longitude} {latitude})"),
    };
}

fn push_csv_field(field: &str, out: &mut String) {
    if !field.contains([',', '"', '\n', '\r']) {
        out.push_str(field);
        return;
    }
    out.push('"');
    for c in field.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
}

fn push_tsv_field(field: &str, out: &mut String) {
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
#[path = "delimited_test.rs"]
mod delimited_test;
