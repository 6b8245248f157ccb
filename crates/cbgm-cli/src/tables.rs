//! Tabular output: fixed-width, CSV, TSV, and JSON writers shared by the
//! comparison, relationship, relative, and substemma commands.

use std::io::Write;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

/// Output format for the table commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Fixed,
    Csv,
    Tsv,
    Json,
}

impl TableFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "json" => Ok(Self::Json),
            other => Err(anyhow!(
                "unknown table format `{other}` (expected fixed|csv|tsv|json)"
            )),
        }
    }
}

/// A rendered table: a header row plus string cells.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write(&self, format: TableFormat, out: &mut dyn Write) -> Result<()> {
        match format {
            TableFormat::Fixed => self.write_fixed(out),
            TableFormat::Csv => self.write_delimited(out, ','),
            TableFormat::Tsv => self.write_delimited(out, '\t'),
            TableFormat::Json => self.write_json(out),
        }
    }

    fn write_fixed(&self, out: &mut dyn Write) -> Result<()> {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
        let write_line = |out: &mut dyn Write, cells: &[String]| -> Result<()> {
            let mut line = String::new();
            for (i, cell) in cells.iter().enumerate() {
                if i > 0 {
                    line.push_str("  ");
                }
                line.push_str(cell);
                for _ in cell.chars().count()..widths[i] {
                    line.push(' ');
                }
            }
            writeln!(out, "{}", line.trim_end())?;
            Ok(())
        };
        write_line(out, &self.columns)?;
        let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
        write_line(out, &rule)?;
        for row in &self.rows {
            write_line(out, row)?;
        }
        Ok(())
    }

    fn write_delimited(&self, out: &mut dyn Write, sep: char) -> Result<()> {
        let escape = |cell: &str| -> String {
            if sep == ',' && (cell.contains(',') || cell.contains('"')) {
                format!("\"{}\"", cell.replace('"', "\"\""))
            } else {
                cell.to_string()
            }
        };
        writeln!(
            out,
            "{}",
            self.columns
                .iter()
                .map(|c| escape(c))
                .collect::<Vec<_>>()
                .join(&sep.to_string())
        )?;
        for row in &self.rows {
            writeln!(
                out,
                "{}",
                row.iter()
                    .map(|c| escape(c))
                    .collect::<Vec<_>>()
                    .join(&sep.to_string())
            )?;
        }
        Ok(())
    }

    fn write_json(&self, out: &mut dyn Write) -> Result<()> {
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), Value::String(v.clone())))
                    .collect();
                Value::Object(obj)
            })
            .collect();
        serde_json::to_writer_pretty(&mut *out, &json!({ "rows": rows }))?;
        writeln!(out)?;
        Ok(())
    }
}

/// Format a cost for table cells: trailing zeros trimmed, at most four
/// decimal places.
pub fn format_cost(cost: f64) -> String {
    let s = format!("{cost:.4}");
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Format an agreement proportion as a percentage with three decimals.
pub fn format_percent(ratio: f64) -> String {
    format!("{:.3}", ratio * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut t = Table::new(&["WITNESS", "COST"]);
        t.push_row(vec!["W1".into(), "1.5".into()]);
        t.push_row(vec!["W2,x".into(), "0".into()]);
        t
    }

    #[test]
    fn fixed_width_aligns_columns() {
        let mut out = Vec::new();
        sample().write(TableFormat::Fixed, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "WITNESS  COST");
        assert!(lines[1].starts_with("-------"));
        assert!(lines[2].starts_with("W1"));
    }

    #[test]
    fn csv_escapes_embedded_separators() {
        let mut out = Vec::new();
        sample().write(TableFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"W2,x\""));
    }

    #[test]
    fn json_emits_one_object_per_row() {
        let mut out = Vec::new();
        sample().write(TableFormat::Json, &mut out).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["rows"].as_array().unwrap().len(), 2);
        assert_eq!(v["rows"][0]["WITNESS"], "W1");
    }

    #[test]
    fn cost_formatting_trims_trailing_zeros() {
        assert_eq!(format_cost(1.0), "1");
        assert_eq!(format_cost(1.25), "1.25");
        assert_eq!(format_cost(0.0), "0");
    }
}
