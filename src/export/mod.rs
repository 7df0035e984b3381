//! CSV export
//!
//! Renders the history table and the ship-flow tables as CSV for download.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::io::Write;

use crate::flows::{FlowArc, Port, Ship, ShipPosition};
use crate::history::HistoryRow;
use crate::types::format_amount;

/// History table row as written to CSV
#[derive(Debug, Clone, Serialize)]
pub struct HistoryCsvRecord {
    pub timestamp: String,
    pub time: String,
    pub wti_price: Option<String>,
    pub brent_price: Option<String>,
}

impl From<&HistoryRow> for HistoryCsvRecord {
    fn from(row: &HistoryRow) -> Self {
        Self {
            timestamp: row.timestamp.to_rfc3339(),
            time: row.timestamp.format("%H:%M:%S").to_string(),
            wti_price: row.wti_price.map(format_amount),
            brent_price: row.brent_price.map(format_amount),
        }
    }
}

/// Write serializable records with a header row
pub fn write_records<W, T>(writer: W, records: impl IntoIterator<Item = T>) -> Result<()>
where
    W: Write,
    T: Serialize,
{
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
    for record in records {
        writer
            .serialize(record)
            .context("Failed to serialize CSV record")?;
    }
    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

fn to_csv_string<T: Serialize>(records: impl IntoIterator<Item = T>) -> Result<String> {
    let mut buffer = Vec::new();
    write_records(&mut buffer, records)?;
    String::from_utf8(buffer).context("CSV output was not UTF-8")
}

pub fn history_csv(rows: &[HistoryRow]) -> Result<String> {
    to_csv_string(rows.iter().map(HistoryCsvRecord::from))
}

pub fn ports_csv(ports: &[Port]) -> Result<String> {
    to_csv_string(ports)
}

pub fn ships_csv(ships: &[Ship]) -> Result<String> {
    to_csv_string(ships)
}

pub fn positions_csv(positions: &[ShipPosition]) -> Result<String> {
    to_csv_string(positions)
}

pub fn flows_csv(flows: &[FlowArc]) -> Result<String> {
    to_csv_string(flows)
}
