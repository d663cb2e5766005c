use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use shared::models::Candle;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

// Field parsing for exchange kline tables.
pub mod kline_format {
    use anyhow::{anyhow, Result};
    use chrono::{DateTime, NaiveDateTime, Utc};

    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

    /// Accepts "2024-01-01 00:14:59.999", "2024-01-01 00:15:00" or epoch milliseconds.
    pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
        let trimmed = s.trim();
        if let Ok(millis) = trimmed.parse::<i64>() {
            return DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| anyhow!("Timestamp '{}' is out of range", s));
        }
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
            .map_err(|e| anyhow!("Failed to parse timestamp '{}': {}", s, e))
    }

    pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
        dt.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn parse_decimal(s: &str) -> Result<f64> {
        let value = s
            .trim()
            .parse::<f64>()
            .map_err(|e| anyhow!("Failed to parse decimal '{}': {}", s, e))?;
        if !value.is_finite() {
            return Err(anyhow!("Decimal '{}' is not finite", s));
        }
        Ok(value)
    }

    // Trade counts are sometimes written with a trailing ".0".
    pub fn parse_count(s: &str) -> Result<u64> {
        let trimmed = s.trim();
        if let Ok(count) = trimmed.parse::<u64>() {
            return Ok(count);
        }
        let value = parse_decimal(trimmed)?;
        if value < 0.0 || value.fract() != 0.0 {
            return Err(anyhow!("Count '{}' is not a non-negative integer", s));
        }
        Ok(value as u64)
    }

}

pub const HEADER: [&str; 11] = [
    "OpenTime",
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
    "CloseTime",
    "QuoteAssetVolume",
    "NumberOfTrades",
    "TakerBuyBaseAssetVolume",
    "TakerBuyQuoteAssetVolume",
];

pub struct KlineCsv;

impl KlineCsv {
    // CSV Header: OpenTime,Open,High,Low,Close,Volume,CloseTime,QuoteAssetVolume,NumberOfTrades,TakerBuyBaseAssetVolume,TakerBuyQuoteAssetVolume[,Ignore]
    // Example Row: 2024-11-01 11:00:00,163.2,163.9,162.8,163.5,10234.1,2024-11-01 11:14:59.999,1671234.5,5321,5120.3,836512.2,0
    pub fn load_candles_from_csv(file_path: &Path) -> Result<Vec<Candle>> {
        let file = File::open(file_path).map_err(|e| {
            EngineError::MarketDataError(format!("Failed to open CSV file '{}': {}", file_path.display(), e))
        })?;
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let headers = rdr.headers()?.clone();
        let mut positions = [0usize; HEADER.len()];
        for (slot, name) in positions.iter_mut().zip(HEADER) {
            *slot = headers.iter().position(|h| h == name).ok_or_else(|| {
                EngineError::CsvDataFormatError(format!(
                    "Missing '{}' column in '{}'",
                    name,
                    file_path.display()
                ))
            })?;
        }

        let mut candles = Vec::new();
        for (idx, result) in rdr.records().enumerate() {
            let line = idx + 2;
            let record = result.map_err(|e| {
                EngineError::CsvDataFormatError(format!("Error reading CSV record at line {}: {}", line, e))
            })?;
            candles.push(Self::parse_record(&record, &positions, line)?);
        }
        tracing::debug!(path = %file_path.display(), count = candles.len(), "Loaded kline table");
        Ok(candles)
    }

    fn parse_record(record: &StringRecord, positions: &[usize; HEADER.len()], line: usize) -> Result<Candle> {
        let row = RowReader { record, positions, line };
        Ok(Candle {
            open_time: row.timestamp(0)?,
            open: row.decimal(1)?,
            high: row.decimal(2)?,
            low: row.decimal(3)?,
            close: row.decimal(4)?,
            volume: row.decimal(5)?,
            close_time: row.timestamp(6)?,
            quote_volume: row.decimal(7)?,
            trade_count: row.count(8)?,
            taker_buy_base: row.decimal(9)?,
            taker_buy_quote: row.decimal(10)?,
        })
    }

    /// Writes `candles` as a complete table, replacing any existing file.
    pub fn write_candles_to_csv(file_path: &Path, candles: &[Candle]) -> Result<()> {
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(file_path)?;
        let mut wtr = WriterBuilder::new().from_writer(BufWriter::new(file));
        wtr.write_record(HEADER)?;
        for c in candles {
            wtr.write_record(&[
                kline_format::format_timestamp(&c.open_time),
                c.open.to_string(),
                c.high.to_string(),
                c.low.to_string(),
                c.close.to_string(),
                c.volume.to_string(),
                kline_format::format_timestamp(&c.close_time),
                c.quote_volume.to_string(),
                c.trade_count.to_string(),
                c.taker_buy_base.to_string(),
                c.taker_buy_quote.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

// Column access for one record, with errors naming the column and line.
struct RowReader<'a> {
    record: &'a StringRecord,
    positions: &'a [usize; HEADER.len()],
    line: usize,
}

impl<'a> RowReader<'a> {
    fn field(&self, col: usize) -> Result<&'a str> {
        self.record.get(self.positions[col]).ok_or_else(|| {
            EngineError::CsvDataFormatError(format!(
                "Missing '{}' field in CSV record at line {}",
                HEADER[col], self.line
            ))
        })
    }

    fn invalid(&self, col: usize, e: anyhow::Error) -> EngineError {
        EngineError::CsvDataFormatError(format!("Error parsing '{}' at line {}: {}", HEADER[col], self.line, e))
    }

    fn timestamp(&self, col: usize) -> Result<DateTime<Utc>> {
        kline_format::parse_timestamp(self.field(col)?).map_err(|e| self.invalid(col, e))
    }

    fn decimal(&self, col: usize) -> Result<f64> {
        kline_format::parse_decimal(self.field(col)?).map_err(|e| self.invalid(col, e))
    }

    fn count(&self, col: usize) -> Result<u64> {
        kline_format::parse_count(self.field(col)?).map_err(|e| self.invalid(col, e))
    }
}
