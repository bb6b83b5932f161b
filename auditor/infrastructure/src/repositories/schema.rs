use arrow::array::{
    Array, ArrayRef, Decimal128Array, RecordBatch, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use auditor_domain::{Candle, CandleValidationError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

pub const DECIMAL_PRECISION: u8 = 28;
pub const DECIMAL_SCALE: u32 = 8;

const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Missing or mistyped column '{0}'")]
    MissingColumn(&'static str),

    #[error("Timestamp out of range: {0}")]
    InvalidTimestamp(i64),

    #[error("Decimal out of range in column '{column}': {reason}")]
    InvalidDecimal { column: &'static str, reason: String },

    #[error("Invalid candle row: {0}")]
    InvalidCandle(#[from] CandleValidationError),
}

pub fn candle_schema() -> Arc<Schema> {
    let mut fields = vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("symbol", DataType::Utf8, false),
        Field::new("timeframe", DataType::Utf8, false),
    ];
    fields.extend(PRICE_COLUMNS.iter().map(|name| {
        Field::new(
            *name,
            DataType::Decimal128(DECIMAL_PRECISION, DECIMAL_SCALE as i8),
            false,
        )
    }));
    Arc::new(Schema::new(fields))
}

pub fn candles_to_record_batch(candles: &[Candle]) -> Result<RecordBatch, SchemaError> {
    let timestamps: Vec<i64> = candles
        .iter()
        .map(|c| c.timestamp().timestamp_micros())
        .collect();
    let symbols: Vec<&str> = candles.iter().map(|c| c.symbol()).collect();
    let timeframes: Vec<&str> = candles.iter().map(|c| c.timeframe()).collect();

    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC")),
        Arc::new(StringArray::from(symbols)),
        Arc::new(StringArray::from(timeframes)),
    ];

    let getters: [fn(&Candle) -> Decimal; 5] = [
        Candle::open,
        Candle::high,
        Candle::low,
        Candle::close,
        Candle::volume,
    ];
    for getter in getters {
        let values: Vec<i128> = candles.iter().map(|c| to_mantissa(getter(c))).collect();
        arrays.push(Arc::new(
            Decimal128Array::from(values)
                .with_precision_and_scale(DECIMAL_PRECISION, DECIMAL_SCALE as i8)?,
        ));
    }

    Ok(RecordBatch::try_new(candle_schema(), arrays)?)
}

pub fn record_batch_to_candles(batch: &RecordBatch) -> Result<Vec<Candle>, SchemaError> {
    let timestamps = column::<TimestampMicrosecondArray>(batch, "timestamp")?;
    let symbols = column::<StringArray>(batch, "symbol")?;
    let timeframes = column::<StringArray>(batch, "timeframe")?;
    let open = column::<Decimal128Array>(batch, "open")?;
    let high = column::<Decimal128Array>(batch, "high")?;
    let low = column::<Decimal128Array>(batch, "low")?;
    let close = column::<Decimal128Array>(batch, "close")?;
    let volume = column::<Decimal128Array>(batch, "volume")?;

    let mut candles = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let micros = timestamps.value(row);
        let timestamp = DateTime::<Utc>::from_timestamp_micros(micros)
            .ok_or(SchemaError::InvalidTimestamp(micros))?;

        candles.push(Candle::new(
            timestamp,
            symbols.value(row).to_string(),
            timeframes.value(row).to_string(),
            from_mantissa(open.value(row), "open")?,
            from_mantissa(high.value(row), "high")?,
            from_mantissa(low.value(row), "low")?,
            from_mantissa(close.value(row), "close")?,
            from_mantissa(volume.value(row), "volume")?,
        )?);
    }

    Ok(candles)
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &'static str,
) -> Result<&'a T, SchemaError> {
    batch
        .column_by_name(name)
        .and_then(|array| array.as_any().downcast_ref::<T>())
        .ok_or(SchemaError::MissingColumn(name))
}

fn to_mantissa(value: Decimal) -> i128 {
    let mut scaled = value.round_dp(DECIMAL_SCALE);
    scaled.rescale(DECIMAL_SCALE);
    scaled.mantissa()
}

fn from_mantissa(raw: i128, column: &'static str) -> Result<Decimal, SchemaError> {
    Decimal::try_from_i128_with_scale(raw, DECIMAL_SCALE)
        .map(|d| d.normalize())
        .map_err(|e| SchemaError::InvalidDecimal {
            column,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(close: Decimal) -> Candle {
        Candle::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
            "BTCUSDT".to_string(),
            "1h".to_string(),
            dec!(42000.12345678),
            dec!(42100),
            dec!(41900.5),
            close,
            dec!(0.00000001),
        )
        .unwrap()
    }

    #[test]
    fn test_batch_preserves_decimals_and_timestamp() {
        let original = vec![candle(dec!(42050.25)), candle(dec!(42000))];

        let batch = candles_to_record_batch(&original).unwrap();
        let restored = record_batch_to_candles(&batch).unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(restored, original);
        assert_eq!(restored[0].open(), dec!(42000.12345678));
        assert_eq!(restored[0].volume(), dec!(0.00000001));
    }

    #[test]
    fn test_excess_precision_is_rounded_to_scale() {
        assert_eq!(to_mantissa(dec!(1.123456789)), 112_345_679);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let schema = Arc::new(Schema::new(vec![Field::new("symbol", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["BTCUSDT"])) as ArrayRef],
        )
        .unwrap();

        let result = record_batch_to_candles(&batch);

        assert!(matches!(result, Err(SchemaError::MissingColumn("timestamp"))));
    }
}
