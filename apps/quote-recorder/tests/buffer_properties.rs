//! Batching Buffer Property Tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use quote_recorder::{BatchBuffer, QuoteObservation, Symbol};

fn observation(symbol: &str, volume: i64) -> QuoteObservation {
    let at = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
    QuoteObservation::new(Symbol::new(symbol).unwrap(), 10.0, volume, at, at).unwrap()
}

proptest! {
    #[test]
    fn flush_yields_exactly_at_threshold(threshold in 1usize..20, count in 0usize..200) {
        let mut buffer = BatchBuffer::new(threshold);
        let mut flushed = Vec::new();

        for i in 0..count {
            buffer.append(observation("AAPL", i as i64));
            match buffer.try_flush() {
                Some(batch) => {
                    prop_assert_eq!(batch.len(), threshold);
                    prop_assert!(buffer.is_empty());
                    flushed.extend(batch.into_inner());
                }
                None => prop_assert!(buffer.len() < threshold),
            }
        }

        prop_assert_eq!(flushed.len(), (count / threshold) * threshold);
        prop_assert_eq!(buffer.len(), count % threshold);

        // Arrival order survives batching.
        let volumes: Vec<i64> = flushed.iter().map(QuoteObservation::volume).collect();
        let expected: Vec<i64> = (0..flushed.len() as i64).collect();
        prop_assert_eq!(volumes, expected);
    }

    #[test]
    fn mixed_symbols_share_one_buffer(symbols in prop::collection::vec(prop::sample::select(vec!["AAPL", "MSFT", "GOOG"]), 0..50)) {
        let mut buffer = BatchBuffer::new(5);
        let mut batches = Vec::new();

        for (i, symbol) in symbols.iter().enumerate() {
            buffer.append(observation(symbol, i as i64));
            if let Some(batch) = buffer.try_flush() {
                batches.push(batch);
            }
        }

        let tickers: Vec<String> = batches
            .iter()
            .flat_map(|b| b.iter().map(|o| o.ticker().to_string()))
            .collect();
        let expected: Vec<String> = symbols
            .iter()
            .take(batches.len() * 5)
            .map(|s| (*s).to_string())
            .collect();
        prop_assert_eq!(tickers, expected);
    }

    #[test]
    fn drain_empties_any_partial_buffer(threshold in 2usize..20, count in 0usize..19) {
        let count = count % threshold;
        let mut buffer = BatchBuffer::new(threshold);
        for i in 0..count {
            buffer.append(observation("MSFT", i as i64));
        }

        let drained = buffer.drain();
        prop_assert_eq!(drained.map_or(0, |b| b.len()), count);
        prop_assert!(buffer.is_empty());
    }
}
