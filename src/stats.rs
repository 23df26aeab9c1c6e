//! Per-table and per-run transfer statistics.

use std::time::Duration;

/// Counters for a single table's dump or restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Rows streamed through the codec.
    pub rows: u64,
    /// Plaintext bytes, before compression / after decompression.
    pub bytes: u64,
    /// Wall-clock time spent on the table.
    pub duration: Duration,
}

/// Aggregate over all tables of a run. Durations add up across workers, so
/// the total can exceed the run's wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub tables: u64,
    pub rows: u64,
    pub bytes: u64,
    pub busy: Duration,
}

impl RunStats {
    pub fn add(&mut self, table: &TableStats) {
        self.tables += 1;
        self.rows += table.rows;
        self.bytes += table.bytes;
        self.busy += table.duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation() {
        let mut run = RunStats::default();
        run.add(&TableStats {
            rows: 10,
            bytes: 100,
            duration: Duration::from_secs(1),
        });
        run.add(&TableStats {
            rows: 5,
            bytes: 50,
            duration: Duration::from_secs(2),
        });
        assert_eq!(run.tables, 2);
        assert_eq!(run.rows, 15);
        assert_eq!(run.bytes, 150);
        assert_eq!(run.busy, Duration::from_secs(3));
    }
}
