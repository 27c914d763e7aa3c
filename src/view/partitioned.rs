//! Views spread over many rows.

use chrono::{Datelike, NaiveDate, Utc};

use super::{Records, View};
use crate::connection::Pool;
use crate::error::StoreError;
use crate::record::{Record, SecondaryIndex};

/// Chooses the rows a partitioned view lives in.
pub trait Partitioner: Send + Sync {
    /// Row ids of the partitions, in read order.
    fn partition_keys(&self) -> Vec<String>;

    /// The partition `record` is appended to. Defaults to the first one.
    fn append_partition(&self, _record: &Record, keys: &[String]) -> Option<String> {
        keys.first().cloned()
    }
}

/// One partition per day, `YYYYMMDD`, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyPartitions {
    start: NaiveDate,
    days: usize,
}

impl DailyPartitions {
    /// `days` partitions going backwards from `start`.
    pub fn new(start: NaiveDate, days: usize) -> Self {
        DailyPartitions { start, days }
    }

    /// `days` partitions going backwards from today (UTC).
    pub fn ending_today(days: usize) -> Self {
        Self::new(Utc::now().date_naive(), days)
    }
}

impl Partitioner for DailyPartitions {
    fn partition_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.days.min(366));
        let mut day = Some(self.start);
        while let Some(current) = day {
            if keys.len() == self.days || current.year() < 1900 {
                break;
            }
            keys.push(current.format("%Y%m%d").to_string());
            day = current.pred_opt();
        }
        keys
    }
}

/// A view split across partition rows.
///
/// `prototype` supplies everything but the row: each partition is the
/// prototype stored at the partition's row id.
pub struct PartitionedView<P> {
    partitioner: P,
    prototype: View,
}

impl<P: Partitioner> PartitionedView<P> {
    pub fn new(partitioner: P, prototype: View) -> Self {
        PartitionedView {
            partitioner,
            prototype,
        }
    }

    pub fn partitioner(&self) -> &P {
        &self.partitioner
    }

    /// One view per partition, in partition order.
    pub fn views(&self) -> Vec<View> {
        self.partitioner
            .partition_keys()
            .into_iter()
            .map(|row_id| self.prototype.at_row(row_id))
            .collect()
    }

    /// Records of every partition, partition by partition.
    pub fn records<'a>(&self, pool: &'a Pool) -> PartitionRecords<'a> {
        PartitionRecords {
            pool,
            views: self.views().into_iter(),
            current: None,
        }
    }

    /// Append `record` to the partition the partitioner picks.
    pub fn append(&self, pool: &Pool, record: &Record) -> Result<(), StoreError> {
        let keys = self.partitioner.partition_keys();
        let row_id = self
            .partitioner
            .append_partition(record, &keys)
            .ok_or(StoreError::NoPartitions)?;
        self.prototype.at_row(row_id).append(pool, record)
    }

    /// Total pointers over every partition.
    pub fn count(&self, pool: &Pool) -> Result<usize, StoreError> {
        self.views()
            .iter()
            .try_fold(0, |total, view| Ok(total + view.count(pool)?))
    }
}

impl<P: Partitioner> SecondaryIndex for PartitionedView<P> {
    fn append(&self, pool: &Pool, record: &Record) -> Result<(), StoreError> {
        PartitionedView::append(self, pool, record)
    }
}

/// Iterator returned by `PartitionedView::records`.
pub struct PartitionRecords<'a> {
    pool: &'a Pool,
    views: std::vec::IntoIter<View>,
    current: Option<Records<'a>>,
}

impl Iterator for PartitionRecords<'_> {
    type Item = Result<Record, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.as_mut().and_then(|records| records.next()) {
                return Some(item);
            }
            let view = self.views.next()?;
            self.current = Some(view.records(self.pool));
        }
    }
}
