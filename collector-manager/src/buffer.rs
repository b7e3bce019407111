use vitalsync::record::Record;

/// Records collected during the current cycle, in arrival order.
///
/// [`take`](RecordBuffer::take) hands the whole batch to the flusher and
/// leaves the buffer empty, so a record can only ever be flushed once.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    records: Vec<Record>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn extend<I: IntoIterator<Item = Record>>(&mut self, records: I) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Removes and returns every pending record.
    pub fn take(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }
}
