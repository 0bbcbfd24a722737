use anyhow::Result;
use dyntable::{MemoryDriver, QueryPredicate, Record, StoreDriver};
use std::sync::{Arc, Mutex};

/// A call received by a [RecordingDriver].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Find(String, QueryPredicate),
    Count(String, QueryPredicate),
    Insert(String, Record),
    Update(String, Record),
    Delete(String, Record),
}

/// Wraps a [MemoryDriver], keeping a log of the calls made to it.
#[derive(Default)]
pub struct RecordingDriver {
    pub store: MemoryDriver,
    pub calls: Mutex<Vec<Call>>,
}

impl RecordingDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inserts(&self) -> Vec<Record> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Insert(_, record) => Some(record),
                _ => None,
            })
            .collect()
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl StoreDriver for RecordingDriver {
    fn find(&self, table: &str, predicate: &QueryPredicate) -> Result<Vec<Record>> {
        self.log(Call::Find(table.to_string(), predicate.clone()));
        self.store.find(table, predicate)
    }

    fn count(&self, table: &str, predicate: &QueryPredicate) -> Result<u64> {
        self.log(Call::Count(table.to_string(), predicate.clone()));
        self.store.count(table, predicate)
    }

    fn insert(&self, table: &str, primary_key: &str, record: Record) -> Result<Record> {
        self.log(Call::Insert(table.to_string(), record.clone()));
        self.store.insert(table, primary_key, record)
    }

    fn update(&self, table: &str, primary_key: &str, record: &Record) -> Result<()> {
        self.log(Call::Update(table.to_string(), record.clone()));
        self.store.update(table, primary_key, record)
    }

    fn delete(&self, table: &str, primary_key: &str, record: &Record) -> Result<()> {
        self.log(Call::Delete(table.to_string(), record.clone()));
        self.store.delete(table, primary_key, record)
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
