#![allow(dead_code)]

use dynamap::{
    Condition, InMemoryTables, Item, Mapper, MapperConfig, Page, Result, Schema, SearchRequest,
    SecondaryIndex, StoreError, TableGateway, TypeDescriptor, TypeRegistry, WriteOutcome,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Gateway wrapper that counts reads and writes and can be told to fail writes.
#[derive(Debug, Default)]
pub struct InstrumentedGateway {
    pub inner: InMemoryTables,
    gets: AtomicUsize,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InstrumentedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::new(
                "ProvisionedThroughputExceededException",
                "write capacity exhausted",
            )
            .into());
        }
        Ok(())
    }
}

impl TableGateway for InstrumentedGateway {
    fn get_item(&self, table: &str, key: &Item) -> Result<Option<Item>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_item(table, key)
    }

    fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<&Condition>,
    ) -> Result<WriteOutcome> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.inner.put_item(table, item, condition)
    }

    fn delete_item(
        &self,
        table: &str,
        key: &Item,
        condition: Option<&Condition>,
    ) -> Result<WriteOutcome> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.inner.delete_item(table, key, condition)
    }

    fn query(&self, table: &str, request: &SearchRequest) -> Result<Page> {
        self.inner.query(table, request)
    }

    fn scan(&self, table: &str, request: &SearchRequest) -> Result<Page> {
        self.inner.scan(table, request)
    }

    fn create_table(&self, schema: &Schema) -> Result<()> {
        self.inner.create_table(schema)
    }

    fn describe_table(&self, table: &str) -> Result<Option<Schema>> {
        self.inner.describe_table(table)
    }
}

pub const USER: &str = "app.User";
pub const SESSION: &str = "app.Session";
pub const BOOK: &str = "app.Book";

/// Registry with users keyed by email, sessions keyed by id with a
/// `user`/`expiry` index, and books keyed by isbn.
pub fn registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    registry
        .register(TypeDescriptor::new(
            USER,
            Schema::new("users", "email").require("name"),
        ))
        .unwrap();
    registry
        .register(TypeDescriptor::new(
            SESSION,
            Schema::new("sessions", "id")
                .with_index(SecondaryIndex::new("user", "user").with_range("expiry")),
        ))
        .unwrap();
    registry
        .register(TypeDescriptor::new(BOOK, Schema::new("books", "isbn")))
        .unwrap();
    Arc::new(registry)
}

pub fn mapper_with(gateway: Arc<dyn TableGateway>, config: MapperConfig) -> Mapper {
    let mapper = Mapper::new(gateway)
        .with_registry(registry())
        .with_config(config);
    for name in [USER, SESSION, BOOK] {
        mapper.ensure_table(name).unwrap();
    }
    mapper
}

pub fn mapper() -> Mapper {
    mapper_with(Arc::new(InMemoryTables::new()), MapperConfig::new())
}
