//! Small customer / order / item / address group for the execution unit
//! tests. The integration tests build their own stores through the public
//! API in `tests/integration/common`.

use std::sync::Arc;

use crate::query::bindings::QueryContext;
use crate::query::cursor::{BindingsList, Cursor, Operator};
use crate::query::values::ValuesScan;
use crate::storage::{CounterMetrics, Group, HKey, MemoryGroupStore, Row, RowType, Value};
use crate::types::TableId;

use super::{GroupLookup, InputPreservation};

pub(crate) struct Coi {
    pub group: Arc<Group>,
    pub store: MemoryGroupStore,
    pub storage_metrics: Arc<CounterMetrics>,
    pub customer: TableId,
    pub order: TableId,
    pub item: TableId,
    pub address: TableId,
}

impl Coi {
    /// Customers 1 and 2; orders 10, 11 (customer 1) and 20 (customer 2);
    /// items 100, 101 (order 10), 110 (order 11), 200 (order 20); address 5
    /// of customer 1.
    pub fn populated() -> Self {
        let group = Group::builder("coi", "customer")
            .child("order", "customer")
            .and_then(|b| b.child("item", "order"))
            .and_then(|b| b.child("address", "customer"))
            .expect("static schema")
            .build();
        let id = |name| group.table_id(name).expect("declared table");
        let storage_metrics = Arc::new(CounterMetrics::default());
        let coi = Self {
            customer: id("customer"),
            order: id("order"),
            item: id("item"),
            address: id("address"),
            store: MemoryGroupStore::with_metrics(storage_metrics.clone()),
            storage_metrics,
            group: Arc::clone(&group),
        };
        for path in [
            &[1][..],
            &[1, 10],
            &[1, 10, 100],
            &[1, 10, 101],
            &[1, 11],
            &[1, 11, 110],
            &[2],
            &[2, 20],
            &[2, 20, 200],
        ] {
            coi.store.insert(&coi.group, (*coi.row(path)).clone());
        }
        coi.store
            .insert(&coi.group, (*coi.address_row(1, 5)).clone());
        coi
    }

    fn push(&self, key: HKey, table: TableId, value: i64) -> HKey {
        let ordinal = self.group.table(table).expect("declared table").ordinal();
        key.push(ordinal, [Value::Int(value)])
    }

    pub fn key(&self, path: &[i64]) -> HKey {
        path.iter()
            .zip([self.customer, self.order, self.item])
            .fold(HKey::new(), |key, (value, table)| self.push(key, table, *value))
    }

    pub fn row(&self, path: &[i64]) -> Arc<Row> {
        let table = [self.customer, self.order, self.item][path.len() - 1];
        let last = *path.last().expect("non-empty path");
        Row::new(RowType::Table(table), self.key(path), vec![Value::Int(last)]).into_shared()
    }

    pub fn address_row(&self, customer: i64, address: i64) -> Arc<Row> {
        let hkey = self.push(self.key(&[customer]), self.address, address);
        Row::new(RowType::Table(self.address), hkey, vec![Value::Int(address)]).into_shared()
    }

    pub fn context(&self) -> QueryContext {
        QueryContext::new(Arc::new(self.store.clone()))
    }

    /// Lookup over `inputs` in a single context.
    pub fn lookup_cursor(
        &self,
        inputs: Vec<Arc<Row>>,
        input_type: RowType,
        outputs: &[TableId],
        flag: InputPreservation,
        quantum: usize,
    ) -> Box<dyn Cursor> {
        GroupLookup::new(
            Arc::new(ValuesScan::fixed(inputs)),
            Arc::clone(&self.group),
            input_type,
            outputs,
            flag,
            quantum,
        )
        .expect("valid lookup")
        .cursor(&self.context(), Box::new(BindingsList::single()))
        .expect("cursor")
    }
}

/// Renders rows as their hkeys for compact assertions.
pub(crate) fn keys(rows: &[Arc<Row>]) -> Vec<String> {
    rows.iter().map(|row| row.hkey().to_string()).collect()
}
