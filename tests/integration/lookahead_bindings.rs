#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{init_tracing, keys, Coi};
use group_lookup::query::{
    drain_cursor, BindingsCursor, BindingsList, Cursor, QueryBindings, ValuesScan,
};
use group_lookup::storage::{Row, RowType};
use group_lookup::types::TableId;
use group_lookup::{InputPreservation, Result};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Every customer/order/item path the generators draw from.
fn universe() -> Vec<Vec<i64>> {
    let mut paths = Vec::new();
    for customer in 1..=3 {
        paths.push(vec![customer]);
        for o in 0..2 {
            let order = customer * 10 + o;
            paths.push(vec![customer, order]);
            for i in 0..2 {
                paths.push(vec![customer, order, order * 10 + i]);
            }
        }
    }
    paths
}

/// Valid output sets per input table.
fn outputs_for(coi: &Coi, input: TableId, choice: usize) -> Vec<TableId> {
    let options: Vec<Vec<TableId>> = if input == coi.customer {
        vec![
            vec![coi.order],
            vec![coi.item],
            vec![coi.order, coi.item],
            vec![coi.item, coi.address],
            vec![coi.customer, coi.order],
        ]
    } else if input == coi.order {
        vec![
            vec![coi.customer],
            vec![coi.item],
            vec![coi.customer, coi.item],
            vec![coi.order],
            vec![coi.order, coi.item],
        ]
    } else {
        vec![
            vec![coi.customer],
            vec![coi.order],
            vec![coi.order, coi.customer],
            vec![coi.item, coi.customer],
            vec![coi.item],
        ]
    };
    options[choice % options.len()].clone()
}

struct Case {
    coi: Coi,
    input_table: TableId,
    outputs: Vec<TableId>,
    flag: InputPreservation,
    per_context: Arc<Vec<Vec<Arc<Row>>>>,
}

impl Case {
    fn new(
        present: &[bool],
        contexts: &[Vec<usize>],
        input: usize,
        choice: usize,
        keep: bool,
    ) -> Self {
        let coi = Coi::new();
        let paths = universe();
        for (path, present) in paths.iter().zip(present) {
            if *present {
                coi.insert(path);
            }
        }
        let input_table = [coi.customer, coi.order, coi.item][input % 3];
        let outputs = outputs_for(&coi, input_table, choice);
        let flag = if keep && !outputs.contains(&input_table) {
            InputPreservation::KeepInput
        } else {
            InputPreservation::DiscardInput
        };
        let per_context = contexts
            .iter()
            .map(|rows| rows.iter().map(|idx| coi.row(&paths[*idx])).collect())
            .collect();
        Self {
            coi,
            input_table,
            outputs,
            flag,
            per_context: Arc::new(per_context),
        }
    }

    fn scan(&self) -> ValuesScan {
        let per_context = Arc::clone(&self.per_context);
        ValuesScan::new(move |bindings| {
            let index = bindings.id().0 as usize;
            Ok(per_context.get(index).cloned().unwrap_or_default())
        })
    }

    fn cursor(&self, quantum: usize, contexts: Vec<QueryBindings>) -> Box<dyn Cursor> {
        let lookup = self.coi.lookup(
            self.scan(),
            RowType::Table(self.input_table),
            &self.outputs,
            self.flag,
            quantum,
        );
        self.coi
            .cursor(&lookup, &self.coi.context(), BindingsList::new(contexts))
    }

    fn run(&self, quantum: usize) -> Result<Vec<String>> {
        let contexts = (0..self.per_context.len() as u64)
            .map(QueryBindings::root)
            .collect();
        let mut cursor = self.cursor(quantum, contexts);
        let rows = drain_cursor(cursor.as_mut())?;
        cursor.destroy();
        Ok(keys(&rows))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lookahead_matches_serial(
        present in prop::collection::vec(any::<bool>(), 21),
        contexts in prop::collection::vec(prop::collection::vec(0usize..21, 0..5), 1..4),
        input in 0usize..3,
        choice in 0usize..5,
        keep in any::<bool>(),
        quantum in 2usize..9,
    ) {
        let case = Case::new(&present, &contexts, input, choice, keep);
        let serial = case.run(1).unwrap();
        let lookahead = case.run(quantum).unwrap();
        prop_assert_eq!(lookahead, serial);
        prop_assert_eq!(case.coi.metrics.open_cursors(), 0);
    }
}

/// One consumer transcript: the contexts delivered and the rows read in each.
type Transcript = Vec<(String, Vec<String>)>;

/// Reads `case` through nested contexts (outer loops of `width` children),
/// stopping early and cancelling at points chosen by `seed`.
fn drive(case: &Case, quantum: usize, width: u64, seed: u64) -> Result<Transcript> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let count = case.per_context.len() as u64;
    let mut contexts = Vec::new();
    for first in (0..count).step_by(width as usize) {
        let outer = QueryBindings::root(1_000 + first);
        for id in first..(first + width).min(count) {
            contexts.push(outer.child(id));
        }
    }

    let mut cursor = case.cursor(quantum, contexts);
    let mut transcript = Vec::new();
    let mut cancelled: Vec<QueryBindings> = Vec::new();
    cursor.open_bindings()?;
    while let Some(bindings) = cursor.next_bindings()? {
        assert!(
            !cancelled.iter().any(|target| bindings.descends_from(target)),
            "{bindings} delivered after it was cancelled"
        );
        cursor.open()?;
        let mut rows = Vec::new();
        let mut stopped = false;
        while let Some(row) = cursor.next()? {
            rows.push(row.hkey().to_string());
            if rng.gen_bool(0.15) {
                stopped = true;
                break;
            }
        }
        cursor.close();
        transcript.push((bindings.to_string(), rows));
        if stopped || rng.gen_bool(0.1) {
            let target = match bindings.parent() {
                Some(parent) if rng.gen_bool(0.5) => parent.clone(),
                _ => bindings.clone(),
            };
            cursor.cancel_bindings(&target)?;
            cancelled.push(target);
        }
    }
    cursor.close_bindings();
    cursor.destroy();
    Ok(transcript)
}

#[test]
fn cancellation_is_identical_under_every_quantum() -> Result<()> {
    init_tracing();
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED_1234);
    for round in 0..40 {
        let present: Vec<bool> = (0..21).map(|_| rng.gen_bool(0.7)).collect();
        let contexts: Vec<Vec<usize>> = (0..rng.gen_range(1..8))
            .map(|_| (0..rng.gen_range(0..5)).map(|_| rng.gen_range(0..21)).collect())
            .collect();
        let case = Case::new(
            &present,
            &contexts,
            rng.gen_range(0..3),
            rng.gen_range(0..5),
            rng.gen_bool(0.5),
        );
        let width = rng.gen_range(1..4);
        let seed = rng.gen();
        let serial = drive(&case, 1, width, seed)?;
        for quantum in [2, 3, 5, 8] {
            let lookahead = drive(&case, quantum, width, seed)?;
            assert_eq!(lookahead, serial, "round {round} quantum {quantum}");
        }
        assert_eq!(case.coi.metrics.open_cursors(), 0);
    }
    Ok(())
}

#[test]
fn cancelling_an_outer_context_skips_its_remaining_children() -> Result<()> {
    let present = vec![true; 21];
    let paths = universe();
    let item = |path: &[i64]| paths.iter().position(|p| p == path).expect("path");
    let contexts = vec![
        vec![item(&[1, 10, 100])],
        vec![item(&[1, 11, 110])],
        vec![item(&[2, 20, 200])],
        vec![item(&[3, 30, 301])],
    ];
    let case = Case::new(&present, &contexts, 2, 0, false);
    for quantum in [1, 2, 4, 16] {
        let outer_a = QueryBindings::root(100);
        let outer_b = QueryBindings::root(200);
        let children = vec![outer_a.child(0), outer_a.child(1), outer_b.child(2), outer_b.child(3)];
        let mut cursor = case.cursor(quantum, children);
        cursor.open_bindings()?;
        let first = cursor.next_bindings()?.expect("first context");
        assert_eq!(first.to_string(), "100/0");
        cursor.open()?;
        let row = cursor.next()?.expect("customer of the first item");
        assert_eq!(row.hkey(), &case.coi.key(&[1]));
        cursor.close();
        cursor.cancel_bindings(&outer_a)?;

        let mut delivered = Vec::new();
        let mut rows = Vec::new();
        while let Some(bindings) = cursor.next_bindings()? {
            delivered.push(bindings.to_string());
            cursor.open()?;
            while let Some(row) = cursor.next()? {
                rows.push(row);
            }
            cursor.close();
        }
        cursor.close_bindings();
        assert_eq!(delivered, vec!["200/2", "200/3"], "quantum {quantum}");
        assert_eq!(
            keys(&rows),
            vec![case.coi.key(&[2]).to_string(), case.coi.key(&[3]).to_string()]
        );
        assert_eq!(case.coi.metrics.open_cursors(), 0);
    }
    Ok(())
}

#[test]
fn cancelling_the_context_being_read_ends_it_immediately() -> Result<()> {
    init_tracing();
    let present = vec![true; 21];
    let paths = universe();
    let customer = |id: i64| paths.iter().position(|p| p == &vec![id]).expect("path");
    let contexts = vec![vec![customer(1)], vec![customer(2)], vec![customer(3)]];
    let case = Case::new(&present, &contexts, 0, 0, true);
    assert_eq!(case.flag, InputPreservation::KeepInput);
    for quantum in [1, 2, 8] {
        let roots: Vec<_> = (0..3).map(QueryBindings::root).collect();
        let mut cursor = case.cursor(quantum, roots);
        cursor.open_bindings()?;
        let first = cursor.next_bindings()?.expect("first context");
        cursor.open()?;
        let mut before = Vec::new();
        for _ in 0..2 {
            before.push(cursor.next()?.expect("row before cancel"));
        }
        cursor.cancel_bindings(&first)?;
        assert_eq!(cursor.next()?, None, "quantum {quantum}");
        assert_eq!(cursor.next()?, None, "quantum {quantum}");
        cursor.close();
        assert_eq!(
            keys(&before),
            vec![case.coi.key(&[1]).to_string(), case.coi.key(&[1, 10]).to_string()]
        );

        let mut after = Vec::new();
        while let Some(_bindings) = cursor.next_bindings()? {
            cursor.open()?;
            while let Some(row) = cursor.next()? {
                after.push(row);
            }
            cursor.close();
        }
        cursor.close_bindings();
        assert_eq!(
            keys(&after),
            [&[2][..], &[2, 20], &[2, 21], &[3], &[3, 30], &[3, 31]]
                .iter()
                .map(|path| case.coi.key(path).to_string())
                .collect::<Vec<_>>(),
            "quantum {quantum}"
        );
        assert_eq!(case.coi.metrics.open_cursors(), 0, "quantum {quantum}");
        cursor.destroy();
    }
    Ok(())
}
