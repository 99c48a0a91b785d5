#![allow(missing_docs)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{init_tracing, keys, Coi};
use group_lookup::query::{
    drain_cursor, BindingsCursor, BindingsList, CounterLookupMetrics, Cursor, ValuesScan,
};
use group_lookup::storage::{RowType, Value};
use group_lookup::{InputPreservation, LookupConfig, LookupError, Result};

const QUANTA: [usize; 4] = [1, 2, 3, 8];

#[test]
fn orphaned_item_yields_only_its_customer() -> Result<()> {
    init_tracing();
    let coi = Coi::new();
    coi.insert(&[1]);
    coi.insert(&[1, 10, 100]);
    for quantum in QUANTA {
        let metrics = Arc::new(CounterLookupMetrics::default());
        let context = coi.context().with_metrics(metrics.clone());
        let lookup = coi.lookup(
            ValuesScan::fixed(vec![coi.row(&[1, 10, 100])]),
            RowType::Table(coi.item),
            &[coi.customer, coi.order],
            InputPreservation::DiscardInput,
            quantum,
        );
        let mut cursor = coi.cursor(&lookup, &context, BindingsList::single());
        let rows = drain_cursor(cursor.as_mut())?;
        assert_eq!(keys(&rows), vec![coi.key(&[1]).to_string()], "quantum {quantum}");
        assert_eq!(metrics.snapshot(false).ancestors_missing, 1);
    }
    assert_eq!(coi.metrics.open_cursors(), 0);
    Ok(())
}

#[test]
fn kept_customer_precedes_its_orders_in_key_order() -> Result<()> {
    init_tracing();
    let coi = Coi::new();
    for path in [&[1][..], &[1, 11], &[1, 10], &[1, 10, 100], &[2], &[2, 20]] {
        coi.insert(path);
    }
    let expected = vec![
        coi.key(&[1]).to_string(),
        coi.key(&[1, 10]).to_string(),
        coi.key(&[1, 11]).to_string(),
    ];
    for quantum in QUANTA {
        let lookup = coi.lookup(
            ValuesScan::fixed(vec![coi.row(&[1])]),
            RowType::Table(coi.customer),
            &[coi.order],
            InputPreservation::KeepInput,
            quantum,
        );
        let mut cursor = coi.cursor(&lookup, &coi.context(), BindingsList::single());
        assert_eq!(keys(&drain_cursor(cursor.as_mut())?), expected, "quantum {quantum}");
    }
    Ok(())
}

#[test]
fn ancestors_then_input_then_branch_for_every_row() -> Result<()> {
    let coi = Coi::new();
    for path in [&[1][..], &[1, 10], &[1, 10, 100], &[1, 10, 101], &[2], &[2, 20]] {
        coi.insert(path);
    }
    let inputs = vec![coi.row(&[1, 10]), coi.row(&[2, 20])];
    let expected = vec![
        coi.key(&[1]).to_string(),
        coi.key(&[1, 10]).to_string(),
        coi.key(&[1, 10, 100]).to_string(),
        coi.key(&[1, 10, 101]).to_string(),
        coi.key(&[2]).to_string(),
        coi.key(&[2, 20]).to_string(),
    ];
    for quantum in QUANTA {
        let lookup = coi.lookup(
            ValuesScan::fixed(inputs.clone()),
            RowType::Table(coi.order),
            &[coi.item, coi.customer],
            InputPreservation::KeepInput,
            quantum,
        );
        let mut cursor = coi.cursor(&lookup, &coi.context(), BindingsList::single());
        assert_eq!(keys(&drain_cursor(cursor.as_mut())?), expected, "quantum {quantum}");
    }
    Ok(())
}

#[test]
fn descendants_in_two_subtrees_scan_the_whole_subtree() -> Result<()> {
    let coi = Coi::new();
    for path in [&[1][..], &[1, 10], &[1, 10, 100], &[1, 11], &[1, 11, 110]] {
        coi.insert(path);
    }
    coi.insert_address(1, 5);
    for quantum in QUANTA {
        let metrics = Arc::new(CounterLookupMetrics::default());
        let context = coi.context().with_metrics(metrics.clone());
        let lookup = coi.lookup(
            ValuesScan::fixed(vec![coi.row(&[1])]),
            RowType::Table(coi.customer),
            &[coi.address, coi.item],
            InputPreservation::DiscardInput,
            quantum,
        );
        let mut cursor = coi.cursor(&lookup, &context, BindingsList::single());
        let rows = drain_cursor(cursor.as_mut())?;
        assert_eq!(
            keys(&rows),
            vec![
                coi.key(&[1, 10, 100]).to_string(),
                coi.key(&[1, 11, 110]).to_string(),
                coi.address_row(1, 5).hkey().to_string(),
            ]
        );
        // The customer itself and both orders are scanned past.
        assert_eq!(metrics.snapshot(false).branch_rows_skipped, 3);
    }
    Ok(())
}

#[test]
fn index_rows_look_up_their_own_table_row() -> Result<()> {
    let coi = Coi::new();
    for path in [&[1][..], &[1, 10], &[1, 10, 100]] {
        coi.insert(path);
    }
    let index = RowType::Index {
        table: coi.item,
        name: "sku".into(),
    };
    let entry = group_lookup::storage::Row::new(
        index.clone(),
        coi.key(&[1, 10, 100]),
        vec![Value::Text("sku-100".into())],
    )
    .into_shared();
    for quantum in QUANTA {
        let lookup = coi.lookup(
            ValuesScan::fixed(vec![Arc::clone(&entry)]),
            index.clone(),
            &[coi.item, coi.customer],
            InputPreservation::DiscardInput,
            quantum,
        );
        let mut cursor = coi.cursor(&lookup, &coi.context(), BindingsList::single());
        assert_eq!(
            keys(&drain_cursor(cursor.as_mut())?),
            vec![coi.key(&[1]).to_string(), coi.key(&[1, 10, 100]).to_string()]
        );
    }
    Ok(())
}

#[test]
fn close_twice_then_destroy_leaves_no_open_cursors() -> Result<()> {
    let coi = Coi::new();
    for path in [&[1][..], &[1, 10], &[1, 10, 100], &[1, 10, 101], &[1, 11]] {
        coi.insert(path);
    }
    for quantum in QUANTA {
        let lookup = coi.lookup(
            ValuesScan::fixed(vec![coi.row(&[1, 10]), coi.row(&[1, 11])]),
            RowType::Table(coi.order),
            &[coi.customer, coi.item],
            InputPreservation::KeepInput,
            quantum,
        );
        let mut cursor = coi.cursor(&lookup, &coi.context(), BindingsList::single());
        cursor.open_bindings()?;
        cursor.next_bindings()?;
        cursor.open()?;
        for _ in 0..3 {
            assert!(cursor.next()?.is_some());
        }
        assert!(coi.metrics.open_cursors() > 0);
        cursor.close();
        cursor.close();
        assert_eq!(coi.metrics.open_cursors(), 0, "quantum {quantum}");
        cursor.destroy();
        cursor.destroy();
        assert!(cursor.is_destroyed());
        assert!(matches!(cursor.open(), Err(LookupError::Lifecycle(_))));
    }
    Ok(())
}

#[test]
fn cancel_token_stops_iteration() -> Result<()> {
    let coi = Coi::new();
    coi.insert(&[1]);
    coi.insert(&[1, 10]);
    for quantum in QUANTA {
        let flag = Arc::new(AtomicBool::new(false));
        let context = coi.context().with_cancel_token(flag.clone());
        let lookup = coi.lookup(
            ValuesScan::fixed(vec![coi.row(&[1, 10])]),
            RowType::Table(coi.order),
            &[coi.customer],
            InputPreservation::KeepInput,
            quantum,
        );
        let mut cursor = coi.cursor(&lookup, &context, BindingsList::single());
        cursor.open_bindings()?;
        cursor.next_bindings()?;
        cursor.open()?;
        assert!(cursor.next()?.is_some());
        flag.store(true, Ordering::SeqCst);
        let err = cursor.next().unwrap_err();
        assert!(err.is_cancelled());
        cursor.destroy();
        assert_eq!(coi.metrics.open_cursors(), 0);
    }
    Ok(())
}

#[test]
fn storage_errors_propagate_unchanged() -> Result<()> {
    let coi = Coi::new();
    coi.insert(&[1]);
    coi.store.fail_on(coi.key(&[1]));
    for quantum in QUANTA {
        let lookup = coi.lookup(
            ValuesScan::fixed(vec![coi.row(&[1, 10])]),
            RowType::Table(coi.order),
            &[coi.customer],
            InputPreservation::DiscardInput,
            quantum,
        );
        let mut cursor = coi.cursor(&lookup, &coi.context(), BindingsList::single());
        let err = drain_cursor(cursor.as_mut()).unwrap_err();
        assert!(matches!(err, LookupError::Storage(msg) if msg.contains("injected")));
        cursor.destroy();
    }
    assert_eq!(coi.metrics.open_cursors(), 0);
    Ok(())
}

#[test]
fn config_selects_the_execution_and_profiles_it() -> Result<()> {
    let coi = Coi::new();
    coi.insert(&[1]);
    coi.insert(&[1, 10]);
    let config = LookupConfig::from_toml_str("lookahead_quantum = 4\nprofile = true\n")
        .expect("valid config");
    let metrics = Arc::new(CounterLookupMetrics::default());
    let context = coi
        .context()
        .with_config(config.clone())
        .with_metrics(metrics.clone());
    let lookup = group_lookup::GroupLookup::with_config(
        Arc::new(ValuesScan::fixed(vec![coi.row(&[1, 10])])),
        Arc::clone(&coi.group),
        RowType::Table(coi.order),
        &[coi.customer],
        InputPreservation::KeepInput,
        &config,
    )?;
    assert_eq!(lookup.lookahead_quantum(), 4);
    let explain = lookup.explain().to_json().expect("json");
    assert!(explain.contains("\"lookahead_quantum\":4"));

    let mut cursor = coi.cursor(&lookup, &context, BindingsList::single());
    assert_eq!(drain_cursor(cursor.as_mut())?.len(), 2);
    let snapshot = metrics.snapshot(true);
    assert_eq!(snapshot.open_count, 1);
    assert_eq!(snapshot.next_count, 3);
    assert_eq!(snapshot.rows_emitted, 2);
    assert_eq!(metrics.snapshot(false).rows_emitted, 0);
    Ok(())
}
