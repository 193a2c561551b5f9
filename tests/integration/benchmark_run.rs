#![allow(missing_docs)]

use std::io;
use std::rc::Rc;

use ctxbench::{
    run_test, setup_database, ConnectionString, ContactId, ContextProvider,
    DynamicContextProvider, JournalMode, Result, StaticContextProvider, Synchronous,
};
use rusqlite::Connection;
use tempfile::TempDir;

fn seeded(dir: &TempDir, contacts: usize) -> Result<ConnectionString> {
    let target = ConnectionString::from_path(dir.path().join("bench.db"))
        .with_journal_mode(JournalMode::Wal)
        .with_synchronous(Synchronous::Off);
    setup_database(
        &DynamicContextProvider::new(target.clone()),
        contacts,
        &mut io::sink(),
    )?;
    Ok(target)
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).expect("count query")
}

/// Every account is linked from exactly one contact carrying the same name.
fn assert_links_match_names(conn: &Connection, expected_links: i64) {
    assert_eq!(
        count(conn, "SELECT COUNT(*) FROM contacts WHERE account_id IS NOT NULL"),
        expected_links
    );
    assert_eq!(
        count(
            conn,
            "SELECT COUNT(*) FROM contacts c JOIN accounts a ON a.id = c.account_id \
             WHERE a.name <> c.name"
        ),
        0
    );
}

#[test]
fn static_provider_links_first_two_thousand() -> Result<()> {
    let dir = TempDir::new()?;
    let target = seeded(&dir, 4000)?;
    let provider = StaticContextProvider::new(target.clone());

    let report = run_test(&provider, 2000)?;
    assert_eq!(report.loaded, 4000);
    assert_eq!(report.processed, 2000);
    assert_eq!(report.stats.queries, 1);
    assert_eq!(report.stats.identity_hits, 2000);
    assert_eq!(report.stats.identity_misses, 0);
    assert_eq!(report.stats.saves, 2000);
    assert_eq!(report.stats.inserted, 2000);
    assert_eq!(report.stats.updated, 2000);

    let conn = Connection::open(target.path())?;
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM accounts"), 2000);
    assert_links_match_names(&conn, 2000);
    assert_eq!(
        count(
            &conn,
            "SELECT COUNT(*) FROM contacts WHERE account_id IS NOT NULL AND id > 2000"
        ),
        0
    );
    Ok(())
}

#[test]
fn dynamic_provider_queries_every_lookup() -> Result<()> {
    let dir = TempDir::new()?;
    let target = seeded(&dir, 4000)?;
    let provider = DynamicContextProvider::new(target.clone());

    let report = run_test(&provider, 2000)?;
    assert_eq!(report.processed, 2000);
    assert_eq!(report.stats.queries, 2001);
    assert_eq!(report.stats.identity_hits, 0);
    assert_eq!(report.stats.identity_misses, 2000);
    assert_eq!(report.stats.saves, 2000);

    let conn = Connection::open(target.path())?;
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM accounts"), 2000);
    assert_links_match_names(&conn, 2000);
    Ok(())
}

#[test]
fn static_provider_relinks_on_second_run() -> Result<()> {
    let dir = TempDir::new()?;
    let target = seeded(&dir, 2500)?;
    let provider = StaticContextProvider::new(target.clone());

    run_test(&provider, 2000)?;
    let second = run_test(&provider, 2000)?;
    assert_eq!(second.processed, 2000);
    assert_eq!(second.stats.queries, 1);

    let conn = Connection::open(target.path())?;
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM accounts"), 4000);
    assert_links_match_names(&conn, 2000);
    // Links now point at the accounts created by the second pass.
    assert_eq!(
        count(
            &conn,
            "SELECT COUNT(*) FROM contacts WHERE account_id IS NOT NULL AND account_id <= 2000"
        ),
        0
    );
    Ok(())
}

#[test]
fn both_providers_against_one_store() -> Result<()> {
    let dir = TempDir::new()?;
    let target = seeded(&dir, 4000)?;
    let shared = StaticContextProvider::new(target.clone());
    let fresh = DynamicContextProvider::new(target.clone());

    run_test(&shared, 2000)?;
    run_test(&fresh, 2000)?;

    let conn = Connection::open(target.path())?;
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM accounts"), 4000);
    assert_links_match_names(&conn, 2000);
    shared.into_session().close()
}

#[test]
fn small_store_processes_every_contact() -> Result<()> {
    let dir = TempDir::new()?;
    let target = seeded(&dir, 25)?;

    let report = run_test(&DynamicContextProvider::new(target.clone()), 2000)?;
    assert_eq!(report.loaded, 25);
    assert_eq!(report.processed, 25);

    let conn = Connection::open(target.path())?;
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM accounts"), 25);
    assert_links_match_names(&conn, 25);
    Ok(())
}

#[test]
fn static_lookups_share_instances_dynamic_do_not() -> Result<()> {
    let dir = TempDir::new()?;
    let target = seeded(&dir, 5)?;
    let id = ContactId(3);

    let shared = StaticContextProvider::new(target.clone());
    let a = shared.get_context()?.single_contact(id)?;
    let b = shared.get_context()?.single_contact(id)?;
    assert!(Rc::ptr_eq(&a, &b));

    let fresh = DynamicContextProvider::new(target);
    let c = fresh.get_context()?.single_contact(id)?;
    let d = fresh.get_context()?.single_contact(id)?;
    assert!(!Rc::ptr_eq(&c, &d));
    assert_eq!(c.borrow().name, "Contact 2");
    Ok(())
}
