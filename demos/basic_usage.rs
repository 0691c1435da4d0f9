//! Basic usage example
//!
//! This example demonstrates:
//! - Opening a pooled database
//! - Inserting single rows and batches
//! - Filtered, paginated queries
//! - Nested transactions with savepoints
//!
//! Run with: RUST_LOG=debug cargo run --example basic_usage

use rust_sql_pool::prelude::*;
use rust_sql_pool::{or_group, InsertMany, InsertMode};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== rust_sql_pool - Basic Usage Example ===\n");

    println!("1. Opening database...");
    let db = rust_sql_pool::open(&Config::new(DatabaseType::Sqlite).max_connections(4))?;
    println!("   ✓ Opened {:?}\n", db);

    println!("2. Creating table...");
    db.execute(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            age INTEGER,
            balance REAL NOT NULL DEFAULT 0
        )",
    )?;
    println!("   ✓ Table created\n");

    println!("3. Inserting data...");
    let id = db.insert(
        "users",
        Fields::new()
            .with("username", "alice")
            .with("age", 30)
            .with("balance", 1500.5),
    )?;
    println!("   ✓ Inserted alice with id {:?}", id);

    let ids = db.insert_many_with(
        InsertMany::new(
            "users",
            vec![
                Fields::new().with("username", "bob").with("age", 25).with("balance", 2300.75),
                Fields::new().with("username", "charlie").with("age", 35).with("balance", 980.25),
                Fields::new().with("username", "alice").with("age", 99).with("balance", 0.0),
            ],
        )
        .mode(InsertMode::InsertIgnore),
    )?;
    println!("   ✓ Batch inserted, ids {:?} (duplicates skipped)\n", ids);

    println!("4. Querying data...");
    let select = Select::new("users")
        .fields(vec!["username", "age"])
        .filter(
            or_group(vec![
                Fields::new().with("age__gte", 30),
                Fields::new().with("username__like", "b%"),
            ])?
            .unwrap_or_default(),
        )
        .order_by("username")
        .page(1);
    println!("   SQL: {}", select.build()?);
    for user in db.select(&select)? {
        println!(
            "   - {} ({})",
            user["username"].as_string(),
            user["age"].as_string()
        );
    }
    println!();

    println!("5. Nested transactions...");
    let mut session = db.session();
    session.transaction(|tx| {
        tx.update(
            "users",
            Fields::new().with("username", "alice"),
            Fields::new().with("balance", raw("balance - 100")),
        )?;

        // A failing inner transaction only rolls back to its savepoint.
        let inner: Result<()> = tx.transaction(|inner| {
            inner.update(
                "users",
                Fields::new().with("username", "bob"),
                Fields::new().with("balance", raw("balance + 100")),
            )?;
            Err(DatabaseError::validation("transfer limit exceeded"))
        });
        println!("   inner transaction: {:?}", inner.err());

        tx.update(
            "users",
            Fields::new().with("username", "charlie"),
            Fields::new().with("balance", raw("balance + 100")),
        )?;
        Ok(())
    })?;
    println!(
        "   ✓ Committed after {} statements\n",
        session.executed_query_count()
    );

    println!("6. Final balances...");
    let balances = Select::new("users")
        .fields(vec!["username", "balance"])
        .order_by("id");
    for user in db.select(&balances)? {
        println!(
            "   - {}: {:.2}",
            user["username"].as_string(),
            user["balance"].as_double().unwrap_or_default()
        );
    }

    println!("\n   Pool: {:?}", db.stats());
    Ok(())
}
