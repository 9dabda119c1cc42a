//! Config file to cleaned snapshot, the way the command line tool runs it

use crate::common::{listing_page, mount_page};
use pagesift::cleaning::{CleaningEngine, HistoryError, OperationError};
use pagesift::config::load_config_with_hash;
use pagesift::crawler::ScrapeSession;
use pagesift::storage::{load_snapshot, save_snapshot, Snapshot};
use pagesift::table::Value;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};
use wiremock::MockServer;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

async fn scrape_products(server: &MockServer, cleaning: &str) -> (pagesift::Config, String, pagesift::Table) {
    mount_page(
        server,
        "/products",
        listing_page(
            &[("Tea", "3"), ("Tea", "3"), ("Coffee", ""), ("Juice", "abc")],
            None,
        ),
        1,
    )
    .await;

    let file = write_config(&format!(
        r#"
[target]
url = "{}/products"
delay-ms = 0
timeout-ms = 2000
respect-robots-txt = false

{}
"#,
        server.uri(),
        cleaning
    ));

    let (config, hash) = load_config_with_hash(file.path()).unwrap();
    let outcome = ScrapeSession::from_config(&config).unwrap().run().await;
    assert!(outcome.is_completed());
    (config, hash, outcome.table)
}

const PIPELINE: &str = r#"
[[cleaning]]
op = "remove-duplicates"

[[cleaning]]
op = "fill-missing"
strategy = "value"
column = "price"
value = "0"

[[cleaning]]
op = "convert-type"
column = "price"
target = "integer"
"#;

#[tokio::test]
async fn test_pipeline_then_undo_to_original() {
    let server = MockServer::start().await;
    let (config, _, scraped) = scrape_products(&server, PIPELINE).await;
    assert_eq!(scraped.row_count(), 4);

    let mut engine = CleaningEngine::new(scraped.clone());
    let cleaned = engine.apply_all(config.cleaning.clone()).unwrap();

    assert_eq!(cleaned.row_count(), 3);
    assert_eq!(cleaned.get(0, "price"), Some(&Value::Integer(3)));
    assert_eq!(cleaned.get(1, "price"), Some(&Value::Integer(0)));
    assert_eq!(cleaned.get(2, "price"), None);

    for _ in 0..3 {
        engine.undo().unwrap();
    }
    assert_eq!(*engine.current(), scraped);
    assert!(matches!(engine.undo(), Err(HistoryError::NothingToUndo)));

    let redone = engine.redo().unwrap();
    assert_eq!(redone.row_count(), 3);
    assert_eq!(redone.get(1, "price"), None);
}

#[tokio::test]
async fn test_failed_operation_leaves_table_untouched() {
    let server = MockServer::start().await;
    let cleaning = r#"
[[cleaning]]
op = "convert-type"
column = "price"
target = "integer"
strict = true
"#;
    let (config, _, scraped) = scrape_products(&server, cleaning).await;

    let mut engine = CleaningEngine::new(scraped.clone());
    let result = engine.apply_all(config.cleaning.clone());

    assert!(matches!(result, Err(OperationError::TypeConversion { .. })));
    assert_eq!(*engine.current(), scraped);
    assert!(engine.history().is_empty());
}

#[tokio::test]
async fn test_snapshot_of_cleaned_scrape() {
    let server = MockServer::start().await;
    let (config, hash, scraped) = scrape_products(&server, PIPELINE).await;

    let mut engine = CleaningEngine::new(scraped);
    engine.apply_all(config.cleaning.clone()).unwrap();
    engine.undo().unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("products.json");
    let snapshot = Snapshot::from_engine(config.target.clone(), Some(hash.clone()), &engine);
    save_snapshot(&snapshot, &path).unwrap();

    let loaded = load_snapshot(&path).unwrap();
    assert_eq!(loaded.target, config.target);
    assert_eq!(loaded.config_hash, Some(hash));
    assert_eq!(loaded.table, *engine.current());
    assert_eq!(loaded.operations.len(), 2);

    // Replaying the saved operations over the raw scrape reproduces the table
    let mut replay = CleaningEngine::new(engine.history().original().clone());
    let replayed = replay.apply_all(loaded.operations).unwrap();
    assert_eq!(*replayed, loaded.table);
}

#[tokio::test]
async fn test_list_items_through_format_and_encoding_repair() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/contacts",
        r#"<html><body>
            <ul class="contacts">
              <li>CafÃ© Rio: 555.123.4567</li>
              <li>Bistro â€œNordâ€: 1 555 987 6543</li>
              <li> </li>
            </ul>
        </body></html>"#
            .to_string(),
        1,
    )
    .await;

    let file = write_config(&format!(
        r#"
[target]
url = "{}/contacts"
delay-ms = 0
timeout-ms = 2000
respect-robots-txt = false
selectors = [{{ list = "ul.contacts" }}]

[[cleaning]]
op = "fix-encoding"

[[cleaning]]
op = "standardize-format"
column = "item"
format = "pattern"
pattern = '^(.*): .*$'
replacement = "$1"
"#,
        server.uri()
    ));

    let (config, _) = load_config_with_hash(file.path()).unwrap();
    let outcome = ScrapeSession::from_config(&config).unwrap().run().await;
    assert!(outcome.is_completed());
    assert_eq!(outcome.table.columns(), ["item"]);
    assert_eq!(outcome.table.row_count(), 2);

    let mut engine = CleaningEngine::new(outcome.table.clone());
    let cleaned = engine.apply_all(config.cleaning.clone()).unwrap();
    assert_eq!(cleaned.get(0, "item"), Some(&Value::from("Café Rio")));
    assert_eq!(cleaned.get(1, "item"), Some(&Value::from("Bistro \"Nord\"")));

    engine.undo().unwrap();
    assert_eq!(
        engine.current().get(0, "item"),
        Some(&Value::from("Café Rio: 555.123.4567"))
    );
}
