//! Composition download, sector enrichment and snapshot install

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use crate::common::fakes::{FakeClassificationSource, FakeCompositionSource, FakePriceFeed};
use crate::common::{init_fresh_test_database, logging, test_data, TestDatabase};
use swig_tracker::composition::{CompositionOutcome, CompositionUpdater};
use swig_tracker::database::PortfolioStore;
use swig_tracker::reference_data::{IndexSectorTable, SectorOverrides, TickerMapping};
use swig_tracker::refresher::MarketDataRefresher;
use swig_tracker::sectors::{EnrichSummary, SectorResolver};
use swig_tracker::utils::RevisionCalendar;

fn updater(
    db: &TestDatabase,
    composition: Arc<FakeCompositionSource>,
    profiles: Arc<FakeClassificationSource>,
) -> CompositionUpdater {
    let resolver = Arc::new(SectorResolver::new(
        db.store(),
        profiles,
        SectorOverrides::from_pairs([("PLAYWAY", "Gaming")]),
        IndexSectorTable::from_pairs([("WIG-INFO", "IT")]),
        Duration::ZERO,
    ));
    CompositionUpdater::new(db.store(), composition, resolver)
}

#[tokio::test]
async fn test_first_run_installs_enriched_basket() {
    logging::init_test_logging();
    logging::log_test_step("Empty database downloads the composition");
    let db = init_fresh_test_database().await.expect("Failed to create test database");

    let composition = Arc::new(FakeCompositionSource::returning(vec![
        test_data::create_bare_constituent("PLAYWAY", 3.2),
        test_data::create_bare_constituent("ALFA", 1.1),
        test_data::create_bare_constituent("GHOST", 0.4),
    ]));
    let profiles = Arc::new(
        FakeClassificationSource::default().with_page("ALFA", test_data::profile_page(&["WIG-INFO"])),
    );

    let outcome = updater(&db, composition.clone(), profiles).ensure_current(false).await.unwrap();
    assert_eq!(
        outcome,
        CompositionOutcome::Updated {
            constituents: 3,
            sectors: EnrichSummary { overrides: 1, cached: 0, inferred: 1, unknown: 1 },
        }
    );

    let loaded = db.manager.load_snapshot().await.unwrap();
    let view: Vec<(&str, &str)> = loaded.iter().map(|c| (c.ticker.as_str(), c.sector.as_str())).collect();
    assert_eq!(view, vec![("PLAYWAY", "Gaming"), ("ALFA", "IT"), ("GHOST", "Inne / Nieznany")]);
    assert_eq!(composition.calls(), 1);
    assert!(db.manager.last_composition_timestamp().await.unwrap().is_some());
}

#[tokio::test]
async fn test_price_refresh_does_not_make_old_composition_current() {
    logging::init_test_logging();
    logging::log_test_step("Composition from before the last revision, then a price refresh");
    let db = init_fresh_test_database().await.expect("Failed to create test database");
    let today = chrono::Utc::now().date_naive();

    // revisions are a quarter apart, so 120 days back is always before the last one
    let composed_at = chrono::Utc::now() - chrono::Duration::days(120);
    db.manager
        .replace_composition(&[test_data::create_bare_constituent("XTB", 1.0)], composed_at)
        .await
        .unwrap();

    let composition = Arc::new(FakeCompositionSource::returning(vec![
        test_data::create_bare_constituent("XTB", 1.4),
        test_data::create_bare_constituent("NEWCO", 0.6),
    ]));
    let updater = updater(&db, composition.clone(), Arc::new(FakeClassificationSource::default()));
    assert!(updater.needs_update(today).await.unwrap());

    let feed = Arc::new(FakePriceFeed::default().with_bar("XTB.WA", test_data::create_test_bar(30.0, 31.0, 5_000.0)));
    let refresher = MarketDataRefresher::new(db.store(), feed, TickerMapping::from_pairs([("MURAPOL", "MUR")], ".WA"));
    let report = refresher.refresh_once().await.unwrap();
    assert_eq!(report.updated, 1);

    let stored = db.manager.last_composition_timestamp().await.unwrap().expect("composition time");
    assert_eq!(stored.timestamp(), composed_at.timestamp());
    assert!(updater.needs_update(today).await.unwrap());

    let outcome = updater.ensure_current(false).await.unwrap();
    assert_matches!(outcome, CompositionOutcome::Updated { constituents: 2, .. });
    assert_eq!(composition.calls(), 1);
}

#[tokio::test]
async fn test_current_composition_is_not_downloaded() {
    logging::init_test_logging();
    let today = chrono::Utc::now().date_naive();
    if RevisionCalendar::last_revision_date(today) == Some(today) {
        // an update made on a revision day counts as stale
        return;
    }

    let db = init_fresh_test_database().await.expect("Failed to create test database");
    db.manager
        .replace_composition(&[test_data::create_bare_constituent("XTB", 1.0)], chrono::Utc::now())
        .await
        .unwrap();

    let composition = Arc::new(FakeCompositionSource::returning(Vec::new()));
    let outcome = updater(&db, composition.clone(), Arc::new(FakeClassificationSource::default()))
        .ensure_current(false)
        .await
        .unwrap();

    assert_matches!(outcome, CompositionOutcome::UpToDate);
    assert_eq!(composition.calls(), 0);
}

#[tokio::test]
async fn test_forced_update_carries_prices_over() {
    logging::init_test_logging();
    let db = init_fresh_test_database().await.expect("Failed to create test database");

    let mut staying = test_data::create_test_constituent("PLAYWAY", 2.0, "Gaming");
    staying.price = 312.0;
    let leaving = test_data::create_test_constituent("OLDCO", 1.0, "IT");
    db.manager.replace_snapshot(&[staying, leaving]).await.unwrap();

    let composition = Arc::new(FakeCompositionSource::returning(vec![
        test_data::create_bare_constituent("PLAYWAY", 2.6),
        test_data::create_bare_constituent("NEWCO", 0.9),
    ]));
    updater(&db, composition, Arc::new(FakeClassificationSource::default()))
        .ensure_current(true)
        .await
        .unwrap();

    let loaded = db.manager.load_snapshot().await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].ticker, "PLAYWAY");
    assert_eq!(loaded[0].share, 2.6);
    assert_eq!(loaded[0].price, 312.0);
    assert_eq!(loaded[1].ticker, "NEWCO");
    assert_eq!(loaded[1].price, 0.0);
}

#[tokio::test]
async fn test_failed_download_keeps_previous_snapshot() {
    logging::init_test_logging();
    let db = init_fresh_test_database().await.expect("Failed to create test database");
    db.manager
        .replace_snapshot(&[
            test_data::create_bare_constituent("XTB", 1.0),
            test_data::create_bare_constituent("BOS", 0.3),
        ])
        .await
        .unwrap();

    let outcome = updater(
        &db,
        Arc::new(FakeCompositionSource::failing()),
        Arc::new(FakeClassificationSource::default()),
    )
    .ensure_current(true)
    .await
    .unwrap();

    assert_eq!(outcome, CompositionOutcome::KeptPrevious { constituents: 2 });
    assert_eq!(db.manager.load_snapshot().await.unwrap().len(), 2);
}
