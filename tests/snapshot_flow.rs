//! Upload, publish and source a basket against the latest snapshot.

use std::{fs, sync::Arc, thread};

use foresight::{
    basket::{Basket, DemandLine},
    config::Settings,
    ingest::{SheetFormat, read_sheet},
    offers::OfferKey,
    optimiser::optimise,
    snapshots::{InMemorySnapshotStore, SnapshotStore},
};
use jiff::{SignedDuration, Timestamp};
use rust_decimal::Decimal;
use tempfile::TempDir;
use testresult::TestResult;

const MARCH: &str = "\
Supplier,Product Category,Product,Location,Delivery Window,Price,Unit
Agri Direct,Nitrogen,Urea,Hull,Mar-26,300,t
Agri Direct,Nitrogen,AN,Hull,Mar-26,310,t
Baltic Fert,Nitrogen,Urea,Hull,Mar-26,298,t
Coastal Supply,Nitrogen,AN,Hull,Mar-26,308,t
";

const MARCH_REVISED: &str = "\
Supplier,Product Category,Product,Location,Delivery Window,Price,Unit
Agri Direct,Nitrogen,Urea,Hull,Mar-26,320,t
Agri Direct,Nitrogen,AN,Hull,Mar-26,330,t
Baltic Fert,Nitrogen,Urea,Hull,Mar-26,290,t
Coastal Supply,Nitrogen,AN,Hull,Mar-26,300,t
";

fn basket(now: Timestamp) -> TestResult<Basket> {
    let mut basket = Basket::new(now);

    basket.push(DemandLine::new(
        OfferKey::new("Urea", "Hull", "Mar-26"),
        Decimal::from(15),
    )?);
    basket.push(DemandLine::new(
        OfferKey::new("AN", "Hull", "Mar-26"),
        Decimal::from(15),
    )?);

    Ok(basket)
}

#[test]
fn published_sheet_sources_a_basket() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("march.csv");

    fs::write(&path, MARCH)?;

    let source = fs::read(&path)?;
    let upload = read_sheet(&source, SheetFormat::from_path(&path)?)?;

    let settings = Settings::default();
    let store = InMemorySnapshotStore::new();

    let meta = store.publish(upload.offers, settings.currency(), "admin", &source)?;

    assert_eq!(meta.row_count, 4);
    assert_eq!(meta.source_hash, upload.source_hash);

    let latest = store.latest()?.ok_or("no snapshot")?;
    let prices = store.prices(latest.id)?;
    let basket = basket(Timestamp::now())?;

    let allocation = optimise(basket.lines(), &prices, &settings.tier_table())?;

    assert_eq!(allocation.suppliers(), ["Agri Direct"]);
    assert_eq!(allocation.total(), Decimal::from(9150));

    Ok(())
}

#[test]
fn republishing_changes_the_latest_but_not_held_snapshots() -> TestResult {
    let settings = Settings::default();
    let store = InMemorySnapshotStore::new();
    let basket = basket(Timestamp::now())?;

    let first = store.publish(
        read_sheet(MARCH.as_bytes(), SheetFormat::Csv)?.offers,
        settings.currency(),
        "admin",
        MARCH.as_bytes(),
    )?;

    let held = store.prices(first.id)?;

    store.publish(
        read_sheet(MARCH_REVISED.as_bytes(), SheetFormat::Csv)?.offers,
        settings.currency(),
        "admin",
        MARCH_REVISED.as_bytes(),
    )?;

    let latest = store.prices(store.latest()?.ok_or("no snapshot")?.id)?;

    let before = optimise(basket.lines(), &held, &settings.tier_table())?;
    let after = optimise(basket.lines(), &latest, &settings.tier_table())?;

    assert_eq!(before.total(), Decimal::from(9150));
    assert_eq!(after.suppliers(), ["Baltic Fert", "Coastal Supply"]);
    assert_eq!(after.total(), Decimal::from(15 * 290 + 15 * 300 + 30 * 15));
    assert_eq!(store.list(10)?.len(), 2);

    Ok(())
}

#[test]
fn concurrent_readers_see_complete_snapshots() -> TestResult {
    let settings = Settings::default();
    let store = Arc::new(InMemorySnapshotStore::new());

    store.publish(
        read_sheet(MARCH.as_bytes(), SheetFormat::Csv)?.offers,
        settings.currency(),
        "admin",
        MARCH.as_bytes(),
    )?;

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let tiers = settings.tier_table();

            thread::spawn(move || -> Result<Decimal, String> {
                let basket = basket(Timestamp::now()).map_err(|err| format!("{err:?}"))?;
                let latest = store
                    .latest()
                    .map_err(|err| err.to_string())?
                    .ok_or("no snapshot")?;
                let prices = store.prices(latest.id).map_err(|err| err.to_string())?;

                optimise(basket.lines(), &prices, &tiers)
                    .map(|allocation| allocation.total())
                    .map_err(|err| err.to_string())
            })
        })
        .collect();

    store.publish(
        read_sheet(MARCH_REVISED.as_bytes(), SheetFormat::Csv)?.offers,
        settings.currency(),
        "admin",
        MARCH_REVISED.as_bytes(),
    )?;

    for reader in readers {
        let total = reader.join().map_err(|_err| "reader panicked")??;

        assert!(
            total == Decimal::from(9150) || total == Decimal::from(9300),
            "total from a mixed snapshot: {total}"
        );
    }

    Ok(())
}

#[test]
fn idle_basket_is_cleared_after_the_timeout() -> TestResult {
    let settings = Settings::default();
    let policy = settings.expiry_policy();

    let start = Timestamp::UNIX_EPOCH;
    let mut basket = basket(start)?;

    let still_fresh = start.checked_add(SignedDuration::from_mins(20))?;

    assert!(!basket.expire_if_stale(still_fresh, &policy));
    assert_eq!(basket.len(), 2);

    let stale = start.checked_add(SignedDuration::from_mins(21))?;

    assert!(basket.expire_if_stale(stale, &policy));
    assert!(basket.is_empty());
    assert_eq!(basket.created_at(), stale);

    Ok(())
}
