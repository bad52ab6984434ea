//! End-to-end keeper scenario against the in-memory mock clients: a long
//! GBP position with a take-profit, a price that ticks through the
//! threshold, and the loop settling it exactly once.

use std::sync::Arc;
use synth_keeper_core::{
    Direction, KeeperConfig, LedgerClient, OracleClient, Position, WatchTarget,
};
use synth_keeper_engine::mock::{IndexSpace, MockLedger, MockOracle};
use synth_keeper_engine::Keeper;

const FEED_DECIMALS: u8 = 8;

fn gbp_long() -> Position {
    Position {
        trader: "0x00000000000000000000000000000000000000ab".to_string(),
        instrument: "GBP".to_string(),
        direction: Direction::Long,
        entry_price: 136_000_000,       // 1.36000
        take_profit_price: 136_200_000, // 1.36200
        stop_loss_price: 0,             // no SL
        size: 10_u128.pow(18),
        margin: 10_u128.pow(17),
        leverage: 10 * 10_u128.pow(18),
        is_open: true,
        local_index: 0,
        global_id: 7,
    }
}

fn config() -> KeeperConfig {
    let mut config = KeeperConfig::default();
    config.watch = vec![WatchTarget {
        trader: gbp_long().trader,
        instruments: vec!["GBP".to_string()],
    }];
    // Cross-checks exercise the derived-price path in the mock, which is
    // not the subject here.
    config.keeper.cross_check_tolerance_bps = None;
    config
}

fn build_keeper(ledger: &Arc<MockLedger>, oracle: &Arc<MockOracle>) -> Keeper {
    Keeper::new(
        &config(),
        Arc::clone(ledger) as Arc<dyn LedgerClient>,
        Arc::clone(oracle) as Arc<dyn OracleClient>,
    )
}

#[tokio::test]
async fn long_take_profit_settles_once() {
    let ledger = Arc::new(MockLedger::new());
    let oracle = Arc::new(MockOracle::new());
    ledger.add_open_position(gbp_long());

    let mut keeper = build_keeper(&ledger, &oracle);

    // First tick: 1.36150, below TP. Watched, but no action.
    oracle.set_price("GBP", 136_150_000, FEED_DECIMALS);
    ledger.set_price("GBP", 136_150_000);
    keeper.tick().await;
    assert_eq!(ledger.with_state(|state| state.submit_calls), 0);

    // Second tick: 1.36210, through the TP. Settles via the local index
    // with the permissive floor bound (zero for a long close).
    oracle.set_price("GBP", 136_210_000, FEED_DECIMALS);
    ledger.set_price("GBP", 136_210_000);
    keeper.tick().await;
    assert_eq!(ledger.with_state(|state| state.submit_calls), 1);
    assert_eq!(ledger.with_state(|state| state.submitted_bounds.clone()), vec![0]);
    assert!(ledger.with_state(|state| !state.positions[0].is_open));

    // Third tick: position closed; no further simulate or submit calls.
    let probes_before = ledger.with_state(|state| state.simulate_calls);
    keeper.tick().await;
    assert_eq!(ledger.with_state(|state| state.submit_calls), 1);
    assert_eq!(ledger.with_state(|state| state.simulate_calls), probes_before);
}

#[tokio::test]
async fn settles_through_global_index_when_local_rejected() {
    let ledger = Arc::new(MockLedger::new());
    let oracle = Arc::new(MockOracle::new());
    ledger.add_open_position(gbp_long());
    ledger.with_state(|state| state.index_space = IndexSpace::Global);

    let mut keeper = build_keeper(&ledger, &oracle);
    oracle.set_price("GBP", 136_210_000, FEED_DECIMALS);
    ledger.set_price("GBP", 136_210_000);
    keeper.tick().await;

    assert_eq!(ledger.with_state(|state| state.submit_calls), 1);
    assert!(ledger.with_state(|state| !state.positions[0].is_open));
}

#[tokio::test]
async fn closed_identity_is_never_rewatched() {
    let ledger = Arc::new(MockLedger::new());
    let oracle = Arc::new(MockOracle::new());
    ledger.add_open_position(gbp_long());

    let mut keeper = build_keeper(&ledger, &oracle);
    oracle.set_price("GBP", 136_210_000, FEED_DECIMALS);
    ledger.set_price("GBP", 136_210_000);
    keeper.tick().await;
    assert_eq!(ledger.with_state(|state| state.submit_calls), 1);

    // Even if the ledger state were rewound to open under the same
    // identity, the keeper refuses to act on it again.
    ledger.with_state(|state| {
        state.positions[0].is_open = true;
        state
            .open_ids
            .entry((gbp_long().trader, "GBP".to_string()))
            .or_default()
            .push(0);
    });
    keeper.tick().await;
    keeper.tick().await;
    assert_eq!(ledger.with_state(|state| state.submit_calls), 1);
}

#[tokio::test]
async fn registry_outage_does_not_drop_watched_positions() {
    let ledger = Arc::new(MockLedger::new());
    let oracle = Arc::new(MockOracle::new());
    ledger.add_open_position(gbp_long());

    let mut keeper = build_keeper(&ledger, &oracle);
    oracle.set_price("GBP", 136_150_000, FEED_DECIMALS);
    ledger.set_price("GBP", 136_150_000);
    keeper.tick().await;

    // Reads fail for a few ticks; the watch set must survive so the
    // trigger still fires once reads recover.
    ledger.with_state(|state| state.fail_reads = true);
    oracle.set_price("GBP", 136_210_000, FEED_DECIMALS);
    ledger.set_price("GBP", 136_210_000);
    keeper.tick().await;
    assert_eq!(ledger.with_state(|state| state.submit_calls), 1);
}

#[tokio::test]
async fn stale_quote_skips_evaluation() {
    let ledger = Arc::new(MockLedger::new());
    let oracle = Arc::new(MockOracle::new());
    ledger.add_open_position(gbp_long());

    let mut keeper = build_keeper(&ledger, &oracle);
    oracle.set_quote(synth_keeper_core::PriceQuote {
        instrument: "GBP".to_string(),
        raw_answer: 136_210_000,
        decimals: FEED_DECIMALS,
        observed_at: chrono::Utc::now().timestamp() - 10_000,
    });
    ledger.set_price("GBP", 136_210_000);
    keeper.tick().await;

    assert_eq!(ledger.with_state(|state| state.submit_calls), 0);
    // Entry stays watched for when the feed recovers.
    oracle.set_price("GBP", 136_210_000, FEED_DECIMALS);
    keeper.tick().await;
    assert_eq!(ledger.with_state(|state| state.submit_calls), 1);
}
