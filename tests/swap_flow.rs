//! End-to-end swap flows against in-memory aggregator and pool-ledger mocks

use omnipool::aggregator::{ExecutionStatus, ExecutionStatusResponse, Quote, SwapDetails};
use omnipool::config::{ChainConfig, Settings, TokenSeed};
use omnipool::intents::rpc::{IntentState, PoolLedgerApi};
use omnipool::mocks::{MockAggregator, MockLedger, MockWallet};
use omnipool::wallet::signer::Ed25519Signer;
use omnipool::Wallet;
use omnipool::{
    BridgeError, CancelToken, ChainFamily, Exchange, IntentsBuilder, NoProgress, Route, SwapMode,
    SwapRequest, SwapSender, SwapStatus, TokenRegistry,
};

use std::sync::Arc;

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.execution.poll_interval_ms = 1;
    settings
}

fn engine_with(settings: Settings) -> (Exchange, Arc<MockAggregator>, Arc<MockLedger>) {
    let settings = Arc::new(settings);
    let registry = Arc::new(TokenRegistry::new(&settings));
    let aggregator = Arc::new(MockAggregator::new());
    let ledger = Arc::new(MockLedger::new());
    let exchange = Exchange::new(settings, registry, aggregator.clone(), ledger.clone());
    (exchange, aggregator, ledger)
}

fn cosmos_chain_settings() -> Settings {
    let mut settings = fast_settings();
    settings.chains.insert(
        "osmos".to_string(),
        ChainConfig {
            chain_id: 7777,
            name: "Osmos".to_string(),
            slug: "osmos".to_string(),
            family: ChainFamily::Cosmos,
            native_alias: None,
            pool_vault: Some("osmos1vaultaccount".to_string()),
            stellar_passphrase: None,
            enabled: true,
        },
    );
    settings.tokens.push(TokenSeed {
        chain: 7777,
        address: "ibc/USDX".to_string(),
        symbol: "USDX".to_string(),
        decimals: 6,
        pool_address: "nep141:osmos-usdx.omft.near".to_string(),
    });
    settings.tokens.push(TokenSeed {
        chain: 7777,
        address: "native".to_string(),
        symbol: "OSM".to_string(),
        decimals: 6,
        pool_address: "nep141:osmos.omft.near".to_string(),
    });
    settings
}

#[tokio::test]
async fn aggregator_swap_settles_end_to_end() {
    let (exchange, aggregator, _) = engine_with(fast_settings());

    aggregator.set_quote(Quote {
        deposit_address: Some("deposit-addr-9".to_string()),
        deposit_memo: None,
        amount_in: "10500000".to_string(),
        amount_out: "10490000".to_string(),
        quote_id: "quote-9".to_string(),
    });

    let sender = MockWallet::evm("0xsender");
    let usdt = exchange
        .registry()
        .get(1, "0xdac17f958d2ee523a2206206994597c13d831ec7")
        .unwrap();
    let usdc = exchange
        .registry()
        .get(1, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")
        .unwrap();

    let review = exchange
        .review_swap(SwapRequest {
            sender: SwapSender::Wallet(&sender),
            refund: &sender,
            from: &usdt,
            to: &usdc,
            amount: usdt.to_minor_units("10.5").unwrap(),
            receiver: "0xreceiver".to_string(),
            slippage_bps: 50,
            mode: SwapMode::ExactIn,
        })
        .await
        .unwrap();

    assert_eq!(review.amount_in, 10_500_000);
    assert_eq!(review.status, SwapStatus::Pending);
    assert!(matches!(review.route, Route::Aggregator { .. }));

    aggregator.push_status(Ok(ExecutionStatusResponse {
        status: ExecutionStatus::PendingDeposit,
        swap_details: SwapDetails::default(),
    }));
    aggregator.push_status(Ok(ExecutionStatusResponse {
        status: ExecutionStatus::Processing,
        swap_details: SwapDetails::default(),
    }));
    aggregator.push_status(Ok(ExecutionStatusResponse {
        status: ExecutionStatus::Success,
        swap_details: SwapDetails {
            amount_out: Some("10480000".to_string()),
        },
    }));

    let settled = exchange
        .make_swap(&sender, review, &NoProgress, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(settled.status, SwapStatus::Success);
    // settlement report overrides the quoted estimate
    assert_eq!(settled.amount_out, 10_480_000);

    // the sender paid into the quote's deposit address
    let transfers = sender.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].receiver, "deposit-addr-9");
    assert_eq!(transfers[0].amount, 10_500_000);

    // and the tx hash was reported to the aggregator
    let submitted = aggregator.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].1, "deposit-addr-9");
}

#[tokio::test]
async fn direct_withdraw_publishes_topup_and_exit_intents() {
    let (exchange, aggregator, ledger) = engine_with(cosmos_chain_settings());
    ledger.set_withdraw_fee("30");
    ledger.set_exact_out("45", "topup-quote-hash");

    let sender = MockWallet::with_family(ChainFamily::Near, "alice.near");
    let pool_usdx = exchange
        .registry()
        .get(0, "nep141:osmos-usdx.omft.near")
        .unwrap();
    let usdx = exchange.registry().get(7777, "ibc/USDX").unwrap();

    let review = exchange
        .review_swap(SwapRequest {
            sender: SwapSender::Wallet(&sender),
            refund: &sender,
            from: &pool_usdx,
            to: &usdx,
            amount: 1_000_000,
            receiver: "osmos1receiver".to_string(),
            slippage_bps: 0,
            mode: SwapMode::ExactIn,
        })
        .await
        .unwrap();

    assert_eq!(review.route, Route::DirectWithdraw);
    assert_eq!(review.amount_out, 1_000_000 - 45);

    ledger.push_intent_status(IntentState::Pending);
    ledger.push_intent_status(IntentState::Settled);

    let settled = exchange
        .make_swap(&sender, review, &NoProgress, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(settled.status, SwapStatus::Success);
    assert!(aggregator.quote_requests().is_empty());

    let published = ledger.published();
    assert_eq!(published.len(), 1);
    let (commitments, quote_hashes) = &published[0];
    assert_eq!(quote_hashes, &vec!["topup-quote-hash".to_string()]);
    assert_eq!(commitments.len(), 1);
    assert_eq!(commitments[0].standard, "raw_ed25519");

    // intents execute in order: gas top-up first, then the pool exit
    let payload: serde_json::Value = serde_json::from_str(&commitments[0].payload).unwrap();
    let intents = payload["intents"].as_array().unwrap();
    assert_eq!(intents.len(), 2);
    assert_eq!(intents[0]["intent"], "token_diff");
    assert_eq!(
        intents[0]["diff"]["nep141:osmos-usdx.omft.near"],
        "-45"
    );
    assert_eq!(intents[1]["intent"], "ft_withdraw");
    assert_eq!(intents[1]["token"], "osmos-usdx.omft.near");
    assert_eq!(intents[1]["receiver_id"], "osmos1vaultaccount");
    assert_eq!(intents[1]["memo"], "WITHDRAW_TO:osmos1receiver");
    assert_eq!(intents[1]["amount"], (1_000_000 - 45).to_string());
}

#[tokio::test]
async fn withdraw_settling_as_invalid_fails_the_review() {
    let (exchange, _, ledger) = engine_with(cosmos_chain_settings());
    ledger.set_withdraw_fee("0");

    let sender = MockWallet::with_family(ChainFamily::Near, "alice.near");
    let pool_usdx = exchange
        .registry()
        .get(0, "nep141:osmos-usdx.omft.near")
        .unwrap();
    let usdx = exchange.registry().get(7777, "ibc/USDX").unwrap();

    let review = exchange
        .review_swap(SwapRequest {
            sender: SwapSender::Wallet(&sender),
            refund: &sender,
            from: &pool_usdx,
            to: &usdx,
            amount: 1_000_000,
            receiver: "osmos1receiver".to_string(),
            slippage_bps: 0,
            mode: SwapMode::ExactIn,
        })
        .await
        .unwrap();

    ledger.push_intent_status(IntentState::NotFoundOrNotValid);

    let settled = exchange
        .make_swap(&sender, review, &NoProgress, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(settled.status, SwapStatus::Failed);
    assert!(settled.status_message.unwrap().contains("did not settle"));
}

#[tokio::test]
async fn republishing_the_same_nonce_is_rejected_as_duplicate() {
    let ledger = MockLedger::new();
    let signer = Ed25519Signer::new([4u8; 32], Some("alice-pool".to_string()));
    let nonce = [42u8; 32];

    let build = || {
        IntentsBuilder::new()
            .transfer("nep141:wrap.near", 1_000, "bob.near")
            .with_nonce(nonce)
    };

    let first = build().execute(&signer, &ledger).await.unwrap();
    assert!(first.intent_hash().is_some());

    let err = build().execute(&signer, &ledger).await.unwrap_err();
    assert!(matches!(err, BridgeError::DuplicateIntent { signer_id } if signer_id == "alice-pool"));

    // determinism: identical inputs produced a byte-identical payload, the
    // endpoint rejected the duplicate rather than double-executing
    let published = ledger.published();
    assert_eq!(published.len(), 1);
    let replay = signer
        .sign_intents(
            build().intents(),
            omnipool::SignOptions {
                nonce: Some(nonce),
                deadline: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(replay.payload, published[0].0[0].payload);
}

#[tokio::test]
async fn pool_balances_flow_through_the_ledger_api() {
    let ledger = MockLedger::new();
    ledger.set_balance("nep141:wrap.near", 77);

    let balances = ledger
        .get_intents_balances(
            &["nep141:wrap.near".to_string(), "nep141:other.near".to_string()],
            "alice-pool",
        )
        .await
        .unwrap();

    assert_eq!(balances["nep141:wrap.near"], 77);
    assert_eq!(balances["nep141:other.near"], 0);
}

#[tokio::test]
async fn balance_wait_resolves_once_funds_cover_the_need() {
    let (exchange, _, ledger) = engine_with(fast_settings());
    ledger.set_balance("nep141:wrap.near", 500);

    let mut needs = std::collections::HashMap::new();
    needs.insert("nep141:wrap.near".to_string(), 300u128);

    let covered = exchange
        .bridge()
        .wait_for_balance(&needs, "alice-pool", CancelToken::never())
        .await
        .unwrap();
    assert!(covered);

    needs.insert("nep141:wrap.near".to_string(), 5_000u128);
    let mut settings = fast_settings();
    settings.execution.deposit_wait_attempts = 2;
    let (exchange, _, ledger) = engine_with(settings);
    ledger.set_balance("nep141:wrap.near", 500);

    let err = exchange
        .bridge()
        .wait_for_balance(&needs, "alice-pool", CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout { .. }));
}

#[tokio::test]
async fn external_senders_can_review_but_carry_no_transfer_fee() {
    let (exchange, aggregator, _) = engine_with(fast_settings());
    aggregator.set_quote(Quote {
        deposit_address: Some("qr-deposit".to_string()),
        deposit_memo: None,
        amount_in: "1000".to_string(),
        amount_out: "990".to_string(),
        quote_id: "q-qr".to_string(),
    });

    let refund = MockWallet::evm("0xrefund");
    let usdt = exchange
        .registry()
        .get(1, "0xdac17f958d2ee523a2206206994597c13d831ec7")
        .unwrap();
    let sol = exchange.registry().get(1001, "native").unwrap();

    let review = exchange
        .review_swap(SwapRequest {
            sender: SwapSender::External,
            refund: &refund,
            from: &usdt,
            to: &sol,
            amount: 1_000,
            receiver: "solreceiver".to_string(),
            slippage_bps: 25,
            mode: SwapMode::ExactIn,
        })
        .await
        .unwrap();

    assert!(review.fee.is_free());
    assert!(matches!(review.route, Route::Aggregator { .. }));
}
