//! Outbound client tests against in-process stubs of Supabase Storage,
//! DexScreener and the analysis backend

use std::sync::Arc;
use std::time::Duration;

use alpha_core::{AnalysisRequest, JobStatus, TokenRecord};
use alpha_dash::jobs::{AnalysisBackend, JobReport, RailwayBackend, Submission};
use alpha_dash::market::{DexScreenerClient, Freshness, MarketData, check_freshness, enrich};
use alpha_dash::storage::{AnalysisArchive, DataSource, ObjectStore, SupabaseStore, TokenFeedReader};
use alpha_dash::Error;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Supabase Storage
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Bucket {
    uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("apikey").is_some_and(|v| v == "service-key")
        && headers
            .get("authorization")
            .is_some_and(|v| v == "Bearer service-key")
}

fn supabase_stub(bucket: Arc<Bucket>) -> Router {
    async fn overlap(headers: HeaderMap) -> (StatusCode, Json<Value>) {
        if !authorized(&headers) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})));
        }
        (
            StatusCode::OK,
            Json(json!({
                "Mint1": [{"result": {"grade": "MEDIUM", "checked_at": "2024-03-01T12:00:00Z"}}]
            })),
        )
    }

    async fn list(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if !authorized(&headers) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})));
        }
        assert_eq!(body["prefix"], "recent_analyses");
        (
            StatusCode::OK,
            Json(json!([
                {"name": "analysis_2000.json", "id": "x"},
                {"name": "notes.txt"},
                {"name": "analysis_1000.json"}
            ])),
        )
    }

    async fn analysis(Path(file): Path<String>) -> (StatusCode, Json<Value>) {
        match file.as_str() {
            "analysis_2000.json" => (
                StatusCode::OK,
                Json(json!({"timestamp": "2024-03-02T00:00:00Z", "tokens": ["B"]})),
            ),
            "analysis_1000.json" => (
                StatusCode::OK,
                Json(json!({"id": "first", "timestamp": "2024-03-01T00:00:00Z"})),
            ),
            _ => (
                StatusCode::BAD_REQUEST,
                Json(json!({"statusCode": "404", "error": "not_found", "message": "Object not found"})),
            ),
        }
    }

    async fn upload(
        State(bucket): State<Arc<Bucket>>,
        Path(file): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        let upsert = headers
            .get("x-upsert")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        bucket.uploads.lock().push((file, upsert, body.to_vec()));
        StatusCode::OK
    }

    Router::new()
        .route(
            "/storage/v1/object/monitor-data/overlap_results.json",
            get(overlap),
        )
        .route("/storage/v1/object/list/monitor-data", post(list))
        .route(
            "/storage/v1/object/monitor-data/recent_analyses/{file}",
            get(analysis).post(upload),
        )
        .with_state(bucket)
}

#[tokio::test]
async fn test_supabase_feed_and_archive() {
    let bucket = Arc::new(Bucket::default());
    let base = serve(supabase_stub(Arc::clone(&bucket))).await;
    let store: Arc<dyn ObjectStore> =
        Arc::new(SupabaseStore::new(&base, "service-key", "monitor-data", TIMEOUT).unwrap());

    let reader = TokenFeedReader::new(Some(Arc::clone(&store)), "overlap_results.json", 100, true);
    let snapshot = reader.load().await;
    assert_eq!(snapshot.data_source, DataSource::SupabaseJson);
    assert_eq!(snapshot.tokens.len(), 1);
    assert_eq!(snapshot.tokens[0].id, "Mint1");
    assert_eq!(snapshot.tokens[0].name, "Unknown");

    let archive = AnalysisArchive::new(Some(Arc::clone(&store)), "recent_analyses", 100);
    let analyses = archive.list_all().await;
    let ids: Vec<_> = analyses.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["analysis_2000", "first"]);

    let path = archive.save(&analyses[1]).await.unwrap();
    assert!(path.starts_with("recent_analyses/analysis_"));
    let uploads = bucket.uploads.lock();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, "false");
    let saved: Value = serde_json::from_slice(&uploads[0].2).unwrap();
    assert_eq!(saved["id"], "first");
}

#[tokio::test]
async fn test_supabase_missing_object_and_bad_key() {
    let base = serve(supabase_stub(Arc::new(Bucket::default()))).await;

    let store = SupabaseStore::new(&base, "service-key", "monitor-data", TIMEOUT).unwrap();
    let missing = store.download("recent_analyses/analysis_3.json").await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    let wrong_key: Arc<dyn ObjectStore> =
        Arc::new(SupabaseStore::new(&base, "other", "monitor-data", TIMEOUT).unwrap());
    assert!(matches!(
        wrong_key.download("overlap_results.json").await,
        Err(Error::Storage(_))
    ));

    // an unreachable feed falls back to the sample tokens
    let reader = TokenFeedReader::new(Some(wrong_key), "overlap_results.json", 100, true);
    let snapshot = reader.load().await;
    assert_eq!(snapshot.data_source, DataSource::ErrorFallback);
    assert_eq!(snapshot.tokens.len(), 12);
}

// ---------------------------------------------------------------------------
// DexScreener
// ---------------------------------------------------------------------------

fn dexscreener_stub() -> Router {
    async fn tokens(Path(address): Path<String>) -> Json<Value> {
        match address.as_str() {
            "MintFresh" => Json(json!({
                "schemaVersion": "1.0.0",
                "pairs": [{
                    "chainId": "solana",
                    "dexId": "raydium",
                    "url": "https://dexscreener.com/solana/pairfresh",
                    "pairAddress": "PairFresh",
                    "baseToken": {"address": "MintFresh", "name": "Fresh Coin", "symbol": "FRSH"},
                    "quoteToken": {"address": "So111", "name": "Wrapped SOL", "symbol": "SOL"},
                    "priceNative": "0.0000021",
                    "priceUsd": "0.0003",
                    "txns": {"h24": {"buys": 120, "sells": 80}},
                    "volume": {"h24": 52000.5, "h1": 1200},
                    "priceChange": {"h24": -12.5},
                    "liquidity": {"usd": 30000, "base": 1, "quote": 2},
                    "fdv": 300000,
                    "marketCap": 250000,
                    "pairCreatedAt": 1_709_294_400_000_i64,
                    "info": {
                        "websites": [{"label": "Website", "url": "https://fresh.example"}],
                        "socials": [{"type": "twitter", "url": "https://x.com/fresh"}]
                    }
                }]
            })),
            "MintOld" => Json(json!({
                "pairs": [{"priceUsd": "1.5", "pairCreatedAt": 1_577_836_800_000_i64}]
            })),
            _ => Json(json!({"schemaVersion": "1.0.0", "pairs": null})),
        }
    }

    Router::new().route("/latest/dex/tokens/{address}", get(tokens))
}

#[tokio::test]
async fn test_dexscreener_enrichment() {
    let base = serve(dexscreener_stub()).await;
    let client = DexScreenerClient::new(&base, TIMEOUT).unwrap();

    let record = enrich(&client, TokenRecord::new("MintFresh")).await;
    assert_eq!(record.symbol, "FRSH");
    assert_eq!(record.name, "Fresh Coin");
    assert_eq!(record.dexscreener_url, "https://dexscreener.com/solana/pairfresh");
    let m = &record.market;
    assert_eq!(m.price_usd, Some(0.0003));
    assert_eq!(m.price_change_24h, Some(-12.5));
    assert_eq!(m.volume_24h, Some(52000.5));
    assert_eq!(m.buys_24h, Some(120));
    assert_eq!(m.sells_24h, Some(80));
    assert_eq!(m.liquidity_usd, Some(30000.0));
    assert_eq!(m.marketcap, Some(250_000.0));
    assert_eq!(m.dex.as_deref(), Some("raydium"));
    assert_eq!(m.website.as_deref(), Some("https://fresh.example"));
    assert_eq!(m.twitter.as_deref(), Some("https://x.com/fresh"));
    assert_eq!(m.telegram, None);

    // no pairs leaves the record as it was
    let untouched = enrich(&client, TokenRecord::new("MintNone")).await;
    assert_eq!(untouched, TokenRecord::new("MintNone"));
    assert_eq!(client.token_pair("MintNone").await.unwrap(), None);
}

#[tokio::test]
async fn test_dexscreener_freshness() {
    let base = serve(dexscreener_stub()).await;
    let client = DexScreenerClient::new(&base, TIMEOUT).unwrap();
    let max_age = Duration::from_secs(2 * 86_400);
    // one day after MintFresh's pair was created
    let now = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();

    assert!(check_freshness(&client, "MintFresh", now, max_age).await.is_fresh());
    assert!(matches!(
        check_freshness(&client, "MintOld", now, max_age).await,
        Freshness::Stale { .. }
    ));
    assert_eq!(
        check_freshness(&client, "MintNone", now, max_age).await,
        Freshness::NoPair
    );

    let unreachable = DexScreenerClient::new("http://127.0.0.1:9", TIMEOUT).unwrap();
    assert!(matches!(
        check_freshness(&unreachable, "MintFresh", now, max_age).await,
        Freshness::LookupFailed(_)
    ));
}

// ---------------------------------------------------------------------------
// Analysis backend
// ---------------------------------------------------------------------------

fn backend_stub() -> Router {
    async fn analyze(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let tokens = body["tokens"].as_array().cloned().unwrap_or_default();
        match tokens.first().and_then(Value::as_str) {
            Some("Queue") => (StatusCode::OK, Json(json!({"job_id": "j-9", "status": "pending"}))),
            Some("Now") => (
                StatusCode::OK,
                Json(json!({"analysis": {"id": "a-1", "tokens": ["Now"], "records": []}})),
            ),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"}))),
        }
    }

    async fn status(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
        match id.as_str() {
            "j-9" => (
                StatusCode::OK,
                Json(json!({"status": "failed", "error": "no trades in window"})),
            ),
            _ => (StatusCode::NOT_FOUND, Json(json!({"detail": "Job not found"}))),
        }
    }

    Router::new()
        .route("/analyze", post(analyze))
        .route("/status/{id}", get(status))
}

fn request(token: &str) -> AnalysisRequest {
    serde_json::from_value(json!({"tokens": [token], "min_buy": 50})).unwrap()
}

#[tokio::test]
async fn test_backend_submit_and_status() {
    let base = serve(backend_stub()).await;
    let backend = RailwayBackend::new(&format!("{base}/"), TIMEOUT).unwrap();

    assert_eq!(
        backend.submit(&request("Queue")).await.unwrap(),
        Submission::Queued {
            job_id: "j-9".into(),
            report: JobReport {
                status: JobStatus::Pending,
                result: None,
                error: None,
            },
        }
    );

    let Submission::Immediate(result) = backend.submit(&request("Now")).await.unwrap() else {
        panic!("expected an immediate result");
    };
    assert_eq!(result.id, "a-1");

    let report = backend.status("j-9").await.unwrap();
    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(report.error.as_deref(), Some("no trades in window"));
}

#[tokio::test]
async fn test_backend_errors_carry_status_and_message() {
    let base = serve(backend_stub()).await;
    let backend = RailwayBackend::new(&base, TIMEOUT).unwrap();

    match backend.submit(&request("Other")).await {
        Err(Error::Backend { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected: {other:?}"),
    }

    match backend.status("missing").await {
        Err(Error::Backend { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "Job not found");
        }
        other => panic!("unexpected: {other:?}"),
    }
}
