#![cfg(feature = "moka")]

use assert_matches::assert_matches;
use astrostocks_cache::payload::{Location, PlanetaryTransit, SectorPrediction};
use astrostocks_cache::{
    AnalysisPayload, AnalysisType, CacheConfig, CacheError, CacheLayer, ManualClock,
    PredictionPayload, QuotePayload, StoreStats, TransitPayload,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{Map, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 1, 9, 15, 0).unwrap()
}

fn layer() -> (CacheLayer, ManualClock) {
    let clock = ManualClock::new(start());
    let layer = CacheLayer::in_memory_with_clock(CacheConfig::default(), Arc::new(clock.clone()));
    (layer, clock)
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, day).unwrap()
}

fn prediction(day: NaiveDate, sentiment: &str) -> PredictionPayload {
    PredictionPayload {
        prediction_date: day,
        generated_at: Utc.with_ymd_and_hms(2025, 11, 1, 3, 45, 12).unwrap()
            + chrono::TimeDelta::nanoseconds(123_456_789),
        location: Location {
            latitude: 19.076,
            longitude: 72.8777,
            timezone: "Asia/Kolkata".to_string(),
        },
        planetary_transits: vec![PlanetaryTransit {
            planet: "Saturn".to_string(),
            sign: "Pisces".to_string(),
            longitude: 331.42,
            degree_in_sign: 1.42,
            dignity: "Neutral".to_string(),
            retrograde: true,
            transit_start: Some(Utc.with_ymd_and_hms(2025, 3, 29, 21, 44, 0).unwrap()),
            transit_end: None,
        }],
        overall_sentiment: sentiment.to_string(),
        sector_predictions: vec![sector("Banking", "Bullish")],
        ai_analysis: "Saturn retrograde favours consolidation.".to_string(),
        confidence: 0.68,
    }
}

fn sector(name: &str, trend: &str) -> SectorPrediction {
    SectorPrediction {
        sector: name.to_string(),
        trend: trend.to_string(),
        planetary_influence: Some("Jupiter".to_string()),
        reason: None,
        top_stocks: vec!["HDFCBANK".to_string(), "ICICIBANK".to_string()],
        confidence: Some(0.7),
        ai_insights: None,
    }
}

fn analysis(day: NaiveDate, analysis_type: AnalysisType) -> AnalysisPayload {
    let mut details = Map::new();
    details.insert("model".to_string(), json!(analysis_type.as_str()));
    AnalysisPayload {
        analysis_date: day,
        analysis_type,
        generated_at: start(),
        sector_predictions: vec![sector("IT", "Bearish")],
        overall_sentiment: "Neutral".to_string(),
        accuracy_estimate: "70-75%".to_string(),
        details,
    }
}

fn transits(day: NaiveDate, saturn_longitude: f64) -> TransitPayload {
    TransitPayload {
        transit_date: day,
        generated_at: start(),
        transits: vec![PlanetaryTransit {
            planet: "Saturn".to_string(),
            sign: "Pisces".to_string(),
            longitude: saturn_longitude,
            degree_in_sign: saturn_longitude - 330.0,
            dignity: "Neutral".to_string(),
            retrograde: false,
            transit_start: Some(Utc.with_ymd_and_hms(2025, 3, 29, 21, 44, 0).unwrap()),
            transit_end: None,
        }],
    }
}

fn quote(symbol: String, price: f64) -> QuotePayload {
    QuotePayload {
        symbol,
        current_price: Some(price),
        open_price: Some(price - 4.0),
        high: Some(price + 6.5),
        low: Some(price - 9.0),
        volume: Some(1_250_000.0),
        change_percent: Some(0.42),
        pe_ratio: Some(27.3),
        market_cap: None,
        week_52_high: None,
        week_52_low: None,
        sector: "Energy".to_string(),
        fetched_at: start(),
    }
}

#[tokio::test]
async fn test_prediction_round_trips_typed_payload() {
    let (layer, _) = layer();
    let expected = prediction(date(1), "Bullish");

    let produced = expected.clone();
    let fresh = layer
        .predictions()
        .get_or_compute(date(1), || async move { Ok(produced) })
        .await
        .unwrap();
    let cached = layer
        .predictions()
        .get_or_compute(date(1), || async { Err(CacheError::producer("must not run")) })
        .await
        .unwrap();

    assert_eq!(fresh, expected);
    assert_eq!(cached, expected);
}

#[tokio::test]
async fn test_prediction_refresh_replaces_entry() {
    let (layer, _) = layer();
    let predictions = layer.predictions();

    predictions
        .get_or_compute(date(1), || async { Ok(prediction(date(1), "Bullish")) })
        .await
        .unwrap();
    let refreshed = predictions
        .refresh(date(1), || async { Ok(prediction(date(1), "Bearish")) })
        .await
        .unwrap();
    let cached = predictions
        .get_or_compute(date(1), || async { Ok(prediction(date(1), "Neutral")) })
        .await
        .unwrap();

    assert_eq!(refreshed.overall_sentiment, "Bearish");
    assert_eq!(cached.overall_sentiment, "Bearish");
}

#[tokio::test]
async fn test_failed_refresh_keeps_cached_prediction() {
    let (layer, _) = layer();
    let predictions = layer.predictions();

    predictions
        .get_or_compute(date(1), || async { Ok(prediction(date(1), "Bullish")) })
        .await
        .unwrap();
    let failed = predictions
        .refresh(date(1), || async { Err(CacheError::producer("LLM quota exceeded")) })
        .await;
    assert_matches!(failed, Err(CacheError::ProducerFailure(_)));

    let cached = predictions
        .get_or_compute(date(1), || async { Ok(prediction(date(1), "Neutral")) })
        .await
        .unwrap();
    assert_eq!(cached.overall_sentiment, "Bullish");
}

#[tokio::test]
async fn test_analysis_types_are_cached_separately() {
    let (layer, _) = layer();
    let analyses = layer.analyses();
    let calls = Arc::new(AtomicUsize::new(0));

    for analysis_type in [AnalysisType::Basic, AnalysisType::Enhanced, AnalysisType::Basic] {
        let calls = Arc::clone(&calls);
        let value = analyses
            .get_or_compute(date(1), analysis_type, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(analysis(date(1), analysis_type))
            })
            .await
            .unwrap();
        assert_eq!(value.analysis_type, analysis_type);
        assert_eq!(value.details["model"], json!(analysis_type.as_str()));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(analyses.invalidate(date(1), AnalysisType::Enhanced).await.unwrap());
    assert_eq!(analyses.stats().await.unwrap().live(), 1);
}

#[tokio::test]
async fn test_purge_before_drops_older_dates_only() {
    let (layer, _) = layer();
    let day = |d| NaiveDate::from_ymd_opt(2025, 10, d).unwrap();

    for prediction_date in [day(29), day(30), date(1)] {
        layer
            .predictions()
            .get_or_compute(prediction_date, move || async move {
                Ok(prediction(prediction_date, "Neutral"))
            })
            .await
            .unwrap();
    }
    for (analysis_date, analysis_type) in [
        (day(31), AnalysisType::Basic),
        (day(31), AnalysisType::Enhanced),
        (date(1), AnalysisType::Basic),
    ] {
        layer
            .analyses()
            .get_or_compute(analysis_date, analysis_type, move || async move {
                Ok(analysis(analysis_date, analysis_type))
            })
            .await
            .unwrap();
    }

    assert_eq!(layer.predictions().purge_before(date(1)).await.unwrap(), 2);
    assert_eq!(layer.analyses().purge_before(date(1)).await.unwrap(), 2);

    let report = layer.stats().await.unwrap();
    assert_eq!(report.predictions, 1);
    assert_eq!(report.analyses, 1);
    assert_eq!(layer.predictions().stats_for("prediction:2025-11").await.unwrap(), 1);
}

#[tokio::test]
async fn test_quote_symbols_share_normalized_entry() {
    let (layer, _) = layer();
    let calls = Arc::new(AtomicUsize::new(0));

    for raw in ["reliance", " RELIANCE ", "Reliance"] {
        let calls = Arc::clone(&calls);
        let value = layer
            .quotes()
            .get_or_compute(raw, false, move |symbol| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(quote(symbol, 2950.0))
            })
            .await
            .unwrap();
        assert_eq!(value.symbol, "RELIANCE");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let empty = layer
        .quotes()
        .get_or_compute("  ", false, |symbol| async move { Ok(quote(symbol, 1.0)) })
        .await;
    assert_matches!(empty, Err(CacheError::InvalidKey(_)));
}

#[tokio::test]
async fn test_quote_force_refresh_and_expiry() {
    let (layer, clock) = layer();
    let quotes = layer.quotes();

    let first = quotes
        .get_or_compute("TCS", false, |symbol| async move { Ok(quote(symbol, 4100.0)) })
        .await
        .unwrap();
    let forced = quotes
        .get_or_compute("TCS", true, |symbol| async move { Ok(quote(symbol, 4112.5)) })
        .await
        .unwrap();
    assert_eq!(first.current_price, Some(4100.0));
    assert_eq!(forced.current_price, Some(4112.5));

    clock.advance(Duration::from_secs(30 * 60));
    let cached = quotes
        .get_or_compute("TCS", false, |symbol| async move { Ok(quote(symbol, 0.0)) })
        .await
        .unwrap();
    assert_eq!(cached.current_price, Some(4112.5));

    clock.advance(Duration::from_secs(31 * 60));
    let refetched = quotes
        .get_or_compute("TCS", false, |symbol| async move { Ok(quote(symbol, 4090.0)) })
        .await
        .unwrap();
    assert_eq!(refetched.current_price, Some(4090.0));
}

#[tokio::test]
async fn test_get_many_resolves_each_symbol() {
    let (layer, _) = layer();
    let calls = Arc::new(AtomicUsize::new(0));

    layer
        .quotes()
        .get_or_compute("INFY", false, |symbol| async move { Ok(quote(symbol, 1532.4)) })
        .await
        .unwrap();

    let counter = Arc::clone(&calls);
    let results = layer
        .quotes()
        .get_many(&["infy", "wipro", "hdfcbank"], false, move |symbol| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if symbol == "WIPRO" {
                    return Err(CacheError::producer("symbol delisted upstream"));
                }
                Ok(quote(symbol, 1650.0))
            }
        })
        .await;

    let symbols: Vec<_> = results.iter().map(|(symbol, _)| symbol.as_str()).collect();
    assert_eq!(symbols, ["INFY", "WIPRO", "HDFCBANK"]);
    assert_eq!(results[0].1.as_ref().unwrap().current_price, Some(1532.4));
    assert_matches!(&results[1].1, Err(CacheError::ProducerFailure(_)));
    assert_eq!(results[2].1.as_ref().unwrap().symbol, "HDFCBANK");
    // INFY was already cached.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_layer_stats_and_sweep() {
    let (layer, clock) = layer();

    layer
        .predictions()
        .get_or_compute(date(1), || async { Ok(prediction(date(1), "Bullish")) })
        .await
        .unwrap();
    layer
        .analyses()
        .get_or_compute(date(1), AnalysisType::Enhanced, || async {
            Ok(analysis(date(1), AnalysisType::Enhanced))
        })
        .await
        .unwrap();
    for symbol in ["SBIN", "ITC"] {
        layer
            .quotes()
            .get_or_compute(symbol, false, |symbol| async move { Ok(quote(symbol, 600.0)) })
            .await
            .unwrap();
    }

    let report = layer.stats().await.unwrap();
    assert_eq!((report.predictions, report.analyses, report.quotes), (1, 1, 2));
    assert_eq!(report.date_keyed, StoreStats { total: 2, expired_but_present: 0 });

    clock.advance(Duration::from_secs(2 * 3600));
    let report = layer.stats().await.unwrap();
    assert_eq!(report.quotes, 0);
    assert_eq!(report.rolling, StoreStats { total: 2, expired_but_present: 2 });

    // Expired one hour ago, so a one-day threshold keeps them.
    assert_eq!(layer.sweep_days(1).await.unwrap(), 0);
    assert_eq!(layer.sweep_days(0).await.unwrap(), 2);

    let report = layer.stats().await.unwrap();
    assert_eq!(report.rolling.total, 0);
    assert_eq!(report.predictions, 1);
    assert_eq!(report.analyses, 1);
}

#[tokio::test]
async fn test_report_serializes_for_diagnostics() {
    let (layer, _) = layer();
    layer
        .predictions()
        .get_or_compute(date(1), || async { Ok(prediction(date(1), "Bullish")) })
        .await
        .unwrap();

    let report = serde_json::to_value(layer.stats().await.unwrap()).unwrap();
    assert_eq!(report["predictions"], json!(1));
    assert_eq!(report["date_keyed"]["total"], json!(1));
}

#[tokio::test]
async fn test_transits_are_cached_per_date_and_refreshable() {
    let (layer, clock) = layer();
    let cache = layer.transits();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        let value = cache
            .get_or_compute(date(1), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(transits(date(1), 331.42))
            })
            .await
            .unwrap();
        assert_eq!(value, transits(date(1), 331.42));
        clock.advance(Duration::from_secs(86_400));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let refreshed = cache
        .refresh(date(1), || async { Ok(transits(date(1), 331.5)) })
        .await
        .unwrap();
    assert_eq!(refreshed.transits[0].longitude, 331.5);

    // A prediction for the same date is a separate entry.
    layer
        .predictions()
        .get_or_compute(date(1), || async { Ok(prediction(date(1), "Bullish")) })
        .await
        .unwrap();

    let report = layer.stats().await.unwrap();
    assert_eq!((report.transits, report.predictions), (1, 1));

    assert!(cache.invalidate(date(1)).await.unwrap());
    assert_eq!(cache.stats().await.unwrap().total, 0);
    assert_eq!(layer.stats().await.unwrap().predictions, 1);
}
