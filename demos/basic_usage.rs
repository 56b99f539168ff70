use astrostocks_cache::payload::{Location, SectorPrediction};
use astrostocks_cache::{
    AnalysisPayload, AnalysisType, CacheConfig, CacheLayer, PredictionPayload, QuotePayload,
};
use chrono::{NaiveDate, Utc};
use serde_json::Map;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("astrostocks_cache=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cache = CacheLayer::in_memory(CacheConfig::from_env());
    let today = Utc::now().date_naive();

    println!("=== Daily Prediction ===");

    // First call computes; the second is served from cache.
    for attempt in 1..=2 {
        let prediction = cache
            .predictions()
            .get_or_compute(today, move || async move {
                println!("Computing ephemeris for {today}...");
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(sample_prediction(today))
            })
            .await?;
        println!(
            "Attempt {attempt}: {} ({:.0}% confidence)",
            prediction.overall_sentiment,
            prediction.confidence * 100.0
        );
    }

    println!("\n=== Analysis Per Type ===");

    for analysis_type in [AnalysisType::Basic, AnalysisType::Enhanced] {
        let analysis = cache
            .analyses()
            .get_or_compute(today, analysis_type, move || async move {
                println!("Running {analysis_type} analysis...");
                Ok(sample_analysis(today, analysis_type))
            })
            .await?;
        println!("{}: accuracy {}", analysis.analysis_type, analysis.accuracy_estimate);
    }

    println!("\n=== Quote Batch ===");

    let quotes = cache
        .quotes()
        .get_many(&["reliance", "tcs", "infy"], false, |symbol| async move {
            println!("Fetching quote for {symbol}...");
            Ok(sample_quote(symbol))
        })
        .await;
    for (symbol, quote) in quotes {
        match quote {
            Ok(quote) => println!("{symbol}: {:?} ({})", quote.current_price, quote.price_trend()),
            Err(err) => println!("{symbol}: unavailable ({err})"),
        }
    }

    println!("\n=== Stats ===");

    let report = cache.stats().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let removed = cache.sweep_default().await?;
    println!("Maintenance sweep removed {removed} entries");

    Ok(())
}

fn sample_prediction(date: NaiveDate) -> PredictionPayload {
    PredictionPayload {
        prediction_date: date,
        generated_at: Utc::now(),
        location: Location {
            latitude: 19.076,
            longitude: 72.8777,
            timezone: "Asia/Kolkata".to_string(),
        },
        planetary_transits: Vec::new(),
        overall_sentiment: "Bullish".to_string(),
        sector_predictions: vec![SectorPrediction {
            sector: "Banking".to_string(),
            trend: "Bullish".to_string(),
            planetary_influence: Some("Jupiter".to_string()),
            reason: None,
            top_stocks: vec!["HDFCBANK".to_string()],
            confidence: Some(0.72),
            ai_insights: None,
        }],
        ai_analysis: "Jupiter in Taurus supports financials.".to_string(),
        confidence: 0.72,
    }
}

fn sample_analysis(date: NaiveDate, analysis_type: AnalysisType) -> AnalysisPayload {
    AnalysisPayload {
        analysis_date: date,
        analysis_type,
        generated_at: Utc::now(),
        sector_predictions: Vec::new(),
        overall_sentiment: "Neutral".to_string(),
        accuracy_estimate: match analysis_type {
            AnalysisType::Basic => "60-65%".to_string(),
            AnalysisType::Enhanced => "70-75%".to_string(),
        },
        details: Map::new(),
    }
}

fn sample_quote(symbol: String) -> QuotePayload {
    QuotePayload {
        symbol,
        current_price: Some(1500.0),
        open_price: Some(1490.0),
        high: Some(1512.0),
        low: Some(1484.5),
        volume: Some(2_000_000.0),
        change_percent: Some(0.67),
        pe_ratio: None,
        market_cap: None,
        week_52_high: None,
        week_52_low: None,
        sector: "Unknown".to_string(),
        fetched_at: Utc::now(),
    }
}
