//! Typed payloads for the cached resources.
//!
//! Stores see payloads as opaque JSON; [`Payload`] is the tagged union the
//! orchestrator encodes and decodes, with one variant per resource.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::CacheError;

/// Any value the adapters cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Market prediction for one calendar date
    Prediction(PredictionPayload),
    /// Sector analysis for one date and analysis type
    Analysis(AnalysisPayload),
    /// Planetary positions for one calendar date
    Transit(TransitPayload),
    /// Live market quote for one symbol
    Quote(QuotePayload),
}

impl Payload {
    /// Name of the variant, as stored in the `kind` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Prediction(_) => "prediction",
            Payload::Analysis(_) => "analysis",
            Payload::Transit(_) => "transit",
            Payload::Quote(_) => "quote",
        }
    }
}

/// A payload type that travels through the cache as one [`Payload`] variant.
pub trait CachedResource:
    Into<Payload> + TryFrom<Payload, Error = CacheError> + Clone + Send + Sync + 'static
{
    /// The `kind` tag of the variant carrying this type
    const KIND: &'static str;
}

macro_rules! payload_conversions {
    ($variant:ident, $ty:ty, $name:literal) => {
        impl CachedResource for $ty {
            const KIND: &'static str = $name;
        }

        impl From<$ty> for Payload {
            fn from(value: $ty) -> Self {
                Payload::$variant(value)
            }
        }

        impl TryFrom<Payload> for $ty {
            type Error = CacheError;

            fn try_from(payload: Payload) -> Result<Self, Self::Error> {
                match payload {
                    Payload::$variant(value) => Ok(value),
                    other => Err(CacheError::serialization(format!(
                        "expected {} payload, found {}",
                        $name,
                        other.kind()
                    ))),
                }
            }
        }
    };
}

payload_conversions!(Prediction, PredictionPayload, "prediction");
payload_conversions!(Analysis, AnalysisPayload, "analysis");
payload_conversions!(Transit, TransitPayload, "transit");
payload_conversions!(Quote, QuotePayload, "quote");

/// Observer location used for the ephemeris computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Degrees north
    pub latitude: f64,
    /// Degrees east
    pub longitude: f64,
    /// IANA zone name, e.g. `Asia/Kolkata`
    pub timezone: String,
}

/// One planet's position on a given date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanetaryTransit {
    /// Sun through Ketu
    pub planet: String,
    /// Sidereal sign (rashi)
    pub sign: String,
    /// Ecliptic longitude in degrees
    pub longitude: f64,
    /// Degrees into the current sign
    pub degree_in_sign: f64,
    /// Exalted, Debilitated, Own Sign or Neutral
    pub dignity: String,
    /// Whether the planet is in apparent backward motion
    pub retrograde: bool,
    /// When the planet entered its current sign
    #[serde(default)]
    pub transit_start: Option<DateTime<Utc>>,
    /// When the planet will leave its current sign
    #[serde(default)]
    pub transit_end: Option<DateTime<Utc>>,
}

/// Outlook for a single market sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorPrediction {
    /// Sector name, e.g. `Banking`
    pub sector: String,
    /// Bullish, Neutral or Bearish
    pub trend: String,
    /// Planet driving the outlook
    #[serde(default)]
    pub planetary_influence: Option<String>,
    /// Short explanation of the outlook
    #[serde(default)]
    pub reason: Option<String>,
    /// Symbols to watch in the sector
    #[serde(default)]
    pub top_stocks: Vec<String>,
    /// Between 0 and 1
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Free-text commentary from the language model
    #[serde(default)]
    pub ai_insights: Option<String>,
}

/// A dated market prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionPayload {
    /// Date the prediction is for
    pub prediction_date: NaiveDate,
    /// When the prediction was computed
    pub generated_at: DateTime<Utc>,
    /// Observer location for the chart
    pub location: Location,
    /// Planet positions the prediction is based on
    pub planetary_transits: Vec<PlanetaryTransit>,
    /// Bullish, Neutral or Bearish
    pub overall_sentiment: String,
    /// Per-sector outlook
    pub sector_predictions: Vec<SectorPrediction>,
    /// Narrative from the language model
    pub ai_analysis: String,
    /// Between 0 and 1
    pub confidence: f64,
}

/// Which analysis endpoint produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    /// Rule-based sector analysis
    Basic,
    /// Analysis enriched with market data and model output
    Enhanced,
}

impl AnalysisType {
    /// Lowercase name, as used in cache keys
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Basic => "basic",
            AnalysisType::Enhanced => "enhanced",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = CacheError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(AnalysisType::Basic),
            "enhanced" => Ok(AnalysisType::Enhanced),
            other => Err(CacheError::invalid_key(format!("unknown analysis type `{}`", other))),
        }
    }
}

/// A dated sector analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    /// Date the analysis is for
    pub analysis_date: NaiveDate,
    /// Endpoint that produced it
    pub analysis_type: AnalysisType,
    /// When the analysis was computed
    pub generated_at: DateTime<Utc>,
    /// Per-sector outlook
    pub sector_predictions: Vec<SectorPrediction>,
    /// Bullish, Neutral or Bearish
    pub overall_sentiment: String,
    /// Human-readable accuracy band, e.g. `70-75%`
    pub accuracy_estimate: String,
    /// Extra fields of the enhanced analysis (recommendations, per-stock signals)
    #[serde(default)]
    pub details: Map<String, Value>,
}

/// Planetary positions for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitPayload {
    /// Date the positions were computed for, at 00:00 UTC
    pub transit_date: NaiveDate,
    /// When the positions were computed
    pub generated_at: DateTime<Utc>,
    /// One entry per planet
    pub transits: Vec<PlanetaryTransit>,
}

/// A market quote with fundamentals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotePayload {
    /// Upper-case ticker
    pub symbol: String,
    /// Last traded price
    pub current_price: Option<f64>,
    /// Session open
    pub open_price: Option<f64>,
    /// Session high
    pub high: Option<f64>,
    /// Session low
    pub low: Option<f64>,
    /// Shares traded this session
    pub volume: Option<f64>,
    /// Change since previous close, in percent
    pub change_percent: Option<f64>,
    /// Trailing price to earnings
    pub pe_ratio: Option<f64>,
    /// Market capitalisation in the listing currency
    pub market_cap: Option<f64>,
    /// 52-week high
    pub week_52_high: Option<f64>,
    /// 52-week low
    pub week_52_low: Option<f64>,
    /// Sector, `Unknown` when the data source has none
    #[serde(default = "unknown_sector")]
    pub sector: String,
    /// When the quote was fetched upstream
    pub fetched_at: DateTime<Utc>,
}

fn unknown_sector() -> String {
    "Unknown".to_string()
}

impl QuotePayload {
    /// `Upward` when the last change was positive, `Downward` otherwise.
    pub fn price_trend(&self) -> &'static str {
        match self.change_percent {
            Some(change) if change > 0.0 => "Upward",
            _ => "Downward",
        }
    }
}
