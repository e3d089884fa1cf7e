//! Derived weather insights.
//!
//! Pure functions that turn a current observation, the prior observation and
//! the forecast set into a briefing, per-day forecast confidence, activity
//! impact scores, a short event timeline, alerts and a change summary.
//! Nothing here performs I/O.
//!
//! Thresholds are defined in metric units (°C, m/s); values are converted from
//! the active unit system before comparison.
//!
//! # Example
//!
//! ```
//! use stratus_core::{MockProvider, build_insights};
//! use stratus_types::Units;
//!
//! let current = MockProvider::sample_reading();
//! let forecast = MockProvider::sample_forecast(40);
//!
//! let insights = build_insights(Some(&current), None, &forecast, Units::Metric).unwrap();
//! assert_eq!(insights.confidence.len(), 5);
//! assert!(insights.briefing.starts_with("Now 18.0"));
//! ```

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use stratus_types::{ConditionCategory, ForecastItem, Units, WeatherReading};

/// Forecast entries per day (3-hour steps).
const ENTRIES_PER_DAY: usize = 8;
/// Daily samples considered for confidence.
const CONFIDENCE_DAYS: usize = 5;
/// Forecast entries scanned for timeline events and severe alerts.
const TIMELINE_WINDOW: usize = 12;
const MAX_TIMELINE_EVENTS: usize = 6;
const MAX_ALERTS: usize = 4;

/// Confidence label for one forecast day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    /// Score of 76 or more.
    High,
    /// Score of 58 to 75.
    Medium,
    /// Score below 58.
    Low,
}

impl ConfidenceLabel {
    fn from_score(score: i32) -> Self {
        if score >= 76 {
            Self::High
        } else if score >= 58 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// How much to trust one daily forecast sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfidence {
    /// Bucketed score.
    pub label: ConfidenceLabel,
    /// Score between 35 and 95.
    pub score: i32,
    /// Dominant reason for the score.
    pub reason: String,
}

/// Activity suitability for the next 24 hours, each 0 to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactScores {
    /// Commuting.
    pub commute: i32,
    /// General outdoor plans.
    pub outdoor: i32,
    /// Drying laundry outside.
    pub laundry: i32,
    /// Running.
    pub running: i32,
}

/// Severity of a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Worth noting.
    Medium,
    /// Plan around it.
    High,
}

/// A notable forecast event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// When the event is forecast.
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// Short title.
    pub title: String,
    /// Severity.
    pub severity: EventSeverity,
    /// Detail line.
    pub detail: String,
}

/// What changed since the previous observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    /// One-line summary.
    pub headline: String,
    /// Temperature change in the active unit, one decimal.
    pub temperature_delta: f64,
    /// Rain risk change in percentage points, one decimal.
    pub rain_delta: f64,
    /// Wind change in the active unit, one decimal.
    pub wind_delta: f64,
}

/// Insights attached to a weather view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherInsights {
    /// One-paragraph briefing.
    pub briefing: String,
    /// Confidence for up to five daily samples.
    pub confidence: Vec<ForecastConfidence>,
    /// Activity impact scores.
    pub impact_scores: ImpactScores,
    /// Up to six events, earliest first.
    pub timeline: Vec<TimelineEvent>,
    /// Up to four alerts, most urgent first.
    pub alerts: Vec<String>,
    /// Change against the prior observation; `None` without a current reading.
    pub change_summary: Option<ChangeSummary>,
}

/// Build insights, or `None` when there is neither a reading nor a forecast.
pub fn build_insights(
    current: Option<&WeatherReading>,
    previous: Option<&WeatherReading>,
    forecast: &[ForecastItem],
    units: Units,
) -> Option<WeatherInsights> {
    if current.is_none() && forecast.is_empty() {
        return None;
    }

    let confidence = forecast
        .iter()
        .step_by(ENTRIES_PER_DAY)
        .take(CONFIDENCE_DAYS)
        .map(|item| confidence_for(item, units))
        .collect();
    let impact_scores = impact_scores(current, forecast, units);
    let alerts = alerts(current, forecast, units);
    let briefing = briefing(current, forecast, &alerts, &impact_scores, units);

    Some(WeatherInsights {
        briefing,
        confidence,
        impact_scores,
        timeline: timeline(forecast, units),
        alerts,
        change_summary: current.map(|c| change_summary(previous, c, forecast, units)),
    })
}

fn next_day(forecast: &[ForecastItem]) -> &[ForecastItem] {
    &forecast[..forecast.len().min(ENTRIES_PER_DAY)]
}

fn peak_pop(forecast: &[ForecastItem]) -> f64 {
    next_day(forecast).iter().map(|f| f.pop).fold(0.0, f64::max)
}

fn confidence_for(item: &ForecastItem, units: Units) -> ForecastConfidence {
    let wind = units.to_metres_per_second(item.wind_speed);
    let severe = item.category().is_severe();

    let mut score = 82;
    if item.pop >= 0.6 {
        score -= 18;
    } else if item.pop >= 0.3 {
        score -= 9;
    }
    if wind >= 12.0 {
        score -= 14;
    } else if wind >= 8.0 {
        score -= 7;
    }
    if severe {
        score -= 18;
    }
    let score = score.clamp(35, 95);

    let reason = if severe {
        "convective conditions expected"
    } else if wind >= 12.0 {
        "wind variability is high"
    } else if item.pop >= 0.6 {
        "rain risk is high"
    } else {
        "stable signals"
    };

    ForecastConfidence {
        label: ConfidenceLabel::from_score(score),
        score,
        reason: reason.to_string(),
    }
}

fn impact_scores(
    current: Option<&WeatherReading>,
    forecast: &[ForecastItem],
    units: Units,
) -> ImpactScores {
    let window = next_day(forecast);
    let n = window.len() as f64;
    let (avg_pop, avg_wind) = if window.is_empty() {
        (0.0, 0.0)
    } else {
        (
            window.iter().map(|f| f.pop).sum::<f64>() / n,
            window
                .iter()
                .map(|f| units.to_metres_per_second(f.wind_speed))
                .sum::<f64>()
                / n,
        )
    };
    let avg_temp = match current {
        Some(reading) => units.to_celsius(reading.temperature),
        None if !window.is_empty() => {
            window
                .iter()
                .map(|f| units.to_celsius(f.temperature))
                .sum::<f64>()
                / n
        }
        None => 20.0,
    };

    let mut commute = 100 - (avg_pop * 45.0) as i32 - (avg_wind.min(20.0) * 1.2) as i32;
    let mut outdoor = 100 - (avg_pop * 55.0) as i32 - (avg_wind.min(18.0) * 1.1) as i32;
    let laundry = 100 - (avg_pop * 70.0) as i32 - if avg_temp < 6.0 { 20 } else { 0 };
    let mut running = 100 - (avg_pop * 40.0) as i32 - (avg_wind.min(15.0) * 1.4) as i32;

    if avg_temp > 32.0 {
        running -= 18;
        outdoor -= 12;
    } else if avg_temp < 0.0 {
        running -= 22;
        commute -= 10;
    }

    ImpactScores {
        commute: commute.clamp(0, 100),
        outdoor: outdoor.clamp(0, 100),
        laundry: laundry.clamp(0, 100),
        running: running.clamp(0, 100),
    }
}

fn timeline(forecast: &[ForecastItem], units: Units) -> Vec<TimelineEvent> {
    let mut events = Vec::new();

    for item in forecast.iter().take(TIMELINE_WINDOW) {
        let wind = units.to_metres_per_second(item.wind_speed);
        if item.pop >= 0.6 {
            events.push(TimelineEvent {
                at: item.forecast_at,
                title: "Rain window".to_string(),
                severity: if item.pop >= 0.8 {
                    EventSeverity::High
                } else {
                    EventSeverity::Medium
                },
                detail: format!("{}% precip chance", (item.pop * 100.0) as i32),
            });
        }
        if wind >= 12.0 {
            events.push(TimelineEvent {
                at: item.forecast_at,
                title: "Wind surge".to_string(),
                severity: if wind >= 16.0 {
                    EventSeverity::High
                } else {
                    EventSeverity::Medium
                },
                detail: format!("{:.1} {} gust potential", item.wind_speed, units.wind_suffix()),
            });
        }
        if item.category().is_severe() {
            events.push(TimelineEvent {
                at: item.forecast_at,
                title: "Severe convection".to_string(),
                severity: EventSeverity::High,
                detail: item.description.clone(),
            });
        }
    }

    events.sort_by_key(|event| event.at);
    events.truncate(MAX_TIMELINE_EVENTS);
    events
}

fn alerts(current: Option<&WeatherReading>, forecast: &[ForecastItem], units: Units) -> Vec<String> {
    let mut alerts = Vec::new();

    if let Some(reading) = current {
        if reading.visibility.is_some_and(|v| v < 2500) {
            alerts.push("Reduced visibility now. Drive with caution.".to_string());
        }
        if units.to_metres_per_second(reading.wind_speed) >= 14.0 {
            alerts.push("Strong winds in effect. Secure loose outdoor items.".to_string());
        }
    }
    if next_day(forecast).iter().any(|f| f.pop >= 0.7) {
        alerts.push("Heavy rain risk in the next 24 hours.".to_string());
    }
    if forecast
        .iter()
        .take(TIMELINE_WINDOW)
        .any(|f| f.category().is_severe())
    {
        alerts.push("Potential severe storm cells detected in forecast window.".to_string());
    }

    alerts.truncate(MAX_ALERTS);
    alerts
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn direction(delta: f64) -> &'static str {
    if delta > 0.0 { "up" } else { "down" }
}

fn change_summary(
    previous: Option<&WeatherReading>,
    current: &WeatherReading,
    forecast: &[ForecastItem],
    units: Units,
) -> ChangeSummary {
    let prior = previous.unwrap_or(current);
    let prev_rain = match previous.map(WeatherReading::category) {
        Some(ConditionCategory::Rain | ConditionCategory::Drizzle | ConditionCategory::Thunderstorm) => 0.4,
        _ => 0.0,
    };

    let temperature_delta = round1(current.temperature - prior.temperature);
    let rain_delta = round1((peak_pop(forecast) - prev_rain) * 100.0);
    let wind_delta = round1(current.wind_speed - prior.wind_speed);

    let mut parts = Vec::new();
    if temperature_delta.abs() >= 1.0 {
        parts.push(format!(
            "Temp {} {:.1} deg",
            direction(temperature_delta),
            temperature_delta.abs()
        ));
    }
    if rain_delta.abs() >= 10.0 {
        parts.push(format!(
            "rain risk {} {:.0}%",
            direction(rain_delta),
            rain_delta.abs()
        ));
    }
    if wind_delta.abs() >= 1.0 {
        parts.push(format!(
            "wind {} {:.1} {}",
            direction(wind_delta),
            wind_delta.abs(),
            units.wind_suffix()
        ));
    }

    let headline = if parts.is_empty() {
        "No major change since last sync.".to_string()
    } else {
        parts.join(", ")
    };

    ChangeSummary {
        headline,
        temperature_delta,
        rain_delta,
        wind_delta,
    }
}

fn briefing(
    current: Option<&WeatherReading>,
    forecast: &[ForecastItem],
    alerts: &[String],
    impacts: &ImpactScores,
    units: Units,
) -> String {
    let Some(reading) = current else {
        return "Sync weather to generate a personalized briefing.".to_string();
    };

    let condition = if reading.description.is_empty() {
        &reading.condition
    } else {
        &reading.description
    };
    let mut summary = format!(
        "Now {:.1}{} with {}. Peak rain chance next 24h is {}%. Outdoor score {}/100.",
        reading.temperature,
        units.temperature_suffix(),
        condition,
        (peak_pop(forecast) * 100.0) as i32,
        impacts.outdoor
    );
    if let Some(alert) = alerts.first() {
        summary.push_str(" Priority alert: ");
        summary.push_str(alert);
    }
    summary
}
