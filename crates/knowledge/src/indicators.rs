//! Macro indicator resolution over local FRED-style time series.
//!
//! Resolution is an exact lookup on normalized names and aliases; nothing is
//! ranked and near-misses are reported as not found.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{Months, NaiveDate};
use finrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// A well-known indicator and the names it is mentioned by.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSpec {
    pub key: &'static str,
    pub series_id: &'static str,
    pub name: &'static str,
    pub units: &'static str,
    pub aliases: &'static [&'static str],
}

pub const KNOWN_INDICATORS: &[IndicatorSpec] = &[
    IndicatorSpec {
        key: "cpi",
        series_id: "CPIAUCSL",
        name: "CPI",
        units: "index 1982-1984=100",
        aliases: &["consumer price index", "inflation"],
    },
    IndicatorSpec {
        key: "unemployment",
        series_id: "UNRATE",
        name: "Unemployment rate",
        units: "percent",
        aliases: &["unemployment rate", "jobless", "jobless rate"],
    },
    IndicatorSpec {
        key: "fed_funds",
        series_id: "FEDFUNDS",
        name: "Federal funds rate",
        units: "percent",
        aliases: &["fed funds", "federal funds rate", "fed funds rate"],
    },
    IndicatorSpec {
        key: "gdp",
        series_id: "GDP",
        name: "GDP",
        units: "billions of dollars",
        aliases: &["gross domestic product"],
    },
    IndicatorSpec {
        key: "treasury_10y",
        series_id: "DGS10",
        name: "10-year Treasury yield",
        units: "percent",
        aliases: &["10-year treasury", "10 year treasury", "10 year yield", "10-year yield"],
    },
];

/// Lowercase words separated by single spaces.
fn normalize(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn known_indicator(name: &str) -> Option<&'static IndicatorSpec> {
    let wanted = normalize(name);
    KNOWN_INDICATORS.iter().find(|spec| {
        normalize(spec.key) == wanted
            || normalize(spec.series_id) == wanted
            || spec.aliases.iter().any(|a| normalize(a) == wanted)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// A named indicator with observations in strictly increasing date order.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroSeries {
    key: String,
    series_id: String,
    name: String,
    units: String,
    points: Vec<MacroPoint>,
}

impl MacroSeries {
    /// Known keys, aliases and series ids pick up the catalogued metadata;
    /// anything else is kept under its own name.
    pub fn new(key: &str, points: Vec<MacroPoint>) -> AppResult<Self> {
        if points.is_empty() {
            return Err(AppError::Parse(format!("Series '{}' has no observations", key)));
        }
        if let Some(pair) = points.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(AppError::Parse(format!(
                "Series '{}' dates must be strictly increasing ({} followed by {})",
                key, pair[0].date, pair[1].date
            )));
        }

        let (key, series_id, name, units) = match known_indicator(key) {
            Some(spec) => (
                spec.key.to_string(),
                spec.series_id.to_string(),
                spec.name.to_string(),
                spec.units.to_string(),
            ),
            None => {
                let key = normalize(key).replace(' ', "_");
                (key.clone(), key.to_uppercase(), key, String::new())
            }
        };

        Ok(Self {
            key,
            series_id,
            name,
            units,
            points,
        })
    }

    /// Parse `date,value` rows. The header is optional; dates are `YYYY-MM-DD`
    /// or `YYYY-MM`; missing values (`.`, empty, `NA`) are skipped.
    pub fn from_csv(key: &str, content: &str) -> AppResult<Self> {
        let mut points = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split(',').map(str::trim);
            let date_raw = fields.next().unwrap_or_default();
            let value_raw = fields.next().unwrap_or_default();

            let Some(date) = parse_date(date_raw) else {
                if idx == 0 {
                    continue;
                }
                return Err(AppError::Parse(format!(
                    "Series '{}' line {}: invalid date '{}'",
                    key,
                    idx + 1,
                    date_raw
                )));
            };

            if matches!(value_raw, "" | "." | "NA" | "NaN" | "nan") {
                continue;
            }
            let value: f64 = value_raw.parse().map_err(|_| {
                AppError::Parse(format!(
                    "Series '{}' line {}: invalid value '{}'",
                    key,
                    idx + 1,
                    value_raw
                ))
            })?;
            points.push(MacroPoint { date, value });
        }
        Self::new(key, points)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn series_id(&self) -> &str {
        &self.series_id
    }

    pub fn points(&self) -> &[MacroPoint] {
        &self.points
    }

    pub fn latest(&self) -> Option<MacroPoint> {
        self.points.last().copied()
    }

    /// Change from the observation closest to one year before the latest,
    /// within `tolerance_days`; ties go to the earlier observation. `None`
    /// when no such observation exists or its value is zero.
    pub fn year_over_year(&self, tolerance_days: i64) -> Option<YearOverYear> {
        let latest = self.latest()?;
        let target = latest.date.checked_sub_months(Months::new(12))?;

        let prior = self
            .points
            .iter()
            .filter(|p| p.date < latest.date)
            .map(|p| (p, (p.date - target).num_days().abs()))
            .filter(|(_, distance)| *distance <= tolerance_days)
            .min_by_key(|(p, distance)| (*distance, p.date))
            .map(|(p, _)| *p)?;

        if prior.value == 0.0 {
            return None;
        }
        Some(YearOverYear {
            prior,
            change: (latest.value - prior.value) / prior.value,
        })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d"))
        .ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearOverYear {
    pub prior: MacroPoint,
    /// Fractional change, 0.04 = 4%.
    pub change: f64,
}

/// A resolved indicator value, ready to be cited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroFact {
    pub indicator: String,
    pub series_id: String,
    pub name: String,
    pub units: String,
    pub latest: MacroPoint,
    pub yoy: Option<YearOverYear>,
}

impl MacroFact {
    /// One deterministic sentence naming every date it relies on.
    pub fn render(&self) -> String {
        let units = if self.units.is_empty() {
            String::new()
        } else {
            format!(" ({})", self.units)
        };
        let yoy = match &self.yoy {
            Some(yoy) => format!(
                "year-over-year change {:+.2}% from {:.2} on {}",
                yoy.change * 100.0,
                yoy.prior.value,
                yoy.prior.date
            ),
            None => "year-over-year change unavailable (no observation about one year earlier)"
                .to_string(),
        };
        format!(
            "{} [FRED {}]: {:.2}{} as of {}; {}.",
            self.name, self.series_id, self.latest.value, units, self.latest.date, yoy
        )
    }

    /// Dates a citation of this fact refers to.
    pub fn cited_dates(&self) -> (NaiveDate, Option<NaiveDate>) {
        (self.latest.date, self.yoy.map(|y| y.prior.date))
    }
}

impl fmt::Display for MacroFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Outcome of a lookup. An unknown name is a normal result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroResolution {
    Found(MacroFact),
    NotFound { indicator: String },
}

impl MacroResolution {
    pub fn fact(&self) -> Option<&MacroFact> {
        match self {
            MacroResolution::Found(fact) => Some(fact),
            MacroResolution::NotFound { .. } => None,
        }
    }
}

/// Loaded series keyed by indicator.
#[derive(Debug, Clone)]
pub struct MacroStore {
    series: BTreeMap<String, MacroSeries>,
    tolerance_days: i64,
}

impl Default for MacroStore {
    fn default() -> Self {
        Self::new(31)
    }
}

impl MacroStore {
    pub fn new(tolerance_days: i64) -> Self {
        Self {
            series: BTreeMap::new(),
            tolerance_days,
        }
    }

    /// Load every `*.csv` in `dir`, named after its indicator (`cpi.csv`)
    /// or series id (`CPIAUCSL.csv`). A missing directory is an empty store;
    /// unreadable files are skipped with a warning.
    pub fn load_dir(dir: &Path, tolerance_days: i64) -> AppResult<Self> {
        let mut store = Self::new(tolerance_days);
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "No macro directory");
            return Ok(store);
        }

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let loaded = fs::read_to_string(&path)
                .map_err(AppError::from)
                .and_then(|content| MacroSeries::from_csv(stem, &content));
            match loaded {
                Ok(series) => {
                    tracing::debug!(indicator = %series.key(), points = series.points().len(), "Loaded macro series");
                    store.insert(series);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "Skipping macro series");
                }
            }
        }
        Ok(store)
    }

    pub fn insert(&mut self, series: MacroSeries) {
        self.series.insert(series.key.clone(), series);
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn indicators(&self) -> impl Iterator<Item = &MacroSeries> {
        self.series.values()
    }

    fn find(&self, name: &str) -> Option<&MacroSeries> {
        let key = match known_indicator(name) {
            Some(spec) => spec.key.to_string(),
            None => normalize(name).replace(' ', "_"),
        };
        self.series.get(&key)
    }

    /// Latest value and year-over-year change for `name`.
    pub fn resolve(&self, name: &str) -> MacroResolution {
        let Some(series) = self.find(name) else {
            return MacroResolution::NotFound {
                indicator: name.to_string(),
            };
        };
        let Some(latest) = series.latest() else {
            return MacroResolution::NotFound {
                indicator: name.to_string(),
            };
        };
        MacroResolution::Found(MacroFact {
            indicator: series.key.clone(),
            series_id: series.series_id.clone(),
            name: series.name.clone(),
            units: series.units.clone(),
            latest,
            yoy: series.year_over_year(self.tolerance_days),
        })
    }

    /// Indicator keys mentioned in `query` as whole words, in order of first
    /// mention. Covers catalogued indicators and every loaded series.
    pub fn detect_mentions(&self, query: &str) -> Vec<String> {
        let haystack = format!(" {} ", normalize(query));
        let mut found: Vec<(usize, String)> = Vec::new();

        let mut consider = |key: &str, names: Vec<String>| {
            let position = names
                .iter()
                .filter(|n| !n.is_empty())
                .filter_map(|n| haystack.find(&format!(" {} ", n)))
                .min();
            if let Some(position) = position {
                if !found.iter().any(|(_, k)| k == key) {
                    found.push((position, key.to_string()));
                }
            }
        };

        for spec in KNOWN_INDICATORS {
            let mut names = vec![normalize(spec.key), normalize(spec.series_id)];
            names.extend(spec.aliases.iter().map(|a| normalize(a)));
            consider(spec.key, names);
        }
        for series in self.series.values() {
            consider(
                &series.key,
                vec![normalize(&series.key), normalize(&series.series_id)],
            );
        }

        found.sort_by_key(|(position, _)| *position);
        found.into_iter().map(|(_, key)| key).collect()
    }
}
