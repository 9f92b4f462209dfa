//! Routing configuration
//!
//! Deserialized from the `[routing]` section of the application config. Enum
//! keys are kept as strings here and resolved in [`RoutingConfig::validate`],
//! so a typo surfaces as a configuration error naming the offending key.

use crate::decision::Route;
use crate::error::{Error, Result};
use crate::utils::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Stage-1 timeout and retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage1Config {
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Attempt ceiling, first attempt included
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
    /// Randomize delays
    pub jitter: bool,
}

impl Default for Stage1Config {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl Stage1Config {
    /// Per-attempt timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Retry policy for the primary source
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_jitter(self.jitter)
    }
}

/// Conversation context handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// History turns included in the Stage-1 prompt
    pub max_turns: usize,
    /// TTL of session-scoped follow-up records in seconds
    pub session_ttl_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: 5,
            session_ttl_secs: 30 * 60,
        }
    }
}

impl ContextConfig {
    /// TTL of session-scoped follow-up records
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Routing engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Stage-1 acceptance threshold per declared route
    pub thresholds: BTreeMap<String, f64>,
    /// Uniform Stage-2 acceptance floor
    pub semantic_floor: f64,
    /// Tie-break order for Stage 2, highest priority first
    pub priority: Vec<String>,
    /// Stage-1 timeout and retry policy
    pub stage1: Stage1Config,
    /// Representative phrases per declared route
    pub prototypes: BTreeMap<String, Vec<String>>,
    /// Conversation context handling
    pub context: ContextConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let thresholds = [
            (Route::Chat, 0.6),
            (Route::StaticRag, 0.75),
            (Route::SqlRag, 0.85),
            (Route::Report, 0.8),
            (Route::Followup, 0.7),
        ]
        .into_iter()
        .map(|(route, t)| (route.as_str().to_string(), t))
        .collect();

        Self {
            thresholds,
            semantic_floor: 0.7,
            priority: Route::DEFAULT_PRIORITY
                .iter()
                .map(|r| r.as_str().to_string())
                .collect(),
            stage1: Stage1Config::default(),
            prototypes: default_prototypes(),
            context: ContextConfig::default(),
        }
    }
}

impl RoutingConfig {
    /// Check every rule; the first violation is returned
    pub fn validate(&self) -> Result<()> {
        self.threshold_table()?;
        check_unit_interval("routing.semantic_floor", self.semantic_floor)?;
        self.priority_order()?;
        self.prototype_phrases()?;

        if self.stage1.max_attempts == 0 {
            return Err(Error::invalid_config(
                "routing.stage1.max_attempts",
                "must be at least 1",
            ));
        }
        if self.stage1.timeout_ms == 0 {
            return Err(Error::invalid_config(
                "routing.stage1.timeout_ms",
                "must be greater than 0",
            ));
        }
        if !self.stage1.backoff_multiplier.is_finite() || self.stage1.backoff_multiplier < 1.0 {
            return Err(Error::invalid_config(
                "routing.stage1.backoff_multiplier",
                "must be a finite number >= 1.0",
            ));
        }

        Ok(())
    }

    /// Thresholds keyed by route; every declared route must have one
    pub fn threshold_table(&self) -> Result<HashMap<Route, f64>> {
        let mut table = HashMap::new();
        for (name, threshold) in &self.thresholds {
            let route = declared_route("routing.thresholds", name)?;
            check_unit_interval(&format!("routing.thresholds.{name}"), *threshold)?;
            table.insert(route, *threshold);
        }
        for route in Route::DECLARED {
            if !table.contains_key(&route) {
                return Err(Error::Configuration(format!(
                    "no confidence threshold for route `{route}`"
                )));
            }
        }
        Ok(table)
    }

    /// Tie-break order; must be a permutation of the declared routes
    pub fn priority_order(&self) -> Result<Vec<Route>> {
        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(self.priority.len());
        for name in &self.priority {
            let route = declared_route("routing.priority", name)?;
            if !seen.insert(route) {
                return Err(Error::invalid_config(
                    "routing.priority",
                    format!("`{name}` is listed twice"),
                ));
            }
            order.push(route);
        }
        if order.len() != Route::DECLARED.len() {
            return Err(Error::invalid_config(
                "routing.priority",
                "must list every declared route exactly once",
            ));
        }
        Ok(order)
    }

    /// Phrases per declared route, in declaration order
    pub fn prototype_phrases(&self) -> Result<Vec<(Route, Vec<String>)>> {
        let mut by_route = HashMap::new();
        for (name, phrases) in &self.prototypes {
            let route = declared_route("routing.prototypes", name)?;
            by_route.insert(route, phrases);
        }
        Route::DECLARED
            .iter()
            .map(|route| {
                let phrases: Vec<String> = by_route
                    .get(route)
                    .map(|p| {
                        p.iter()
                            .filter(|s| !s.trim().is_empty())
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                if phrases.is_empty() {
                    return Err(Error::invalid_config(
                        format!("routing.prototypes.{route}"),
                        "needs at least one phrase",
                    ));
                }
                Ok((*route, phrases))
            })
            .collect()
    }
}

fn declared_route(field: &str, name: &str) -> Result<Route> {
    match Route::from_name(name) {
        Some(route) if route.is_declared() => Ok(route),
        Some(_) => Err(Error::invalid_config(
            field,
            "route `none` cannot be configured",
        )),
        None => Err(Error::invalid_config(
            field,
            format!("unknown route `{name}`"),
        )),
    }
}

fn check_unit_interval(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid_config(field, format!("{value} is outside [0, 1]")))
    }
}

fn default_prototypes() -> BTreeMap<String, Vec<String>> {
    let table: [(Route, &[&str]); 5] = [
        (
            Route::Chat,
            &[
                "hello, how are you today",
                "thanks for the help",
                "tell me a joke",
                "what can you do for me",
                "explain this concept in simple words",
            ],
        ),
        (
            Route::StaticRag,
            &[
                "find information in the documents about this topic",
                "what does the manual say about the procedure",
                "summarize chapter 3 of the report on file",
                "according to the policy document what is allowed",
                "search the knowledge base for the onboarding guide",
            ],
        ),
        (
            Route::SqlRag,
            &[
                "query the database for sales data",
                "how many orders were placed last month",
                "show total revenue by region for this year",
                "list the top 10 customers by spend",
                "what is the average order value per store",
            ],
        ),
        (
            Route::Report,
            &[
                "generate a report of monthly performance",
                "create a summary table and export it",
                "build a detailed comparison report with charts",
                "prepare the quarterly business review report",
            ],
        ),
        (
            Route::Followup,
            &[
                "and what about the previous one",
                "can you expand on that last answer",
                "same question but for last year",
                "go on",
                "why is that",
            ],
        ),
    ];

    table
        .into_iter()
        .map(|(route, phrases)| {
            (
                route.as_str().to_string(),
                phrases.iter().map(|s| (*s).to_string()).collect(),
            )
        })
        .collect()
}
