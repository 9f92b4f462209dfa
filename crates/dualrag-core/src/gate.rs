//! Confidence gate
//!
//! A decision is accepted iff its confidence reaches the threshold of its
//! route. Route `none` carries no threshold and is never accepted.

use crate::config::RoutingConfig;
use crate::decision::{Route, RoutingDecision};
use crate::error::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// Per-route acceptance thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceGate {
    thresholds: HashMap<Route, f64>,
}

impl ConfidenceGate {
    /// Build a gate; every declared route needs a threshold in [0, 1]
    pub fn new(thresholds: HashMap<Route, f64>) -> Result<Self> {
        if thresholds.contains_key(&Route::None) {
            return Err(Error::invalid_config(
                "thresholds",
                "route `none` cannot have a threshold",
            ));
        }
        for route in Route::DECLARED {
            match thresholds.get(&route) {
                None => {
                    return Err(Error::Configuration(format!(
                        "no confidence threshold for route `{route}`"
                    )))
                }
                Some(t) if !t.is_finite() || !(0.0..=1.0).contains(t) => {
                    return Err(Error::invalid_config(
                        format!("thresholds.{route}"),
                        format!("{t} is outside [0, 1]"),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(Self { thresholds })
    }

    /// Stage-1 gate from the configured threshold table
    pub fn from_config(config: &RoutingConfig) -> Result<Self> {
        Self::new(config.threshold_table()?)
    }

    /// Gate with one floor for every declared route
    pub fn uniform(floor: f64) -> Result<Self> {
        Self::new(Route::DECLARED.iter().map(|r| (*r, floor)).collect())
    }

    /// Threshold of `route`; `None` for route `none`
    #[must_use]
    pub fn threshold(&self, route: Route) -> Option<f64> {
        self.thresholds.get(&route).copied()
    }

    /// Whether `decision` may be acted upon
    #[must_use]
    pub fn accept(&self, decision: &RoutingDecision) -> bool {
        let Some(threshold) = self.threshold(decision.route) else {
            debug!(route = %decision.route, "No threshold, rejecting");
            return false;
        };
        decision.confidence >= threshold
    }
}
