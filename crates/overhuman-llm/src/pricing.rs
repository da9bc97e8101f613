//! Per-model price tables.
//!
//! Providers are configured with input/output dollar rates per million
//! tokens and compute each call's cost from the token counts the provider
//! reports. Unknown models bill at zero with a warning, so a missing table
//! row never fails a request.

use std::collections::HashMap;

use tracing::warn;

/// Dollar rates for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    /// Input dollars per million tokens.
    pub input_per_m: f64,
    /// Output dollars per million tokens.
    pub output_per_m: f64,
}

/// Model id -> price mapping for one provider.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
}

impl PriceTable {
    /// An empty table (every model bills at zero).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from `(model, input_per_m, output_per_m)` rows.
    pub fn from_rows(rows: &[(&str, f64, f64)]) -> Self {
        let prices = rows
            .iter()
            .map(|(id, input, output)| {
                (
                    id.to_string(),
                    ModelPrice {
                        input_per_m: *input,
                        output_per_m: *output,
                    },
                )
            })
            .collect();
        Self { prices }
    }

    /// Add or replace one model's rates.
    pub fn set(&mut self, model: impl Into<String>, input_per_m: f64, output_per_m: f64) {
        self.prices.insert(
            model.into(),
            ModelPrice {
                input_per_m,
                output_per_m,
            },
        );
    }

    /// Look up one model's rates.
    pub fn get(&self, model: &str) -> Option<ModelPrice> {
        self.prices.get(model).copied()
    }

    /// Cost of a call in USD.
    ///
    /// Unknown models bill at zero; the table logs one warning per call so
    /// operators notice gaps without the pipeline failing.
    pub fn cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        match self.prices.get(model) {
            Some(price) => {
                input_tokens as f64 * price.input_per_m / 1_000_000.0
                    + output_tokens as f64 * price.output_per_m / 1_000_000.0
            }
            None => {
                warn!(model, "no price table entry; billing call at zero");
                0.0
            }
        }
    }
}
