//! Chart payload types.
//!
//! A chart-intent turn is expected to end with the model emitting one of
//! these shapes as its final content (see the chart parser in the gateway).

use serde::{Deserialize, Serialize};

/// A single renderable chart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartPayload {
    /// `bar`, `line`, `pie`, `donut`, … — passed through to the renderer.
    #[serde(rename = "chartType", alias = "type")]
    pub chart_type: String,
    pub data: ChartData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    #[serde(default)]
    pub label: String,
    pub values: Vec<f64>,
}

/// The multi-chart wrapper shape `{"charts": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartSet {
    pub charts: Vec<ChartPayload>,
}
