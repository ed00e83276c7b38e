//! Wire types for the App Store Connect auth and analytics APIs

use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SigninRequest<'a> {
    pub account_name: &'a str,
    pub password: &'a str,
    pub remember_me: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SecurityCodeRequest<'a> {
    pub mode: &'static str,
    pub phone_number: PhoneNumber,
    pub security_code: SecurityCode<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PhoneNumber {
    pub id: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct SecurityCode<'a> {
    pub code: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SettingsResponse {
    pub configuration: Configuration,
    #[serde(default)]
    pub dimensions: Vec<DimensionItem>,
    #[serde(default)]
    pub measures: Vec<MeasureItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Configuration {
    pub data_start_date: String,
    pub data_end_date: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DimensionItem {
    pub id: i64,
    pub key: String,
    #[serde(rename = "groupBy")]
    #[serde(default)]
    pub group_by: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeasureItem {
    pub key: String,
    #[serde(default)]
    pub dimensions: Vec<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TimeSeriesRequest<'a> {
    pub adam_id: Vec<&'a str>,
    pub measures: Vec<&'a str>,
    pub group: Option<GroupRequest<'a>>,
    pub frequency: &'static str,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupRequest<'a> {
    pub dimension: &'a str,
    pub metric: &'a str,
    pub limit: u32,
    pub rank: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TimeSeriesResponse {
    #[serde(default)]
    pub results: Vec<SeriesItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SeriesItem {
    #[serde(default)]
    pub totals: Option<Totals>,
    #[serde(default)]
    pub group: Option<Group>,
    #[serde(default)]
    pub data: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Totals {
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Group {
    #[serde(default)]
    pub title: Option<String>,
}

/// One day of a series; the value sits under the measure key
#[derive(Debug, Deserialize)]
pub(crate) struct DataPoint {
    pub date: String,
    #[serde(flatten)]
    pub values: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}
