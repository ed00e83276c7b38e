//! Data mapping utilities for App Store Connect responses

use asc_export_api::{
    DateWindow,
    DimensionInfo,
    ExportError,
    ExportResult,
    MeasureInfo,
    MetricValue,
    ProviderSettings,
    SeriesPoint,
    SeriesResult,
    TimeSeries,
    TimeSeriesQuery,
};
use chrono::NaiveDate;

use crate::types;

/// Top-N grouping size used for every grouped query
pub(crate) const GROUP_LIMIT: u32 = 10;
pub(crate) const GROUP_RANK: &str = "DESCENDING";
pub(crate) const FREQUENCY: &str = "day";

/// Parses the day part of an API timestamp such as `2020-01-03T00:00:00Z`
pub(crate) fn parse_api_date(value: &str) -> ExportResult<NaiveDate> {
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| ExportError::Serialization(format!("Invalid date '{value}': {e}")))
}

pub(crate) fn settings_from_response(
    response: types::SettingsResponse,
) -> ExportResult<ProviderSettings> {
    Ok(ProviderSettings {
        data_start_date: parse_api_date(&response.configuration.data_start_date)?,
        data_end_date: parse_api_date(&response.configuration.data_end_date)?,
        dimensions: response
            .dimensions
            .into_iter()
            .map(|d| DimensionInfo {
                id: d.id,
                key: d.key,
                groupable: d.group_by,
            })
            .collect(),
        measures: response
            .measures
            .into_iter()
            .map(|m| MeasureInfo {
                key: m.key,
                dimension_ids: m.dimensions,
            })
            .collect(),
    })
}

fn timestamp(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

pub(crate) fn time_series_request(query: &TimeSeriesQuery) -> types::TimeSeriesRequest<'_> {
    let window: &DateWindow = &query.window;
    types::TimeSeriesRequest {
        adam_id: vec![query.app_id.as_str()],
        measures: vec![query.metric.as_str()],
        group: query.dimension.as_key().map(|dimension| types::GroupRequest {
            dimension,
            metric: query.metric.as_str(),
            limit: GROUP_LIMIT,
            rank: GROUP_RANK,
        }),
        frequency: FREQUENCY,
        start_time: timestamp(window.start()),
        end_time: timestamp(window.end()),
    }
}

pub(crate) fn time_series_from_response(
    response: types::TimeSeriesResponse, metric: &str,
) -> ExportResult<TimeSeries> {
    let mut results = Vec::with_capacity(response.results.len());

    for item in response.results {
        let mut points = Vec::with_capacity(item.data.len());
        for point in item.data {
            points.push(SeriesPoint {
                date: parse_api_date(&point.date)?,
                value: point.values.get(metric).and_then(MetricValue::from_json),
            });
        }

        results.push(SeriesResult {
            group_title: item.group.and_then(|g| g.title),
            total: item.totals.and_then(|t| t.value),
            points,
        });
    }

    Ok(TimeSeries { results })
}

#[cfg(test)]
mod tests {
    use asc_export_api::Dimension;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_api_date() {
        assert_eq!(
            parse_api_date("2020-01-03T00:00:00Z").unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 3).unwrap()
        );
        assert_eq!(
            parse_api_date("2020-01-03").unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 3).unwrap()
        );
        assert!(parse_api_date("01/03/2020").is_err());
    }

    #[test]
    fn test_settings_mapping() {
        let response: types::SettingsResponse = serde_json::from_value(json!({
            "configuration": {
                "dataStartDate": "2020-01-02T00:00:00",
                "dataEndDate": "2020-01-03T00:00:00"
            },
            "dimensions": [
                {"id": 2, "key": "platform", "groupBy": true},
                {"id": 7, "key": "date"}
            ],
            "measures": [{"key": "installs", "dimensions": [2, 7]}]
        }))
        .unwrap();

        let settings = settings_from_response(response).unwrap();
        assert_eq!(
            settings.data_end_date,
            NaiveDate::from_ymd_opt(2020, 1, 3).unwrap()
        );
        assert!(settings.dimensions[0].groupable);
        assert!(!settings.dimensions[1].groupable);
        assert_eq!(settings.measures[0].dimension_ids, vec![2, 7]);
    }

    #[test]
    fn test_grouped_request_body() {
        let query = TimeSeriesQuery {
            app_id: "989804926".to_string(),
            metric: "installs".to_string(),
            dimension: Dimension::key("platform"),
            window: DateWindow::parse("2020-07-01", "2020-07-02").unwrap(),
        };

        let body = serde_json::to_value(time_series_request(&query)).unwrap();
        assert_eq!(
            body,
            json!({
                "adamId": ["989804926"],
                "measures": ["installs"],
                "group": {
                    "dimension": "platform",
                    "metric": "installs",
                    "limit": 10,
                    "rank": "DESCENDING"
                },
                "frequency": "day",
                "startTime": "2020-07-01T00:00:00Z",
                "endTime": "2020-07-02T00:00:00Z"
            })
        );
    }

    #[test]
    fn test_ungrouped_request_body_has_null_group() {
        let query = TimeSeriesQuery {
            app_id: "1".to_string(),
            metric: "units".to_string(),
            dimension: Dimension::NoGrouping,
            window: DateWindow::parse("2020-07-01", "2020-07-01").unwrap(),
        };

        let body = serde_json::to_value(time_series_request(&query)).unwrap();
        assert!(body["group"].is_null());
    }

    #[test]
    fn test_time_series_mapping() {
        let response: types::TimeSeriesResponse = serde_json::from_value(json!({
            "results": [{
                "totals": {"value": 30, "key": "installs"},
                "group": {"key": "iPhone", "title": "iPhone"},
                "data": [
                    {"date": "2020-07-01T00:00:00Z", "installs": 10},
                    {"date": "2020-07-02T00:00:00Z", "installs": 20},
                    {"date": "2020-07-03T00:00:00Z"}
                ]
            }]
        }))
        .unwrap();

        let series = time_series_from_response(response, "installs").unwrap();
        let result = &series.results[0];
        assert_eq!(result.group_title.as_deref(), Some("iPhone"));
        assert_eq!(result.total, Some(30.0));
        assert_eq!(result.points.len(), 3);
        assert_eq!(result.points[1].value, Some(MetricValue::Integer(20)));
        assert_eq!(result.points[2].value, None);
    }
}
