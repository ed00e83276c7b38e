use asc_export_api::{
    ColumnDefinition,
    ColumnType,
    Dimension,
    TableSchema,
};
use indexmap::IndexMap;

/// Warehouse-facing description of one App Store measure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricInfo {
    /// Canonical table prefix and value column name
    pub name: &'static str,
    pub description: &'static str,
    /// Whether the measure only counts users who opted in to sharing data
    pub optin: bool,
    pub value_type: ColumnType,
}

/// Static lookup of known measures and dimensions.
///
/// Acts as the allow-list for the export: provider keys missing here are
/// never queried.
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    metrics: IndexMap<&'static str, MetricInfo>,
    dimensions: IndexMap<&'static str, &'static str>,
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self::app_store()
    }
}

impl MetricCatalog {
    pub fn new(
        metrics: IndexMap<&'static str, MetricInfo>,
        dimensions: IndexMap<&'static str, &'static str>,
    ) -> Self {
        Self {
            metrics,
            dimensions,
        }
    }

    /// Catalog of the App Store Connect analytics measures
    pub fn app_store() -> Self {
        let metrics = METRICS
            .iter()
            .map(|(key, name, optin, value_type, description)| {
                (
                    *key,
                    MetricInfo {
                        name: *name,
                        description: *description,
                        optin: *optin,
                        value_type: *value_type,
                    },
                )
            })
            .collect();

        Self::new(metrics, DIMENSIONS.iter().copied().collect())
    }

    pub fn metric(&self, key: &str) -> Option<&MetricInfo> {
        self.metrics.get(key)
    }

    pub fn is_known_metric(&self, key: &str) -> bool {
        self.metrics.contains_key(key)
    }

    /// Canonical table suffix for a dimension key
    pub fn dimension_suffix(&self, key: &str) -> Option<&'static str> {
        self.dimensions.get(key).copied()
    }

    /// `NoGrouping` is always known; keyed dimensions must be in the catalog
    pub fn is_known_dimension(&self, dimension: &Dimension) -> bool {
        match dimension {
            Dimension::NoGrouping => true,
            Dimension::Key(key) => self.dimensions.contains_key(key.as_str()),
        }
    }

    /// `<name>_total` or `<name>_by_[opt_in_]<suffix>`
    pub fn table_name(&self, metric: &str, dimension: &Dimension) -> Option<String> {
        let info = self.metric(metric)?;

        match dimension {
            Dimension::NoGrouping => Some(format!("{}_total", info.name)),
            Dimension::Key(key) => {
                let suffix = self.dimension_suffix(key)?;
                let optin = if info.optin { "opt_in_" } else { "" };
                Some(format!("{}_by_{optin}{suffix}", info.name))
            }
        }
    }

    pub fn table_schema(&self, metric: &str, dimension: &Dimension) -> Option<TableSchema> {
        let info = self.metric(metric)?;
        let name = self.table_name(metric, dimension)?;

        let mut schema = TableSchema::new(name, info.description)
            .add_column(ColumnDefinition::required("date", ColumnType::Date))
            .add_column(ColumnDefinition::required("app_name", ColumnType::String))
            .add_column(ColumnDefinition::required(info.name, info.value_type));

        if let Dimension::Key(key) = dimension {
            let suffix = self.dimension_suffix(key)?;
            schema = schema.add_column(ColumnDefinition::required(suffix, ColumnType::String));
        }

        Some(schema)
    }
}

type MetricEntry = (&'static str, &'static str, bool, ColumnType, &'static str);

const METRICS: &[MetricEntry] = &[
    (
        "activeDevices",
        "active_devices",
        true,
        ColumnType::Integer,
        "The number of devices with at least one session during the selected period. Only devices with iOS 8 and tvOS 9 or later are included.",
    ),
    (
        "crashes",
        "crashes",
        true,
        ColumnType::Integer,
        "The total number of crashes. Actual crash reports are available in Xcode.",
    ),
    (
        "impressionsTotal",
        "impressions",
        false,
        ColumnType::Integer,
        "Number of times the app was viewed in the Featured, Categories, Top Charts and Search sections of the App Store. Also includes views of the product page.",
    ),
    (
        "impressionsTotalUnique",
        "impressions_unique_device",
        false,
        ColumnType::Integer,
        "Number of times the app was viewed in the Featured, Categories, Top Charts and Search sections of the App Store by unique device. Also includes views of the product page.",
    ),
    (
        "installs",
        "installations",
        true,
        ColumnType::Integer,
        "The total number of times the app has been installed on a device with iOS 8 or tvOS 9 or later. Re-downloads on the same device, downloads to multiple devices sharing the same Apple ID and Family Sharing installations are included. Updates are not included.",
    ),
    (
        "optin",
        "rate",
        true,
        ColumnType::Float,
        "Opt-in rate of users who agreed to share their diagnostic and usage information with app developers. Applies to installations, sessions, active devices, active devices in the last 30 days, crashes and deletions. Each day is the average opt-in rate of all users who installed apps during the last 30 days.",
    ),
    (
        "pageViewCount",
        "product_page_views",
        false,
        ColumnType::Integer,
        "Number of times the product page has been viewed on devices with iOS 8 or tvOS 9 or later. Includes both the App Store app and the StoreKit API.",
    ),
    (
        "pageViewUnique",
        "product_page_views_unique_device",
        false,
        ColumnType::Integer,
        "Number of times the product page has been viewed on devices with iOS 8 or tvOS 9 or later by unique device. Includes both the App Store app and the StoreKit API.",
    ),
    (
        "rollingActiveDevices",
        "active_devices_last_30_days",
        true,
        ColumnType::Integer,
        "The total number of devices with at least one session within 30 days of the selected day.",
    ),
    (
        "sessions",
        "sessions",
        true,
        ColumnType::Integer,
        "Opt-in. The number of times the app has been used for at least two seconds. If the app is in the background and is later used again that counts as another session.",
    ),
    (
        "uninstalls",
        "deletions",
        true,
        ColumnType::Integer,
        "The number of times the app has been deleted on devices running iOS 12.3 or tvOS 13.0 or later.",
    ),
    (
        "units",
        "app_units",
        false,
        ColumnType::Integer,
        "The number of first-time app purchases made on the App Store using iOS 8 or tvOS 9 or later. Updates, re-downloads and downloads onto other devices are not counted. Family Sharing downloads are included for free apps, but not for paid apps.",
    ),
];

const DIMENSIONS: &[(&str, &str)] = &[
    ("appReferrer", "app_referrer"),
    ("appVersion", "app_version"),
    ("campaignId", "campaign"),
    ("domainReferrer", "web_referrer"),
    ("platform", "platform"),
    ("platformVersion", "platform_version"),
    ("region", "region"),
    ("source", "source"),
    ("storefront", "storefront"),
];
