use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::exchange::error::{ExchangeError, ExchangeResult};
use crate::exchange::hierarchy::{DeviceTypeService, LocationService};

/// Separator used in the textual form of a category path
pub const PATH_SEPARATOR: char = '/';

/// Hierarchical category path, most general segment first
/// (e.g. `Solar/Photovoltaic/RoofMounted`).
///
/// Used for both device types and locations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryPath(Vec<String>);

impl CategoryPath {
    pub fn new(segments: Vec<String>) -> ExchangeResult<Self> {
        if segments.is_empty() || segments.iter().any(|s| s.trim().is_empty()) {
            return Err(ExchangeError::InvalidOrder(
                "category path must have non-empty segments".to_string(),
            ));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Ancestor-or-equal test: `self` names a node on the path from the
    /// root down to `other` (inclusive).
    pub fn is_prefix_of(&self, other: &CategoryPath) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }

    /// Path of the parent category, or `None` at the root level
    pub fn parent(&self) -> Option<CategoryPath> {
        if self.0.len() > 1 {
            Some(CategoryPath(self.0[..self.0.len() - 1].to_vec()))
        } else {
            None
        }
    }
}

impl fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(&PATH_SEPARATOR.to_string()))
    }
}

impl FromStr for CategoryPath {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split(PATH_SEPARATOR).map(|s| s.trim().to_string()).collect())
    }
}

/// Comparison mode for a bid's vintage constraint.
///
/// The default (absent) operator means "ask year must not exceed the bid's
/// ceiling year". `Equal` restricts the bid to certificates of exactly the
/// named year. Further modes are an extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VintageOperator {
    LessOrEqual,
    Equal,
}

/// Year the certificate's underlying generation device came online,
/// with an optional comparison operator on the bid side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceVintage {
    pub year: i32,
    pub operator: Option<VintageOperator>,
}

impl DeviceVintage {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            operator: None,
        }
    }

    pub fn with_operator(year: i32, operator: VintageOperator) -> Self {
        Self {
            year,
            operator: Some(operator),
        }
    }

    /// Does this (ask-side) vintage satisfy the bid-side constraint?
    pub fn satisfies(&self, constraint: &DeviceVintage) -> bool {
        match constraint.operator.unwrap_or(VintageOperator::LessOrEqual) {
            VintageOperator::LessOrEqual => self.year <= constraint.year,
            VintageOperator::Equal => self.year == constraint.year,
        }
    }
}

/// Window over which the certified energy was generated.
///
/// Carried and serialized with the product; not consulted by the
/// eligibility predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTime {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl GenerationTime {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> ExchangeResult<Self> {
        if from > to {
            return Err(ExchangeError::InvalidOrder(
                "generation window must not end before it starts".to_string(),
            ));
        }
        Ok(Self { from, to })
    }
}

/// Certificate provenance descriptor attached to every order.
///
/// On an Ask each path collection holds the single concrete attribute of the
/// offered certificate; on a Bid the collections are filters (any listed
/// path, or its descendants, is acceptable) and empty means unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Product {
    pub device_type: Vec<CategoryPath>,
    pub location: Vec<CategoryPath>,
    pub device_vintage: Option<DeviceVintage>,
    pub generation_time: Option<GenerationTime>,
}

impl Product {
    /// Product with no constraints (a bid accepting anything)
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_device_types(mut self, paths: Vec<CategoryPath>) -> Self {
        self.device_type = paths;
        self
    }

    pub fn with_locations(mut self, paths: Vec<CategoryPath>) -> Self {
        self.location = paths;
        self
    }

    pub fn with_vintage(mut self, vintage: DeviceVintage) -> Self {
        self.device_vintage = Some(vintage);
        self
    }

    pub fn with_generation_time(mut self, window: GenerationTime) -> Self {
        self.generation_time = Some(window);
        self
    }

    /// Eligibility predicate: does this (ask-side, concrete) product satisfy
    /// the given bid-side filter?
    ///
    /// Three independent filters, each passing unconditionally when the
    /// corresponding constraint is absent. All three are pure and
    /// order-independent; they are evaluated before combining so an oracle
    /// failure surfaces no matter which filter would have failed first.
    pub fn filter_by(
        &self,
        filter: &Product,
        devices: &dyn DeviceTypeService,
        locations: &dyn LocationService,
    ) -> ExchangeResult<bool> {
        let device_type_ok = self.has_matching_device_type(filter, devices)?;
        let vintage_ok = self.has_matching_vintage(filter);
        let location_ok = self.has_matching_location(filter, locations)?;

        Ok(device_type_ok && vintage_ok && location_ok)
    }

    fn has_matching_device_type(
        &self,
        filter: &Product,
        devices: &dyn DeviceTypeService,
    ) -> ExchangeResult<bool> {
        if filter.device_type.is_empty() {
            return Ok(true);
        }

        // Asks carry exactly one concrete device type by construction; a
        // product without one cannot satisfy a device-type filter.
        match self.device_type.first() {
            Some(concrete) => devices.includes_device_type(concrete, &filter.device_type),
            None => Ok(false),
        }
    }

    fn has_matching_vintage(&self, filter: &Product) -> bool {
        match (&self.device_vintage, &filter.device_vintage) {
            (Some(vintage), Some(constraint)) => vintage.satisfies(constraint),
            _ => true,
        }
    }

    fn has_matching_location(
        &self,
        filter: &Product,
        locations: &dyn LocationService,
    ) -> ExchangeResult<bool> {
        if filter.location.is_empty() {
            return Ok(true);
        }

        match self.location.first() {
            Some(concrete) => locations.matches(&filter.location, concrete),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::hierarchy::{DeviceTypeRegistry, LocationRegistry};
    use chrono::TimeZone;

    fn path(s: &str) -> CategoryPath {
        s.parse().unwrap()
    }

    fn device_registry() -> DeviceTypeRegistry {
        DeviceTypeRegistry::from_paths(&[
            "Solar/Photovoltaic/RoofMounted",
            "Solar/Photovoltaic/GroundMounted",
            "Wind/Onshore",
            "Wind/Offshore",
            "Hydro/RunOfRiver",
        ])
        .unwrap()
    }

    fn location_registry() -> LocationRegistry {
        LocationRegistry::from_paths(&[
            "Germany/Bavaria/Munich",
            "Germany/Saxony",
            "France/Brittany",
        ])
        .unwrap()
    }

    fn solar_ask_product() -> Product {
        Product::any()
            .with_device_types(vec![path("Solar/Photovoltaic/RoofMounted")])
            .with_locations(vec![path("Germany/Bavaria/Munich")])
            .with_vintage(DeviceVintage::new(2018))
    }

    #[test]
    fn test_category_path_parse_and_display() {
        let p = path("Solar/Photovoltaic/RoofMounted");
        assert_eq!(p.depth(), 3);
        assert_eq!(p.to_string(), "Solar/Photovoltaic/RoofMounted");
        assert_eq!(p.parent().unwrap().to_string(), "Solar/Photovoltaic");
        assert!(path("Solar").parent().is_none());
        assert!("".parse::<CategoryPath>().is_err());
        assert!("Solar//RoofMounted".parse::<CategoryPath>().is_err());
    }

    #[test]
    fn test_category_path_prefix() {
        assert!(path("Solar").is_prefix_of(&path("Solar/Photovoltaic/RoofMounted")));
        assert!(path("Solar/Photovoltaic").is_prefix_of(&path("Solar/Photovoltaic")));
        assert!(!path("Wind").is_prefix_of(&path("Solar/Photovoltaic")));
        assert!(!path("Solar/Photovoltaic/RoofMounted").is_prefix_of(&path("Solar")));
    }

    #[test]
    fn test_vintage_baseline_comparison() {
        let ask = DeviceVintage::new(2018);
        assert!(ask.satisfies(&DeviceVintage::new(2018)));
        assert!(ask.satisfies(&DeviceVintage::new(2020)));
        assert!(!ask.satisfies(&DeviceVintage::new(2017)));
    }

    #[test]
    fn test_vintage_equal_operator() {
        let ask = DeviceVintage::new(2018);
        assert!(ask.satisfies(&DeviceVintage::with_operator(2018, VintageOperator::Equal)));
        assert!(!ask.satisfies(&DeviceVintage::with_operator(2019, VintageOperator::Equal)));
    }

    #[test]
    fn test_generation_window_bounds_are_independent() {
        let from = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2021, 6, 30, 23, 59, 59).unwrap();

        let window = GenerationTime::new(from, to).unwrap();
        assert_eq!(window.from, from);
        assert_eq!(window.to, to);
        assert!(GenerationTime::new(to, from).is_err());
    }

    #[test]
    fn test_unconstrained_filter_passes() {
        let devices = device_registry();
        let locations = location_registry();

        let ok = solar_ask_product()
            .filter_by(&Product::any(), &devices, &locations)
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_device_type_hierarchy_match() {
        let devices = device_registry();
        let locations = location_registry();
        let ask = solar_ask_product();

        // The broad "Solar" filter accepts any solar sub-category
        let broad = Product::any().with_device_types(vec![path("Solar")]);
        assert!(ask.filter_by(&broad, &devices, &locations).unwrap());

        let exact =
            Product::any().with_device_types(vec![path("Solar/Photovoltaic/RoofMounted")]);
        assert!(ask.filter_by(&exact, &devices, &locations).unwrap());

        let wind = Product::any().with_device_types(vec![path("Wind")]);
        assert!(!ask.filter_by(&wind, &devices, &locations).unwrap());
    }

    #[test]
    fn test_vintage_ceiling_rejects_newer_certificates() {
        let devices = device_registry();
        let locations = location_registry();

        let ask = Product::any()
            .with_device_types(vec![path("Wind/Onshore")])
            .with_vintage(DeviceVintage::new(2021));
        let bid = Product::any().with_vintage(DeviceVintage::new(2019));

        assert!(!ask.filter_by(&bid, &devices, &locations).unwrap());
    }

    #[test]
    fn test_location_hierarchy_match() {
        let devices = device_registry();
        let locations = location_registry();
        let ask = solar_ask_product();

        let germany = Product::any().with_locations(vec![path("Germany")]);
        assert!(ask.filter_by(&germany, &devices, &locations).unwrap());

        let france = Product::any().with_locations(vec![path("France")]);
        assert!(!ask.filter_by(&france, &devices, &locations).unwrap());
    }

    #[test]
    fn test_missing_concrete_location_fails_location_filter() {
        let devices = device_registry();
        let locations = location_registry();

        let ask = Product::any().with_device_types(vec![path("Wind/Onshore")]);
        let bid = Product::any().with_locations(vec![path("Germany")]);

        assert!(!ask.filter_by(&bid, &devices, &locations).unwrap());
    }

    #[test]
    fn test_filters_are_order_independent() {
        let devices = device_registry();
        let locations = location_registry();
        let ask = solar_ask_product();

        // Same constraints expressed with a differently ordered filter set
        // must not change the verdict.
        let bid_a = Product::any()
            .with_device_types(vec![path("Wind"), path("Solar")])
            .with_locations(vec![path("France"), path("Germany/Bavaria")])
            .with_vintage(DeviceVintage::new(2020));
        let bid_b = Product::any()
            .with_device_types(vec![path("Solar"), path("Wind")])
            .with_locations(vec![path("Germany/Bavaria"), path("France")])
            .with_vintage(DeviceVintage::new(2020));

        assert_eq!(
            ask.filter_by(&bid_a, &devices, &locations).unwrap(),
            ask.filter_by(&bid_b, &devices, &locations).unwrap()
        );
        assert!(ask.filter_by(&bid_a, &devices, &locations).unwrap());
    }

    #[test]
    fn test_unknown_category_is_an_oracle_error() {
        let devices = device_registry();
        let locations = location_registry();
        let ask = solar_ask_product();

        let bid = Product::any().with_device_types(vec![path("Geothermal")]);
        let err = ask.filter_by(&bid, &devices, &locations).unwrap_err();
        assert!(matches!(err, ExchangeError::OracleUnavailable(_)));
    }

    #[test]
    fn test_product_serialization_round_trip() {
        let product = solar_ask_product().with_generation_time(
            GenerationTime::new(
                Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2021, 12, 31, 0, 0, 0).unwrap(),
            )
            .unwrap(),
        );

        let json = serde_json::to_string(&product).unwrap();
        let back: Product = serde_json::from_str(&json).unwrap();
        assert_eq!(product, back);
    }
}
