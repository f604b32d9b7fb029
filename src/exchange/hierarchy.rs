//! Hierarchy-matching oracles for device types and locations.
//!
//! The matching core only ever consults these through the two service
//! traits, so a different hierarchy source (registry file, standard body
//! taxonomy, remote service snapshot) can be plugged in without touching
//! the book. The reference implementations are in-memory prefix tests over
//! a registered tree; lookups never perform I/O.

use std::collections::HashSet;

use crate::exchange::error::{ExchangeError, ExchangeResult};
use crate::exchange::product::CategoryPath;

/// Device-type hierarchy oracle.
///
/// `includes_device_type` answers whether the concrete category of a
/// certificate falls within (is a descendant of, or equal to) any of the
/// filter categories.
pub trait DeviceTypeService: Send + Sync {
    fn includes_device_type(
        &self,
        concrete: &CategoryPath,
        filters: &[CategoryPath],
    ) -> ExchangeResult<bool>;
}

/// Location hierarchy oracle, same hierarchical semantics as device types.
pub trait LocationService: Send + Sync {
    fn matches(&self, filters: &[CategoryPath], concrete: &CategoryPath) -> ExchangeResult<bool>;
}

/// Membership-validated set of known hierarchy nodes.
///
/// Registering a path registers every ancestor as well, so both leaf and
/// intermediate categories are addressable in filters. A query naming an
/// unregistered path is a collaborator failure, not a non-match: silently
/// returning false would masquerade as "no eligible counter-order".
#[derive(Debug, Clone)]
struct PathRegistry {
    kind: &'static str,
    known: HashSet<CategoryPath>,
}

impl PathRegistry {
    fn from_paths(kind: &'static str, paths: &[&str]) -> ExchangeResult<Self> {
        let mut known = HashSet::new();
        for raw in paths {
            let mut node: CategoryPath = raw.parse()?;
            loop {
                let parent = node.parent();
                known.insert(node);
                match parent {
                    Some(p) => node = p,
                    None => break,
                }
            }
        }
        Ok(Self { kind, known })
    }

    fn assert_known(&self, path: &CategoryPath) -> ExchangeResult<()> {
        if self.known.contains(path) {
            Ok(())
        } else {
            Err(ExchangeError::OracleUnavailable(format!(
                "unknown {}: {}",
                self.kind, path
            )))
        }
    }

    fn any_ancestor_of(
        &self,
        filters: &[CategoryPath],
        concrete: &CategoryPath,
    ) -> ExchangeResult<bool> {
        self.assert_known(concrete)?;
        for filter in filters {
            self.assert_known(filter)?;
        }
        Ok(filters.iter().any(|filter| filter.is_prefix_of(concrete)))
    }
}

/// In-memory device-type registry
#[derive(Debug, Clone)]
pub struct DeviceTypeRegistry {
    registry: PathRegistry,
}

impl DeviceTypeRegistry {
    pub fn from_paths(paths: &[&str]) -> ExchangeResult<Self> {
        Ok(Self {
            registry: PathRegistry::from_paths("device type", paths)?,
        })
    }
}

impl DeviceTypeService for DeviceTypeRegistry {
    fn includes_device_type(
        &self,
        concrete: &CategoryPath,
        filters: &[CategoryPath],
    ) -> ExchangeResult<bool> {
        self.registry.any_ancestor_of(filters, concrete)
    }
}

/// In-memory location registry
#[derive(Debug, Clone)]
pub struct LocationRegistry {
    registry: PathRegistry,
}

impl LocationRegistry {
    pub fn from_paths(paths: &[&str]) -> ExchangeResult<Self> {
        Ok(Self {
            registry: PathRegistry::from_paths("location", paths)?,
        })
    }
}

impl LocationService for LocationRegistry {
    fn matches(&self, filters: &[CategoryPath], concrete: &CategoryPath) -> ExchangeResult<bool> {
        self.registry.any_ancestor_of(filters, concrete)
    }
}

/// Oracle double that always reports the collaborator as unavailable
#[cfg(test)]
pub(crate) struct UnavailableOracle;

#[cfg(test)]
impl DeviceTypeService for UnavailableOracle {
    fn includes_device_type(
        &self,
        _concrete: &CategoryPath,
        _filters: &[CategoryPath],
    ) -> ExchangeResult<bool> {
        Err(ExchangeError::OracleUnavailable(
            "device type oracle offline".to_string(),
        ))
    }
}

#[cfg(test)]
impl LocationService for UnavailableOracle {
    fn matches(&self, _filters: &[CategoryPath], _concrete: &CategoryPath) -> ExchangeResult<bool> {
        Err(ExchangeError::OracleUnavailable(
            "location oracle offline".to_string(),
        ))
    }
}
