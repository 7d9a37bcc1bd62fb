use hid_transport::DeviceInfo;
use serde::{Deserialize, Serialize};

/// Allow-list of devices the bridge may claim.
///
/// A device matches when its product string is one of `products` or its USB
/// product id is one of `product_ids`. An empty filter matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub product_ids: Vec<u16>,
}

impl DeviceFilter {
    pub fn products<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            products: names.into_iter().map(Into::into).collect(),
            product_ids: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.product_ids.is_empty()
    }

    pub fn matches(&self, device: &DeviceInfo) -> bool {
        let by_name = device
            .product
            .as_deref()
            .is_some_and(|p| self.products.iter().any(|n| n == p));
        by_name || self.product_ids.contains(&device.product_id)
    }

    /// Keep only matching devices, preserving discovery order.
    pub fn apply(&self, devices: Vec<DeviceInfo>) -> Vec<DeviceInfo> {
        devices.into_iter().filter(|d| self.matches(d)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_by_product_name() {
        let filter = DeviceFilter::products(["DALIUSBInterface"]);
        let dali = DeviceInfo::new("/dev/hidraw0").with_product("DALIUSBInterface");
        let mouse = DeviceInfo::new("/dev/hidraw1").with_product("USB Mouse");
        let anonymous = DeviceInfo::new("/dev/hidraw2");
        assert!(filter.matches(&dali));
        assert!(!filter.matches(&mouse));
        assert!(!filter.matches(&anonymous));
    }

    #[test]
    fn test_matches_by_product_id() {
        let filter = DeviceFilter {
            products: vec![],
            product_ids: vec![0x05df],
        };
        assert!(filter.matches(&DeviceInfo::new("a").with_ids(0x16c0, 0x05df)));
        assert!(!filter.matches(&DeviceInfo::new("b").with_ids(0x16c0, 0x05dc)));
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        let filter = DeviceFilter::default();
        assert!(filter.is_empty());
        assert!(!filter.matches(&DeviceInfo::new("a").with_product("x")));
    }

    #[test]
    fn test_apply_keeps_order() {
        let filter = DeviceFilter::products(["X"]);
        let out = filter.apply(vec![
            DeviceInfo::new("b").with_product("X"),
            DeviceInfo::new("z").with_product("Y"),
            DeviceInfo::new("a").with_product("X"),
        ]);
        let paths: Vec<_> = out.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, ["b", "a"]);
    }
}
