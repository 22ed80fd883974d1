//! Vendor-specific clean-up of retrieved attributes.
//!
//! The prober runs the normalizer registered for the bound vendor after all
//! fields are retrieved. New vendors plug in here without touching the probe
//! loop.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use census_core::DeviceAttributes;

pub trait VendorNormalizer: Send + Sync {
    fn normalize(&self, attributes: &mut DeviceAttributes);
}

/// Normalizers keyed by lower-cased vendor name.
pub struct NormalizerRegistry {
    normalizers: HashMap<String, Arc<dyn VendorNormalizer>>,
}

impl NormalizerRegistry {
    /// A registry with no rules; every vendor passes through unchanged.
    pub fn empty() -> Self {
        Self {
            normalizers: HashMap::new(),
        }
    }

    pub fn register(&mut self, vendor: &str, normalizer: Arc<dyn VendorNormalizer>) {
        self.normalizers.insert(vendor.to_lowercase(), normalizer);
    }

    pub fn get(&self, vendor: &str) -> Option<&Arc<dyn VendorNormalizer>> {
        self.normalizers.get(&vendor.to_lowercase())
    }

    pub fn normalize(&self, vendor: &str, attributes: &mut DeviceAttributes) {
        if let Some(normalizer) = self.get(vendor) {
            normalizer.normalize(attributes);
        }
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("fortinet", Arc::new(Fortinet::new()));
        registry.register("cisco", Arc::new(Cisco));
        registry
    }
}

/// Keep the text before the first `,` of a software version string.
fn truncate_software(attributes: &mut DeviceAttributes) {
    if let Some((head, _)) = attributes.software.split_once(',') {
        attributes.software = head.trim_end().to_string();
    }
}

/// FortiOS reports `"v6.4.8,build1914,211117"` as its version and has no
/// model OID on every platform; the model is then read off the serial.
pub struct Fortinet {
    serial_pattern: Option<Regex>,
}

impl Fortinet {
    pub fn new() -> Self {
        Self {
            serial_pattern: Regex::new(r"^(FGT|FG|FWF|FAP|FSW)(\d{2,4}[A-Z]?)").ok(),
        }
    }

    /// `FGT60E4Q16000001` -> `FG60E`. Empty when the serial is unrecognised.
    pub fn model_from_serial(&self, serial: &str) -> String {
        let captures = self.serial_pattern.as_ref().and_then(|re| re.captures(serial));
        match captures {
            Some(caps) => {
                let family = match &caps[1] {
                    "FGT" => "FG",
                    other => other,
                };
                format!("{family}{}", &caps[2])
            }
            None => String::new(),
        }
    }
}

impl Default for Fortinet {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorNormalizer for Fortinet {
    fn normalize(&self, attributes: &mut DeviceAttributes) {
        truncate_software(attributes);
        if attributes.model.is_empty() {
            attributes.model = self.model_from_serial(&attributes.serial);
        }
        attributes.vendor = "Fortinet".to_string();
    }
}

pub struct Cisco;

impl VendorNormalizer for Cisco {
    fn normalize(&self, attributes: &mut DeviceAttributes) {
        truncate_software(attributes);
        attributes.vendor = "Cisco".to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(model: &str, serial: &str, software: &str) -> DeviceAttributes {
        DeviceAttributes {
            model: model.to_string(),
            serial: serial.to_string(),
            software: software.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_fortinet_derives_model_from_serial() {
        let registry = NormalizerRegistry::default();
        let mut a = attrs("", "FGT60E4Q16000001", "v6.4.8,build1914,211117");
        registry.normalize("Fortinet", &mut a);
        assert_eq!(a.model, "FG60E");
        assert_eq!(a.software, "v6.4.8");
        assert_eq!(a.vendor, "Fortinet");
    }

    #[test]
    fn test_fortinet_keeps_reported_model() {
        let mut a = attrs("FG100F", "FG100FTK20000001", "v7.0.1");
        Fortinet::new().normalize(&mut a);
        assert_eq!(a.model, "FG100F");
        assert_eq!(a.software, "v7.0.1");
    }

    #[test]
    fn test_fortinet_serial_variants() {
        let f = Fortinet::new();
        assert_eq!(f.model_from_serial("FAP221E0000001"), "FAP221E");
        assert_eq!(f.model_from_serial("FWF61E0000000001"), "FWF61E");
        assert_eq!(f.model_from_serial("FG1K0000"), "");
        assert_eq!(f.model_from_serial("XX123"), "");
        assert_eq!(f.model_from_serial(""), "");
    }

    #[test]
    fn test_cisco_truncates_software() {
        let mut a = attrs("WS-C2960X", "FOC1234", "15.2(7)E2, RELEASE SOFTWARE (fc3)");
        NormalizerRegistry::default().normalize("cisco", &mut a);
        assert_eq!(a.software, "15.2(7)E2");
        assert_eq!(a.vendor, "Cisco");
        assert_eq!(a.model, "WS-C2960X");
    }

    #[test]
    fn test_unregistered_vendor_passes_through() {
        let mut a = attrs("", "FGT60E4Q16000001", "1.0,2");
        a.vendor = "acme".to_string();
        let before = a.clone();
        NormalizerRegistry::default().normalize("acme", &mut a);
        assert_eq!(a, before);
    }
}
