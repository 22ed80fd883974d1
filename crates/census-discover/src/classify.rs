//! Model-prefix classification against the known-device table.

use std::sync::Arc;

use census_core::{ClassifiedDevice, DeviceAttributes, HostAddress, KnownDeviceTable, ProbeError};

pub struct DeviceClassifier {
    known: Arc<KnownDeviceTable>,
}

impl DeviceClassifier {
    pub fn new(known: Arc<KnownDeviceTable>) -> Self {
        Self { known }
    }

    /// Type of the first table entry whose prefix starts `model`.
    pub fn device_type(&self, model: &str) -> Option<&str> {
        self.known.lookup(model).map(|entry| entry.device_type.as_str())
    }

    /// Attach a device type. An unmatched model discards the attributes.
    pub fn classify(
        &self,
        host: HostAddress,
        attributes: DeviceAttributes,
    ) -> Result<ClassifiedDevice, ProbeError> {
        match self.device_type(&attributes.model) {
            Some(device_type) => Ok(ClassifiedDevice {
                device_type: device_type.to_string(),
                attributes,
            }),
            None => Err(ProbeError::UnknownDevice {
                host,
                model: attributes.model,
            }),
        }
    }
}
