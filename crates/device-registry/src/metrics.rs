use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct DeviceMetrics {
    pub frames_published: IntCounter,
    pub frames_written: IntCounter,
    pub devices_registered: IntGauge,
    pub routing_errors: IntCounter,
    pub publish_errors: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub dev: DeviceMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let err = |e: prometheus::Error| format!("metrics init error: {e}");
        let frames_published = IntCounter::new(
            "frame_broker_frames_published",
            "Device reports published to the bus",
        )
        .map_err(err)?;
        let frames_written = IntCounter::new(
            "frame_broker_frames_written",
            "Bus messages written to devices",
        )
        .map_err(err)?;
        let devices_registered = IntGauge::new(
            "frame_broker_devices_registered",
            "Number of devices currently registered",
        )
        .map_err(err)?;
        let routing_errors = IntCounter::new(
            "frame_broker_routing_errors",
            "Inbound messages discarded for bad channel, route or payload",
        )
        .map_err(err)?;
        let publish_errors = IntCounter::new(
            "frame_broker_publish_errors",
            "Device reports that could not be published",
        )
        .map_err(err)?;
        let dev = DeviceMetrics {
            frames_published,
            frames_written,
            devices_registered,
            routing_errors,
            publish_errors,
        };
        let _ = registry.register(Box::new(dev.frames_published.clone()));
        let _ = registry.register(Box::new(dev.frames_written.clone()));
        let _ = registry.register(Box::new(dev.devices_registered.clone()));
        let _ = registry.register(Box::new(dev.routing_errors.clone()));
        let _ = registry.register(Box::new(dev.publish_errors.clone()));
        Ok(Self { registry, dev })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_text_lists_counters() {
        let hub = MetricsHub::new().unwrap();
        hub.dev.frames_published.inc();
        hub.dev.devices_registered.set(2);
        let text = hub.encode_text();
        assert!(text.contains("frame_broker_frames_published 1"));
        assert!(text.contains("frame_broker_devices_registered 2"));
    }
}
