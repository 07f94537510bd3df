use std::collections::HashMap;

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

use crate::config::MdnsSection;
use crate::error::Result;

/// Service type of the control channel.
pub const SERVICE_TYPE: &str = "_ftp._tcp.local.";

// Top-level domain of a host name.
const TOP_LEVEL_DOMAIN: &str = "local.";

/// Advertises the control channel through mDNS-SD.
pub struct Advertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Advertiser {
    /// Registers the control channel listening on `port`.
    ///
    /// # Errors
    ///
    /// Fails when the mDNS daemon cannot start or the service cannot be
    /// registered.
    pub fn register(config: &MdnsSection, port: u16) -> Result<Self> {
        let daemon = ServiceDaemon::new()?;

        let hostname = format!("{}.{TOP_LEVEL_DOMAIN}", config.hostname);
        let mut properties = HashMap::new();
        let _ = properties.insert("path".to_string(), "/".to_string());

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &config.instance,
            &hostname,
            "",
            port,
            properties,
        )?
        .enable_addr_auto();

        let fullname = service.get_fullname().to_string();
        daemon.register(service)?;
        info!("Advertising {fullname} on {hostname}, port {port}");

        Ok(Self { daemon, fullname })
    }

    /// Full name of the advertised service.
    #[must_use]
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Withdraws the advertisement and stops the mDNS daemon.
    pub fn shutdown(self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!("Cannot withdraw {}: {e}", self.fullname);
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!("Cannot stop the mDNS daemon: {e}");
        }
    }
}
