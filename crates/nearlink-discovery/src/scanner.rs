//! Live BLE scanning via btleplug
//!
//! Bridges the platform Bluetooth stack into the sample channel. This is the only
//! place radio callbacks enter the process; everything downstream is plain tokio
//! tasks and channels.

use crate::advertisement::sample_from_manufacturer_data;
use crate::error::{DiscoveryError, DiscoveryResult};
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::StreamExt;
use nearlink_core::AdvertisementSample;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Scans for advertisements carrying a linking identifier
pub struct BleScanner {
    adapter: Adapter,
    company_id: u16,
}

impl BleScanner {
    /// Open the adapter at `adapter_index` (0 = first adapter reported by the OS)
    pub async fn new(adapter_index: usize, company_id: u16) -> DiscoveryResult<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(adapter_index)
            .ok_or(DiscoveryError::NoAdapter)?;

        match adapter.adapter_info().await {
            Ok(info) => info!("BLE: using adapter {}", info),
            Err(e) => debug!("BLE: adapter info unavailable: {}", e),
        }

        Ok(Self { adapter, company_id })
    }

    /// Scan until the radio stack fails or the sample consumer goes away.
    ///
    /// Samples are handed off with `try_send`; when the channel is full the sample
    /// is dropped rather than stalling the Bluetooth event stream.
    pub async fn run(self, samples: mpsc::Sender<AdvertisementSample>) -> DiscoveryResult<()> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        info!("BLE: scanner started (company id 0x{:04X})", self.company_id);

        let result = loop {
            let Some(event) = events.next().await else {
                break Err(DiscoveryError::Transport(
                    "adapter event stream ended".to_string(),
                ));
            };

            // Every advertisement refreshes the peripheral's properties, so
            // discovered/updated events carry both the RSSI and the payload.
            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                _ => continue,
            };

            let sample = match self.sample_for(&id).await {
                Ok(sample) => sample,
                Err(e) => {
                    debug!("BLE: dropping advertisement from {:?}: {}", id, e);
                    continue;
                }
            };

            match samples.try_send(sample) {
                Ok(()) => {}
                Err(TrySendError::Full(sample)) => {
                    warn!("BLE: sample queue full, dropping sample for {}", sample.identifier);
                }
                Err(TrySendError::Closed(_)) => {
                    info!("BLE: sample consumer closed");
                    break Ok(());
                }
            }
        };

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("BLE: failed to stop scan: {}", e);
        }
        info!("BLE: scanner stopped");
        result
    }

    async fn sample_for(&self, id: &PeripheralId) -> DiscoveryResult<AdvertisementSample> {
        let peripheral = self.adapter.peripheral(id).await?;
        let properties = peripheral.properties().await?.ok_or_else(|| {
            DiscoveryError::MalformedAdvertisement("no peripheral properties".to_string())
        })?;

        sample_from_manufacturer_data(
            &properties.address.to_string(),
            properties.rssi,
            &properties.manufacturer_data,
            self.company_id,
        )
    }
}
