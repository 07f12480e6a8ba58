//! Messages every LIFX device understands.

use crate::client::LanClient;
use crate::device::Device;
use crate::error::Result;
use lifx_core::{
    LifxString, LittleEndianWriter, MessageType, StateGroup, StateHostFirmware, StateLabel,
    StatePower, StateVersion,
};
use log::debug;

/// Power level on the wire: 65535 is on, 0 is off.
pub(crate) fn power_level(on: bool) -> u16 {
    if on {
        u16::MAX
    } else {
        0
    }
}

impl LanClient {
    pub async fn turn_device_on<D: Device + ?Sized>(&self, device: &D) -> Result<()> {
        self.set_device_power(device, true).await
    }

    pub async fn turn_device_off<D: Device + ?Sized>(&self, device: &D) -> Result<()> {
        self.set_device_power(device, false).await
    }

    pub async fn set_device_power<D: Device + ?Sized>(&self, device: &D, on: bool) -> Result<()> {
        debug!("Sending DeviceSetPower(on={}) to {}", on, device.host_name());
        let mut payload = Vec::new();
        payload.write_val(power_level(on))?;
        self.set(device, MessageType::DeviceSetPower, &payload).await
    }

    /// Returns true if the device is powered on.
    pub async fn get_device_power<D: Device + ?Sized>(&self, device: &D) -> Result<bool> {
        debug!("Sending DeviceGetPower to {}", device.host_name());
        let state: StatePower = self.get(device, MessageType::DeviceGetPower).await?;
        Ok(state.is_on())
    }

    pub async fn get_device_label<D: Device + ?Sized>(&self, device: &D) -> Result<String> {
        debug!("Sending DeviceGetLabel to {}", device.host_name());
        let state: StateLabel = self.get(device, MessageType::DeviceGetLabel).await?;
        Ok(state.label)
    }

    /// Labels longer than 32 bytes are truncated.
    pub async fn set_device_label<D: Device + ?Sized>(
        &self,
        device: &D,
        label: &str,
    ) -> Result<()> {
        debug!("Sending DeviceSetLabel({:?}) to {}", label, device.host_name());
        let mut payload = Vec::new();
        payload.write_val(&LifxString::new(label))?;
        self.set(device, MessageType::DeviceSetLabel, &payload).await
    }

    pub async fn get_device_version<D: Device + ?Sized>(&self, device: &D) -> Result<StateVersion> {
        debug!("Sending DeviceGetVersion to {}", device.host_name());
        self.get(device, MessageType::DeviceGetVersion).await
    }

    pub async fn get_device_host_firmware<D: Device + ?Sized>(
        &self,
        device: &D,
    ) -> Result<StateHostFirmware> {
        debug!("Sending DeviceGetHostFirmware to {}", device.host_name());
        self.get(device, MessageType::DeviceGetHostFirmware).await
    }

    /// The group (room) the device is assigned to.
    pub async fn get_device_group<D: Device + ?Sized>(&self, device: &D) -> Result<StateGroup> {
        debug!("Sending DeviceGetGroup to {}", device.host_name());
        self.get(device, MessageType::DeviceGetGroup).await
    }
}
