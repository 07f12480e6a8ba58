//! Messages specific to lights.
//!
//! Transition durations are checked before anything is sent: negative values, or more
//! milliseconds than fit in a u32, fail with [Error::OutOfRange](crate::Error::OutOfRange).

use crate::client::LanClient;
use crate::color::{check_kelvin, rgb_to_hsbk, transition_millis};
use crate::device::{Device, LightBulb};
use crate::device_ops::power_level;
use crate::error::Result;
use lifx_core::{
    InfraredState, LightState, LightStatePower, LittleEndianWriter, MessageType, HSBK,
};
use log::debug;

impl LanClient {
    pub async fn turn_bulb_on(&self, bulb: &LightBulb, transition: chrono::Duration) -> Result<()> {
        self.set_light_power(bulb, true, transition).await
    }

    pub async fn turn_bulb_off(
        &self,
        bulb: &LightBulb,
        transition: chrono::Duration,
    ) -> Result<()> {
        self.set_light_power(bulb, false, transition).await
    }

    /// Powers the light on or off, fading over `transition`.
    pub async fn set_light_power(
        &self,
        bulb: &LightBulb,
        on: bool,
        transition: chrono::Duration,
    ) -> Result<()> {
        let duration = transition_millis(transition)?;
        debug!(
            "Sending LightSetPower(on={}, duration={}ms) to {}",
            on,
            duration,
            bulb.host_name()
        );
        let mut payload = Vec::new();
        payload.write_val(power_level(on))?;
        payload.write_val(duration)?;
        self.set(bulb, MessageType::LightSetPower, &payload).await
    }

    /// Returns true if the light is powered on.
    pub async fn get_light_power(&self, bulb: &LightBulb) -> Result<bool> {
        debug!("Sending LightGetPower to {}", bulb.host_name());
        let state: LightStatePower = self.get(bulb, MessageType::LightGetPower).await?;
        Ok(state.is_on())
    }

    /// Changes the color, fading over `transition`.
    ///
    /// Kelvin must be within [MIN_KELVIN](crate::MIN_KELVIN)..=[MAX_KELVIN](crate::MAX_KELVIN).
    pub async fn set_color(
        &self,
        bulb: &LightBulb,
        color: HSBK,
        transition: chrono::Duration,
    ) -> Result<()> {
        check_kelvin(color.kelvin)?;
        let duration = transition_millis(transition)?;
        debug!(
            "Sending LightSetColor({:?}, duration={}ms) to {}",
            color,
            duration,
            bulb.host_name()
        );
        let mut payload = Vec::new();
        payload.write_val(0u8)?;
        payload.write_val(color)?;
        payload.write_val(duration)?;
        self.set(bulb, MessageType::LightSetColor, &payload).await
    }

    /// Like [set_color](LanClient::set_color), from an RGB triple.
    pub async fn set_color_rgb(
        &self,
        bulb: &LightBulb,
        rgb: (u8, u8, u8),
        kelvin: u16,
        transition: chrono::Duration,
    ) -> Result<()> {
        let (red, green, blue) = rgb;
        self.set_color(bulb, rgb_to_hsbk(red, green, blue, kelvin), transition)
            .await
    }

    /// Color, power and label in one round trip.
    pub async fn get_light_state(&self, bulb: &LightBulb) -> Result<LightState> {
        debug!("Sending LightGet to {}", bulb.host_name());
        self.get(bulb, MessageType::LightGet).await
    }

    /// Infrared brightness, 0 to 65535.
    pub async fn get_infrared<D: Device + ?Sized>(&self, device: &D) -> Result<u16> {
        debug!("Sending InfraredGet to {}", device.host_name());
        let state: InfraredState = self.get(device, MessageType::InfraredGet).await?;
        Ok(state.brightness)
    }

    /// Accepted by any device; models without infrared LEDs ignore the level.
    pub async fn set_infrared<D: Device + ?Sized>(
        &self,
        device: &D,
        brightness: u16,
    ) -> Result<()> {
        debug!(
            "Sending InfraredSet(brightness={}) to {}",
            brightness,
            device.host_name()
        );
        let mut payload = Vec::new();
        payload.write_val(brightness)?;
        self.set(device, MessageType::InfraredSet, &payload).await
    }
}
