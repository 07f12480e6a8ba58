//! Argument checks and conversions shared by the light operations.

use crate::error::{Error, Result};
use hsl::HSL;
use lifx_core::HSBK;
use std::convert::TryFrom;

/// Warmest white a LIFX bulb can display.
pub const MIN_KELVIN: u16 = 2500;
/// Coolest white a LIFX bulb can display.
pub const MAX_KELVIN: u16 = 9000;

pub(crate) fn check_kelvin(kelvin: u16) -> Result<u16> {
    if (MIN_KELVIN..=MAX_KELVIN).contains(&kelvin) {
        Ok(kelvin)
    } else {
        Err(Error::OutOfRange {
            name: "kelvin",
            value: kelvin as i64,
        })
    }
}

/// Transition times travel as a u32 count of milliseconds.
///
/// The range check runs on the full duration, so a fraction of a millisecond below zero or
/// above `u32::MAX` ms is rejected rather than truncated into range.
pub(crate) fn transition_millis(transition: chrono::Duration) -> Result<u32> {
    let millis = transition.num_milliseconds();
    let out_of_range = Error::OutOfRange {
        name: "transition duration (ms)",
        value: millis,
    };
    if transition < chrono::Duration::zero()
        || transition > chrono::Duration::milliseconds(u32::MAX as i64)
    {
        return Err(out_of_range);
    }
    u32::try_from(millis).map_err(|_| out_of_range)
}

/// Converts an RGB color to HSBK, keeping the given kelvin.
///
/// HSL lightness is used as brightness.
pub fn rgb_to_hsbk(red: u8, green: u8, blue: u8, kelvin: u16) -> HSBK {
    let hsl = HSL::from_rgb(&[red, green, blue]);
    HSBK {
        hue: scale(hsl.h / 360.0),
        saturation: scale(hsl.s),
        brightness: scale(hsl.l),
        kelvin,
    }
}

fn scale(fraction: f64) -> u16 {
    (fraction.max(0.0).min(1.0) * 65535.0).round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kelvin_bounds() {
        assert!(check_kelvin(MIN_KELVIN).is_ok());
        assert!(check_kelvin(MAX_KELVIN).is_ok());
        assert!(check_kelvin(3500).is_ok());
        for k in &[0, 2499, 9001, u16::MAX] {
            assert!(matches!(
                check_kelvin(*k),
                Err(Error::OutOfRange { name: "kelvin", .. })
            ));
        }
    }

    #[test]
    fn test_transition_millis() {
        assert_eq!(transition_millis(chrono::Duration::zero()).unwrap(), 0);
        assert_eq!(
            transition_millis(chrono::Duration::seconds(2)).unwrap(),
            2000
        );
        assert_eq!(
            transition_millis(chrono::Duration::milliseconds(u32::MAX as i64)).unwrap(),
            u32::MAX
        );
        assert!(matches!(
            transition_millis(chrono::Duration::milliseconds(-1)),
            Err(Error::OutOfRange { value: -1, .. })
        ));
        assert!(matches!(
            transition_millis(chrono::Duration::milliseconds(u32::MAX as i64 + 1)),
            Err(Error::OutOfRange { .. })
        ));

        // fractions of a millisecond must not be truncated into range
        assert!(matches!(
            transition_millis(chrono::Duration::microseconds(-500)),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            transition_millis(
                chrono::Duration::milliseconds(u32::MAX as i64)
                    + chrono::Duration::microseconds(500)
            ),
            Err(Error::OutOfRange { .. })
        ));
        assert_eq!(
            transition_millis(chrono::Duration::microseconds(1500)).unwrap(),
            1
        );
    }

    #[test]
    fn test_rgb_to_hsbk() {
        let white = rgb_to_hsbk(255, 255, 255, 4000);
        assert_eq!(white.saturation, 0);
        assert_eq!(white.brightness, 65535);
        assert_eq!(white.kelvin, 4000);

        let blue = rgb_to_hsbk(0, 0, 255, 3500);
        assert_eq!(blue.hue, 43690);
        assert_eq!(blue.saturation, 65535);

        let black = rgb_to_hsbk(0, 0, 0, 3500);
        assert_eq!(black.brightness, 0);
    }
}
