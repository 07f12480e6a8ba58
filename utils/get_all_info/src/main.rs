use lifx_lan::{
    ClientOptions, Device, LanClient, LightBulb, LightState, StateHostFirmware, StateVersion,
};

use chrono::Local;
use log::warn;
use std::time::Duration;

const DISCOVERY_TIME: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct BulbInfo {
    name: Option<String>,
    group: Option<String>,
    version: Option<StateVersion>,
    host_firmware: Option<StateHostFirmware>,
    powered: Option<bool>,
    state: Option<LightState>,
    infrared: Option<u16>,
}

impl BulbInfo {
    /// Queries everything we know how to ask.  A bulb that misses one reply still gets printed.
    async fn query(client: &LanClient, bulb: &LightBulb) -> BulbInfo {
        let mut info = BulbInfo::default();
        match client.get_device_label(bulb).await {
            Ok(name) => info.name = Some(name),
            Err(e) => warn!("{}: label: {}", bulb, e),
        }
        match client.get_device_group(bulb).await {
            Ok(group) => info.group = Some(group.label),
            Err(e) => warn!("{}: group: {}", bulb, e),
        }
        match client.get_device_version(bulb).await {
            Ok(version) => info.version = Some(version),
            Err(e) => warn!("{}: version: {}", bulb, e),
        }
        match client.get_device_host_firmware(bulb).await {
            Ok(fw) => info.host_firmware = Some(fw),
            Err(e) => warn!("{}: host firmware: {}", bulb, e),
        }
        match client.get_device_power(bulb).await {
            Ok(on) => info.powered = Some(on),
            Err(e) => warn!("{}: power: {}", bulb, e),
        }
        match client.get_light_state(bulb).await {
            Ok(state) => info.state = Some(state),
            Err(e) => warn!("{}: state: {}", bulb, e),
        }
        // only some models have infrared, the rest stay silent
        if let Ok(level) = client.get_infrared(bulb).await {
            info.infrared = Some(level);
        }
        info
    }

    fn print(&self, bulb: &LightBulb) {
        match (&self.name, &self.group) {
            (Some(name), Some(group)) => print!(
                "{}/{} ({} - {})",
                name,
                group,
                bulb.mac_address_name(),
                bulb.host_name()
            ),
            (Some(name), None) => print!(
                "{} ({} - {})",
                name,
                bulb.mac_address_name(),
                bulb.host_name()
            ),
            _ => print!("({})", bulb.mac_address_name()),
        }

        if let Some(version) = &self.version {
            println!(
                " - vendor {} product {} version {}",
                version.vendor, version.product, version.version
            );
        } else {
            println!();
        }

        if let Some(fw) = &self.host_firmware {
            println!(
                "  Host FW:{}.{} built {}",
                fw.version >> 16,
                fw.version & 0xffff,
                fw.build.with_timezone(&Local).format("%Y-%m-%d")
            );
        }
        match self.powered {
            Some(true) => {
                print!("  Powered On");
                if let Some(state) = &self.state {
                    let c = state.color;
                    print!(
                        "  hue {} sat {} bri {} {}K",
                        c.hue, c.saturation, c.brightness, c.kelvin
                    );
                }
                println!();
            }
            Some(false) => println!("  Powered off"),
            None => {}
        }
        if let Some(level) = self.infrared {
            println!("  Infrared: {}", level);
        }
        println!(
            "  Last seen {}",
            bulb.last_seen().with_timezone(&Local).format("%H:%M:%S")
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let client = LanClient::new(ClientOptions::default());
    client.start().await?;
    client.start_discovery().await?;

    println!("Discovering bulbs for {:?}", DISCOVERY_TIME);
    tokio::time::sleep(DISCOVERY_TIME).await;
    client.stop_discovery().await;

    let bulbs = client.devices();
    if bulbs.is_empty() {
        println!("No bulbs found");
    }
    for bulb in &bulbs {
        BulbInfo::query(&client, bulb).await.print(bulb);
    }

    client.stop().await;
    Ok(())
}
