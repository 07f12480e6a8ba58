use lifx_lan::{ClientOptions, Device, DiscoveryEvent, LanClient, LightBulb};

use log::{info, warn};

/// Label and model, for logging a newly found bulb.
async fn describe(client: &LanClient, bulb: &LightBulb) -> String {
    let label = match client.get_device_label(bulb).await {
        Ok(label) => label,
        Err(e) => {
            warn!("Could not get label of {}: {}", bulb, e);
            "Unknown".to_owned()
        }
    };
    match client.get_device_version(bulb).await {
        Ok(v) => format!("{} (vendor {}, product {})", label, v.vendor, v.product),
        Err(_) => label,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let client = LanClient::new(ClientOptions::default());
    let mut events = client.subscribe();
    client.start().await?;
    client.start_discovery().await?;
    info!("Watching for bulbs, press ctrl-c to quit");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(DiscoveryEvent::Discovered(bulb)) => {
                    let name = describe(&client, &bulb).await;
                    info!("+ {} at {}: {}", bulb.mac_address_name(), bulb.host_name(), name);
                }
                Some(DiscoveryEvent::Lost(bulb)) => {
                    info!("- {} (last seen {})", bulb, bulb.last_seen());
                }
                None => break,
            },
        }
    }

    client.stop().await;
    Ok(())
}
