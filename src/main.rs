//! DeafNav wristband firmware entry point
//!
//! Brings up the radio and IP stack, then spawns the MQTT session and control
//! tasks.

#![no_std]
#![no_main]

use crate::task::{broker::mqtt_session, network, wristband::wristband};
use deafnav_wristband::system::config::Config;
use defmt::info;
use embassy_executor::Spawner;
use embassy_rp::block::ImageDef;
use task::resources::{AssignedResources, HapticResources, PulseResources, RadioResources, RangerResources};
use {defmt_rtt as _, panic_probe as _};

/// Firmware image type for bootloader
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: ImageDef = ImageDef::secure_exe();

/// Board bindings and tasks
mod task;

/// Firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    // Split the resources into separate groups for each task
    let r = split_resources!(p);

    let config = Config::default();
    info!("DeafNav wristband starting, network {}", config.network.ssid);

    // Radio and IP stack runners are spawned inside; association is left to the link
    let stack = network::start(&spawner, r.radio, config.network).await;

    spawner.spawn(mqtt_session(stack)).unwrap();
    spawner
        .spawn(wristband(r.ranger, r.haptic, r.pulse, stack, config))
        .unwrap();
}
