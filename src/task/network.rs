//! Wi-Fi Bring-up and Association
//!
//! Starts the CYW43439 radio and the embassy-net stack, then keeps a join task
//! parked until the telemetry link asks for association.
//!
//! # Association
//! Joining an access point and getting a DHCP lease takes many control ticks. The
//! join therefore runs in its own task: [`WifiAssociation::associate`] requests a
//! join and waits for the stack to come up. When the link's step budget runs out
//! first, the join keeps going in the background and the next tick waits again.

use cyw43::JoinOptions;
use cyw43_pio::{PioSpi, DEFAULT_CLOCK_DIVIDER};
use deafnav_wristband::system::config::NetworkConfig;
use deafnav_wristband::system::link::{Network, TransportError};
use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_net::{Stack, StackResources};
use embassy_rp::clocks::RoscRng;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIO0};
use embassy_rp::pio::Pio;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use rand_core::RngCore;
use static_cell::StaticCell;

use crate::task::resources::{Irqs, RadioResources};

/// Sockets: one MQTT connection and one DNS query
const SOCKET_COUNT: usize = 3;

/// Raised by the telemetry link when it wants the radio associated
static JOIN_REQUEST: Signal<CriticalSectionRawMutex, ()> = Signal::new();

type RadioSpi = PioSpi<'static, PIO0, 0, DMA_CH0>;

#[embassy_executor::task]
async fn radio_runner(runner: cyw43::Runner<'static, Output<'static>, RadioSpi>) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_runner(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

/// Joins the access point each time a join is requested and the link is down
#[embassy_executor::task]
async fn wifi_join(mut control: cyw43::Control<'static>, stack: Stack<'static>, network: NetworkConfig) -> ! {
    loop {
        JOIN_REQUEST.wait().await;
        if stack.is_link_up() {
            continue;
        }

        info!("joining access point {}", network.ssid);
        let options = if network.password.is_empty() {
            JoinOptions::new_open()
        } else {
            JoinOptions::new(network.password.as_bytes())
        };
        match control.join(network.ssid, options).await {
            Ok(()) => info!("joined {}, waiting for DHCP lease", network.ssid),
            Err(e) => warn!("join failed with status {}", e.status),
        }
    }
}

/// Powers up the radio, spawns its runners and returns the IP stack
pub async fn start(spawner: &Spawner, r: RadioResources, network: NetworkConfig) -> Stack<'static> {
    // Firmware blobs from the embassy repository, see README
    let fw = include_bytes!(concat!(env!("CYW43_FIRMWARE_DIR"), "/43439A0.bin"));
    let clm = include_bytes!(concat!(env!("CYW43_FIRMWARE_DIR"), "/43439A0_clm.bin"));

    let pwr = Output::new(r.pwr_pin, Level::Low);
    let cs = Output::new(r.cs_pin, Level::High);
    let mut pio = Pio::new(r.pio, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        r.dio_pin,
        r.clk_pin,
        r.dma,
    );

    static RADIO_STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = RADIO_STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw).await;
    spawner.spawn(radio_runner(runner)).unwrap();

    control.init(clm).await;
    control
        .set_power_management(cyw43::PowerManagementMode::PowerSave)
        .await;
    info!("radio up");

    let seed = RoscRng.next_u64();
    static NET_RESOURCES: StaticCell<StackResources<SOCKET_COUNT>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        net_device,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_runner(runner)).unwrap();
    spawner.spawn(wifi_join(control, stack, network)).unwrap();

    stack
}

/// Association collaborator for the telemetry link
pub struct WifiAssociation {
    stack: Stack<'static>,
}

impl WifiAssociation {
    pub fn new(stack: Stack<'static>) -> Self {
        Self { stack }
    }
}

impl Network for WifiAssociation {
    fn is_associated(&self) -> bool {
        self.stack.is_link_up() && self.stack.is_config_up()
    }

    async fn associate(&mut self) -> Result<(), TransportError> {
        JOIN_REQUEST.signal(());
        self.stack.wait_config_up().await;
        info!("DHCP lease acquired");
        Ok(())
    }
}
