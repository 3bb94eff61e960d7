//! Unified ESP-NOW link node binary.
//!
//! Runs on both ESP32 and host platforms:
//! - **Host**: `cargo run --bin node` simulates a controller and a car on an
//!   in-memory radio medium. The controller's stick sweeps left and right,
//!   the car logs every command it applies.
//! - **ESP32**: `cargo espflash flash --bin node --features esp32 --release`
//!   starts Wi-Fi in station mode (no association), brings up ESP-NOW and
//!   runs one node. Without a wired joystick it settles as the car.
//!
//! The discovery token is read from `ESPNOW_LINK_TOKEN` at build time on
//! ESP32 and at run time on the host, falling back to the built-in default.

use espnow_link_esp32::command::{LoggingMotor, NeutralInput};
use espnow_link_esp32::config::{DiscoveryConfig, NodeConfig};
use espnow_link_esp32::Node;
use log::{error, info};
use std::sync::Arc;

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn node_config() -> NodeConfig {
    #[cfg(feature = "esp32")]
    let token: Option<String> = option_env!("ESPNOW_LINK_TOKEN").map(str::to_string);
    #[cfg(not(feature = "esp32"))]
    let token: Option<String> = std::env::var("ESPNOW_LINK_TOKEN").ok();

    match token.filter(|t| !t.is_empty()) {
        Some(token) => {
            info!("Using discovery token from ESPNOW_LINK_TOKEN");
            NodeConfig {
                discovery: DiscoveryConfig::with_token(token.into_bytes()),
                ..Default::default()
            }
        }
        None => NodeConfig::default(),
    }
}

/// Simulated stick sweeping steering back and forth at half throttle.
#[cfg(not(feature = "esp32"))]
struct SweepInput {
    step: i16,
}

#[cfg(not(feature = "esp32"))]
impl espnow_link_esp32::command::JoystickInput for SweepInput {
    fn sample(&mut self) -> espnow_link_esp32::JoystickCommand {
        use espnow_link_esp32::command::Buttons;

        self.step = (self.step + 5) % 400;
        let steer = if self.step < 200 {
            self.step - 100
        } else {
            300 - self.step
        };
        espnow_link_esp32::JoystickCommand::new(steer as i8, 50, Buttons::NONE)
    }
}

#[cfg(feature = "esp32")]
type Radio = (
    esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    Arc<dyn espnow_link_esp32::RawTransport>,
);

/// Start Wi-Fi in station mode and bring up ESP-NOW on it.
#[cfg(feature = "esp32")]
fn start_radio() -> Result<Radio, Box<dyn std::error::Error>> {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};
    use espnow_link_esp32::transport::EspNowTransport;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let esp_wifi = EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?;
    let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
    wifi.start()?;
    info!("Wi-Fi started in station mode");

    let transport = EspNowTransport::new()?;
    Ok((wifi, Arc::new(transport)))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    platform_init();

    info!("=== ESP-NOW link node starting ===");

    let config = node_config();

    #[cfg(feature = "esp32")]
    {
        info!("Platform: ESP32");
        let (_wifi, transport) = match start_radio() {
            Ok(radio) => radio,
            Err(e) => {
                error!("Radio start failed: {}", e);
                return;
            }
        };

        let _node = match Node::start(
            config,
            transport,
            Box::new(NeutralInput),
            Arc::new(LoggingMotor),
        ) {
            Ok(node) => node,
            Err(e) => {
                error!("Node start failed: {}", e);
                return;
            }
        };
        info!("Node up");

        // Runs until reset
        std::future::pending::<()>().await;
    }

    #[cfg(not(feature = "esp32"))]
    {
        use espnow_link_esp32::{LoopbackMedium, MacAddress};
        use std::time::Duration;

        const CONTROLLER_MAC: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        const CAR_MAC: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

        info!("Platform: Host (simulated controller and car)");
        let medium = LoopbackMedium::new();

        let controller = match Node::start(
            config.clone(),
            medium.attach(CONTROLLER_MAC),
            Box::new(SweepInput { step: 0 }),
            Arc::new(LoggingMotor),
        ) {
            Ok(node) => node,
            Err(e) => {
                error!("Controller start failed: {}", e);
                return;
            }
        };
        let car = match Node::start(
            config,
            medium.attach(CAR_MAC),
            Box::new(NeutralInput),
            Arc::new(LoggingMotor),
        ) {
            Ok(node) => node,
            Err(e) => {
                error!("Car start failed: {}", e);
                return;
            }
        };

        let mut report = tokio::time::interval(Duration::from_secs(10));
        report.tick().await;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down...");
                    break;
                }
                _ = report.tick() => {
                    let stats = car.endpoint().stats().snapshot();
                    info!(
                        "Roles: controller={} car={} | car rx: {} frames, {} messages, {} dropped",
                        controller.role(),
                        car.role(),
                        stats.frames_received,
                        stats.messages_completed,
                        stats.malformed + stats.resource_drops
                    );
                }
            }
        }

        controller.shutdown().await;
        car.shutdown().await;
    }
}
