fn main() {
    // The ESP32 firmware bakes the discovery token in with option_env!
    println!("cargo:rerun-if-env-changed=ESPNOW_LINK_TOKEN");

    // ESP-IDF sysenv is only needed for the Xtensa firmware build; host
    // builds and tests skip it.
    let target = std::env::var("TARGET").unwrap_or_default();
    if target.contains("xtensa") {
        embuild::espidf::sysenv::output();
    }
}
