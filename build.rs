//! Build script
//!
//! Forwards `DEAFNAV_*` settings from an optional `.env` file into the compile-time
//! environment, and prepares the linker scripts when building the Pico 2 W firmware.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// Settings that may be overridden at build time
const FORWARDED_VARS: &[&str] = &[
    "DEAFNAV_WIFI_SSID",
    "DEAFNAV_WIFI_PASSWORD",
    "DEAFNAV_BROKER_HOST",
    "DEAFNAV_BROKER_PORT",
    "DEAFNAV_CLIENT_ID",
];

fn main() {
    let _ = dotenvy::from_path(".env");
    println!("cargo:rerun-if-changed=.env");

    for var in FORWARDED_VARS {
        println!("cargo:rerun-if-env-changed={var}");
        if let Ok(value) = env::var(var) {
            println!("cargo:rustc-env={var}={value}");
        }
    }

    if env::var_os("CARGO_FEATURE_FIRMWARE").is_none() {
        return;
    }

    let manifest_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap());
    let firmware_dir = env::var("CYW43_FIRMWARE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| manifest_dir.join("cyw43-firmware"));
    println!("cargo:rerun-if-env-changed=CYW43_FIRMWARE_DIR");
    println!("cargo:rustc-env=CYW43_FIRMWARE_DIR={}", firmware_dir.display());

    // Put memory.x where the linker finds it
    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(include_bytes!("memory.x"))
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
