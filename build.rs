fn main() {
    println!("cargo:rerun-if-env-changed=SENSORHUB_LOCATION");
    println!("cargo:rerun-if-env-changed=SENSORHUB_BATTERY_POWERED");

    // ESP-IDF link arguments are only needed for device builds.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
