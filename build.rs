fn main() {
    // ESP-IDF sysenv propagation is only needed for the firmware binary;
    // host-target test builds skip it entirely.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
