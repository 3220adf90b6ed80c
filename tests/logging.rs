use proof_of_device::logging;

#[test]
fn init_installs_once() {
    assert!(logging::init("proof_of_device=debug"));
    // A second subscriber is refused rather than replacing the first.
    assert!(!logging::init("info"));
    tracing::debug!("logging to stderr");
}
