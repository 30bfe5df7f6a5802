use tldr_docs::setup_logging;

#[test]
fn test_logging_setup() {
    // This test verifies that the logging setup function doesn't panic
    let result = std::panic::catch_unwind(|| {
        setup_logging();
    });

    assert!(result.is_ok(), "setup_logging function should not panic");
}

#[test]
fn test_logging_setup_is_idempotent() {
    setup_logging();
    let result = std::panic::catch_unwind(setup_logging);
    assert!(result.is_ok(), "a second setup_logging call should be harmless");
}
