pub mod handshake_tests;
pub mod in_process_tests;
pub mod registry_tests;
pub mod watchdog_tests;
