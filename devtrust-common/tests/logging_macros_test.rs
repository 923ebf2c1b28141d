//! The logging macros must compile against any expression that yields a
//! Logger, including Arc-wrapped loggers held by the managers.

use devtrust_common::logging::{Component, Logger};
use devtrust_common::{log_debug, log_error, log_info, log_warn};
use std::sync::Arc;

#[test]
fn test_macros_accept_plain_and_shared_loggers() {
    let logger = Logger::new_root(Component::Identity, "dev-001");
    let shared = Arc::new(logger.with_component(Component::Store));

    let status = "activated";
    log_debug!(logger, "status={status}");
    log_info!(shared, "stored {} bytes", 42);
    log_warn!(&shared, "fallback for {}", "net-config");
    log_error!(logger, "failed: {}", "no key");

    assert_eq!(shared.prefix(), "Identity.Store");
}
