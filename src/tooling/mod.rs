pub mod logging;

use crate::registry::Registry;

pub use logging::{log_event, register_logging, KERNEL_HELPER_ID, LOG_CONTRACT_ID};

pub fn register_tooling(registry: &Registry) {
    register_logging(registry);
}
