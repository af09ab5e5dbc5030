//! External service integrations.

pub mod conversion_forwarder {
    pub use crate::conversion_forwarder::*;
}

pub mod webhook_models {
    pub use crate::webhook_models::*;
}
