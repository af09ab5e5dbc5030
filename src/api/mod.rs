// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod redirect_handler {
    pub use crate::redirect_handler::*;
}

pub mod crm_webhook_handler {
    pub use crate::crm_webhook_handler::*;
}

pub mod whatsapp_webhook_handler {
    pub use crate::whatsapp_webhook_handler::*;
}

pub mod routes {
    pub use crate::routes::*;
}
