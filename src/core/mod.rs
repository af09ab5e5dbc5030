// Domain-layer modules and shared errors
pub mod attribution {
    pub use crate::attribution::*;
}

pub mod whatsapp_link {
    pub use crate::whatsapp_link::*;
}

pub mod tracking {
    pub use crate::tracking::*;
}

pub mod errors {
    pub use crate::errors::*;
}
