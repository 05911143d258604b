// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod auth_handlers {
    pub use crate::auth_handlers::*;
}

pub mod openapi {
    pub use crate::openapi::*;
}
