// Domain-layer modules and shared errors/models
pub mod models {
    pub use crate::models::*;
}

pub mod validation {
    pub use crate::validation::*;
}

pub mod dashboard {
    pub use crate::dashboard::*;
}

pub mod errors {
    pub use crate::errors::*;
}
