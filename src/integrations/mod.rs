//! Client-side integration with the CRM API.

pub mod client {
    pub use crate::client::*;
}

pub mod client_state {
    pub use crate::client_state::*;
}

pub mod token_store {
    pub use crate::token_store::*;
}
