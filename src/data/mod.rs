//! Storage backends and the dispatch in front of them.

pub mod store {
    pub use crate::store::*;
}

pub mod memory_store {
    pub use crate::memory_store::*;
}

pub mod pg_store {
    pub use crate::pg_store::*;
}
