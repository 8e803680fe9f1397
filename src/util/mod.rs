//! Internal utilities.

pub(crate) mod arena;
