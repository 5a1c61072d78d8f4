pub mod lifecycle;
pub mod model;
pub mod store;
pub mod validate;

#[cfg(any(test, feature = "testing"))]
pub mod memory;
