pub mod entity;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod registry;
pub mod wire;
