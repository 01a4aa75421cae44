//! Type definitions

pub mod extraction;
pub mod run;
pub mod shipment;
pub mod stop;
pub mod vehicle;

pub use extraction::*;
pub use run::*;
pub use shipment::*;
pub use stop::*;
pub use vehicle::*;
