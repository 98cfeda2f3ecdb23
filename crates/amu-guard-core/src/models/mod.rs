//! Domain models for the AMU risk and sample-compliance pipeline.

mod alert;
mod farm;
mod feed;
mod reference;
mod risk;
mod sample;
mod treatment;

pub use alert::*;
pub use farm::*;
pub use feed::*;
pub use reference::*;
pub use risk::*;
pub use sample::*;
pub use treatment::*;
