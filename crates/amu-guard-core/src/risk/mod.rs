//! Dose classification, residue projection, and the assessment pipeline
//! that turns a stored treatment into a sealed AMU risk record.

pub mod assessor;
pub mod classifier;
pub mod projector;

pub use assessor::{Assessment, RiskAssessor, RiskError, RiskResult};
pub use classifier::{classify_against, DoseClassifier};
pub use projector::{accumulation_factor, withdrawal_days, Projection, ResidueProjector, MODEL_VERSION};
