#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod diagnosis;
pub mod error;
pub mod http;
pub mod spec;
pub mod tensor;

pub use diagnosis::{top_class, ClassNameTable, DiagnosisRecord, Severity};
pub use error::{Error, Result};
pub use spec::{LayerTrace, TargetClass, TrainedModel};
pub use tensor::ImageTensor;
