mod classifier;
mod ensemble;

pub use classifier::{Backend, BurnClassifier};
pub use ensemble::{
	default_backbones, BackboneConfig, CottonEnsemble, CottonEnsembleConfig, InputScaling, LayerId,
};
