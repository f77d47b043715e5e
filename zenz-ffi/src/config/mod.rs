pub mod settings;

pub use settings::{GenerationSettings, ModelSettings, RuntimeSettings, Settings};
