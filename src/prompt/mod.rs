pub mod classifier;
pub mod style;

pub use classifier::{classify, PathClassifier, PromptPair};
pub use style::{all_presets, Phrasing, PresetInfo, SamplerSettings, Style};
