//! Configuration and settings management.
//!
//! Settings are stored in the user's config directory as JSON and loaded once
//! per run into an immutable [`Settings`] value.

mod settings;

pub use settings::{
    ClassifierMode, ClassifierSettings, ConfigError, DriverSettings, FilterSettings,
    InferenceSettings, LabelSettings, ScanSettings, Settings,
};
