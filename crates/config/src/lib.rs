// Configuration loading

pub mod settings;

pub use settings::{AppSettings, DatabaseSettings, Settings, SettingsError, SettingsSource};
