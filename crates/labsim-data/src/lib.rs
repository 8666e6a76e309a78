//! Data-driven lab definitions: load a bench from RON, TOML, or JSON.

pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, build_lab, load_lab, load_lab_dir, load_lab_file};
pub use schema::LabData;
