pub mod audio;
pub mod conditioners;
pub mod config;
pub mod delay;
pub mod device;
pub mod generator;
pub mod models;
pub mod modules;
pub mod musicgen_model;
pub mod sampling;
pub mod state;
pub mod weights;

pub use config::{GenerationParams, defaults};
pub use generator::{MusicGenerator, generate_to_file};
pub use musicgen_model::MusicGenModel;
pub use state::ModelState;
