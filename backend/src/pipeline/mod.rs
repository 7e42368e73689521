pub mod acquire;
pub mod annotate;
pub mod engine;
pub mod font;
pub mod params;
pub mod processor;
