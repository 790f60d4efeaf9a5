//! Built-in provider services.

pub mod birdeye;
pub mod jupiter;

pub use birdeye::BirdeyeService;
pub use jupiter::JupiterService;
