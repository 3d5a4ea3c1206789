pub mod edviron;

pub use edviron::{EdvironConfig, EdvironGateway};
