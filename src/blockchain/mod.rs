pub mod model;
pub mod parameters;

pub use model::Blockchain;
pub use parameters::{BlockchainParameters, ParametersError, RemoteParameters};
