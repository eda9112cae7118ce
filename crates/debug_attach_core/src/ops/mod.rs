pub mod env_port;
pub mod locate;
pub mod port;
pub mod probe;
