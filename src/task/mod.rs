pub mod broker;
pub mod network;
pub mod resources;
pub mod wristband;
