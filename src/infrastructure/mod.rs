pub mod bluetooth;
pub mod control;
pub mod control_client;
pub mod http_server;
pub mod input_simulator;
pub mod logging;
