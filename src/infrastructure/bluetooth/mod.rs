//! Bluetooth Module
//!
//! Receives page-turn advertisements from the wearable.
//!
//! ## Architecture
//!
//! ```text
//!  ┌───────────────────────┐  power events
//!  │ ScanLifecycleController│◄──────────────
//!  └──────────┬────────────┘
//!             │ start / stop
//!             ▼
//!  ┌───────────────────────┐  frames (bounded mpsc)  ┌─────────────────────┐
//!  │ AdvertisementRadio    │────────────────────────►│ AdvertisementPipeline│
//!  └───────────────────────┘                         └──────────┬──────────┘
//!                                                               │ parse → debounce
//!                                                               ▼
//!                                                         CommandRouter
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Frame model, opcode decoding and UUID parsing
//! - [`scanner`] - Radio and power abstractions, Windows watcher
//! - [`service`] - Scan lifecycle state machine
//! - [`pipeline`] - Frame consumer feeding the router

pub mod pipeline;
pub mod protocol;
pub mod scanner;
pub mod service;

pub use pipeline::AdvertisementPipeline;
pub use service::ScanLifecycleController;
