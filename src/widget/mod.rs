//! Client side of the chat panel: transcript state and reply delivery.

pub mod controller;
pub mod delivery;
pub mod models;

pub use controller::{ChatState, Submitted, TranscriptController};
pub use delivery::{DeliveryAdapter, DeliveryError, HttpResponseSource, ResponseSource};
pub use models::{Message, Role};
