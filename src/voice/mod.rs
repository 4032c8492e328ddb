pub mod autovoice;
pub mod events;

pub use autovoice::{AutoVoiceManager, ChannelOwnership};
pub use events::{VoiceEventRouter, VoiceUpdate};
