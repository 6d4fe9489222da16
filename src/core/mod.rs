pub mod audio_cache;
pub mod generation;
pub mod history;
pub mod idempotency;
pub mod pipeline;
pub mod registry;
pub mod storage;
pub mod stt;
pub mod telephony;
pub mod tts;
pub mod twiml;
