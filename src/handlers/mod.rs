pub mod api;
pub mod audio;
pub mod callback;
pub mod respond;
pub mod status;
pub mod voice;
