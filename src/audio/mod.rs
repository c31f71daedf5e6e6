pub mod decode;
pub mod playback;
pub mod source;
