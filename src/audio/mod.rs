// Audio processing module
// Handles format conversion and WAV verification

pub mod convert;
pub mod wav;

pub use convert::{convert, ConvertError, Ffmpeg, Transcoder};
pub use wav::{ensure_pcm_s16, probe_wav, WavError, WavInfo};
