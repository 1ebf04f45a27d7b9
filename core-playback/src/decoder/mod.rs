//! # Chunk Decoder
//!
//! [`ChunkDecoder`](bridge_traits::ChunkDecoder) implementation backed by the
//! Symphonia pure-Rust audio library.
//!
//! Each chunk is decoded in full into interleaved `f32` samples. Container and
//! codec are detected by probing, optionally helped by a file extension hint.
//!
//! | Format | Codec |
//! |--------|-------|
//! | MP3 | MPEG-1/2 Audio Layer III |
//! | FLAC | Free Lossless Audio Codec |
//! | Vorbis | Ogg Vorbis |
//! | AAC | Advanced Audio Coding (ADTS, MP4) |
//! | WAV | PCM |
//! | ALAC | Apple Lossless |
//!
//! ## Threading Model
//!
//! Decoding is CPU bound and runs on Tokio's blocking pool so the scheduler
//! and fetch tasks are never starved.

mod symphonia;

pub use self::symphonia::SymphoniaChunkDecoder;
