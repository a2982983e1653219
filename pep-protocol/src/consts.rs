//! Constants of the PEP wire protocol.

/// Seed for the xxhash32 checksum that turns a message name into its magic.
pub const MAGIC_SEED: u32 = 0xcafe_babe;

/// Size of the magic prefix of every packed message.
pub const MAGIC_SIZE: usize = 4;

/// Size of the frame header: two big-endian `u32`s.
pub const FRAME_HEADER_SIZE: usize = 8;

/// RESPONSE flag: clear for requests, set for responses.
pub const FLAG_RESPONSE: u32 = 0x8000_0000;

/// CLOSE flag: marks the last frame of a stream.
pub const FLAG_CLOSE: u32 = 0x4000_0000;

/// ERROR flag: the payload is an error envelope.
pub const FLAG_ERROR: u32 = 0x2000_0000;

/// PAYLOAD flag: the payload bytes are meaningful.
pub const FLAG_PAYLOAD: u32 = 0x1000_0000;

/// Mask of the 28-bit stream id.
pub const STREAM_ID_MASK: u32 = 0x0fff_ffff;

/// Stream id 0 is reserved for keep-alive frames.
pub const KEEP_ALIVE_STREAM_ID: u32 = 0;

/// Timeout on the TCP dial of a connection attempt.
pub const DIAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Single octet bumped on breaking wire changes (cycles 0..255).
pub const MANUAL_PROTOCOL_CHECKSUM_COMPONENT: u8 = 0x02;

/// Checksum over the message schema this crate was built against.
pub const MESSAGES_PROTO_CHECKSUM: &str = "9b16f5c1d8a0473e62bd94fa5c07218ee3ab6d40";

/// Length of the protocol checksum reported in a `VersionResponse`.
pub const PROTOCOL_CHECKSUM_LEN: usize = 20;
