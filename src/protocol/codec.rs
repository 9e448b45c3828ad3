use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::{
    NetworkError,
    crypto::{Secret, StreamDecryptor, StreamEncryptor},
};

/// Maximum payload length of a packet in bytes
pub const MAX_PAYLOAD_LENGTH: usize = 64 * 1024;

/// Raw packet: identifier and payload bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u32,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

/// Packet framing codec
///
/// Frames are `u32 id · u32 length · payload`, big-endian. When a secret is
/// set every byte on the wire goes through the AES-256-CFB8 stream contexts;
/// framing is unchanged.
#[derive(Debug)]
pub struct PacketCodec {
    /// Underlying framing codec for the length-prefixed payload
    delegate: LengthDelimitedCodec,
    /// Identifier read ahead of a payload that is not complete yet
    pending_id: Option<u32>,
    encryptor: Option<StreamEncryptor>,
    decryptor: Option<StreamDecryptor>,
    /// Bytes at the front of the read buffer that are already decrypted
    decrypted: usize,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self {
            delegate: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_PAYLOAD_LENGTH)
                .new_codec(),
            pending_id: None,
            encryptor: None,
            decryptor: None,
            decrypted: 0,
        }
    }

    /// Codec encrypting both directions with `secret`
    pub fn encrypted(secret: &Secret) -> Self {
        Self {
            encryptor: Some(secret.encryptor()),
            decryptor: Some(secret.decryptor()),
            ..Self::new()
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryptor.is_some()
    }

    fn decode_frame(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, NetworkError> {
        // Packet id first
        let id = match self.pending_id {
            Some(id) => id,
            None => {
                if src.len() < 4 {
                    return Ok(None);
                }
                let id = src.get_u32();
                self.pending_id = Some(id);
                id
            }
        };

        // Then the length-prefixed payload
        match self.delegate.decode(src)? {
            Some(payload) => {
                self.pending_id = None;
                Ok(Some(Packet::new(id, payload.freeze())))
            }
            None => Ok(None),
        }
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Decrypt the bytes that arrived since the last call
        if let Some(decryptor) = self.decryptor.as_mut() {
            decryptor.apply(&mut src[self.decrypted..]);
            self.decrypted = src.len();
        }

        let before = src.len();
        let packet = self.decode_frame(src)?;
        self.decrypted = self.decrypted.saturating_sub(before - src.len());

        Ok(packet)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = NetworkError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if packet.payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(NetworkError::FrameTooLarge(packet.payload.len()));
        }

        let start = dst.len();
        dst.put_u32(packet.id);
        self.delegate.encode(packet.payload, dst)?;

        if let Some(encryptor) = self.encryptor.as_mut() {
            encryptor.apply(&mut dst[start..]);
        }

        Ok(())
    }
}
