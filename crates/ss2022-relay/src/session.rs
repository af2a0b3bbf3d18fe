//! The per-connection decoder: a tagged-union state machine that parses
//! the salted, AEAD-encrypted request stream directly out of a receive
//! buffer, turning raw bytes into relay actions one frame at a time.

use bytes::{Buf, Bytes, BytesMut};

use ss2022_crypto::{derive_subkey, CipherKind, Decryptor, Encryptor};
use ss2022_protocol::{
    Address, FixedRequestHeader, VariableRequestHeader, FIXED_REQUEST_HEADER_LEN,
};

use crate::error::SessionError;
use crate::salt_cache::SaltCache;

/// Accepted clock skew on the request timestamp, checked in both
/// directions so neither a stale nor a future-dated request passes.
const TIMESTAMP_SKEW_SECS: u64 = 30;
/// Frames larger than this cannot be represented by the `u16` length
/// prefix; the relay engine chunks oversized reads instead of rejecting
/// them.
pub const MAX_FRAME_LEN: usize = 0xFFFF;

#[derive(Debug)]
enum DecoderState {
    WaitForFixed,
    WaitForVariable { length: usize },
    WaitForLength,
    WaitForPayload { length: usize },
}

/// One decoded action the relay engine must perform. Emitted by
/// [`ClientSession::advance`] as the buffer yields complete frames.
pub enum SessionEvent {
    /// The variable header decoded cleanly; dial `address:port` and, once
    /// connected, write `initial_payload` to the remote before entering
    /// the main multiplex loop.
    Dial {
        address: Address,
        port: u16,
        initial_payload: Bytes,
    },
    /// A payload chunk decrypted from the client stream, ready to be
    /// written to the already-connected remote socket.
    ToRemote(Bytes),
}

/// Per-connection protocol state: receive buffer, both AEAD contexts, and
/// the current decoder state. Owned exclusively by one session task.
pub struct ClientSession {
    cipher: CipherKind,
    buffer: BytesMut,
    state: DecoderState,
    request_decryptor: Option<Decryptor>,
    response_salt: Vec<u8>,
    response_encryptor: Encryptor,
    pub sent_initial_response: bool,
}

impl ClientSession {
    pub fn new(cipher: CipherKind, psk: &[u8]) -> Result<Self, ss2022_crypto::CryptoError> {
        let response_salt = ss2022_crypto::random_salt(cipher)?;
        let response_subkey = derive_subkey(cipher, psk, &response_salt);
        Ok(Self {
            cipher,
            buffer: BytesMut::new(),
            state: DecoderState::WaitForFixed,
            request_decryptor: None,
            response_salt,
            response_encryptor: Encryptor::new(cipher, response_subkey),
            sent_initial_response: false,
        })
    }

    pub fn response_salt(&self) -> &[u8] {
        &self.response_salt
    }

    pub fn response_encryptor(&mut self) -> &mut Encryptor {
        &mut self.response_encryptor
    }

    /// Append freshly-read client bytes to the receive buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Drive the decoder as far forward as the buffered bytes allow,
    /// returning every [`SessionEvent`] produced along the way. Call
    /// again whenever more bytes are fed in.
    pub fn advance(
        &mut self,
        psk: &[u8],
        now_ms: i64,
        salt_cache: &SaltCache,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        let mut events = Vec::new();
        while self.buffer_admits_progress() {
            if let Some(event) = self.try_step(psk, now_ms, salt_cache)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn buffer_admits_progress(&self) -> bool {
        let tag = self.cipher.tag_length();
        let salt = self.cipher.salt_length();
        match &self.state {
            DecoderState::WaitForFixed => self.buffer.len() >= salt + FIXED_REQUEST_HEADER_LEN + tag,
            DecoderState::WaitForVariable { length } => self.buffer.len() >= length + tag,
            DecoderState::WaitForLength => self.buffer.len() >= 2 + tag,
            DecoderState::WaitForPayload { length } => self.buffer.len() >= length + tag,
        }
    }

    /// Perform exactly one state transition; the caller guarantees the
    /// buffer already admits it. Returns `None` when the transition
    /// produced no event of its own (wait_for_fixed, wait_for_length).
    fn try_step(
        &mut self,
        psk: &[u8],
        now_ms: i64,
        salt_cache: &SaltCache,
    ) -> Result<Option<SessionEvent>, SessionError> {
        match &self.state {
            DecoderState::WaitForFixed => {
                let salt_len = self.cipher.salt_length();
                let tag = self.cipher.tag_length();

                let request_salt = self.buffer[..salt_len].to_vec();

                salt_cache.evict_older_than(now_ms);
                if !salt_cache.try_add(&request_salt, now_ms) {
                    return Err(SessionError::DuplicateSalt);
                }

                let subkey = derive_subkey(self.cipher, psk, &request_salt);
                let mut decryptor = Decryptor::new(self.cipher, subkey);

                let sealed = &self.buffer[salt_len..salt_len + FIXED_REQUEST_HEADER_LEN + tag];
                let plaintext = decryptor.open(sealed)?;
                let header = FixedRequestHeader::decode(&plaintext)?;

                let now_secs = (now_ms / 1000) as u64;
                let too_old = now_secs > header.timestamp + TIMESTAMP_SKEW_SECS;
                let too_new = header.timestamp > now_secs + TIMESTAMP_SKEW_SECS;
                if too_old || too_new {
                    return Err(SessionError::TimestampTooOld);
                }

                self.buffer.advance(salt_len + FIXED_REQUEST_HEADER_LEN + tag);
                self.request_decryptor = Some(decryptor);
                self.state = DecoderState::WaitForVariable {
                    length: header.length as usize,
                };
                Ok(None)
            }

            DecoderState::WaitForVariable { length } => {
                let length = *length;
                let tag = self.cipher.tag_length();
                let decryptor = self
                    .request_decryptor
                    .as_mut()
                    .expect("request_decryptor set in wait_for_fixed");

                let sealed = &self.buffer[..length + tag];
                let plaintext = decryptor.open(sealed)?;
                let header = VariableRequestHeader::decode(&plaintext)?;

                self.buffer.advance(length + tag);
                self.state = DecoderState::WaitForLength;

                Ok(Some(SessionEvent::Dial {
                    address: header.address,
                    port: header.port,
                    initial_payload: header.initial_payload,
                }))
            }

            DecoderState::WaitForLength => {
                let tag = self.cipher.tag_length();
                let decryptor = self
                    .request_decryptor
                    .as_mut()
                    .expect("request_decryptor set in wait_for_fixed");

                let sealed = &self.buffer[..2 + tag];
                let plaintext = decryptor.open(sealed)?;
                let length = ss2022_protocol::decode_chunk_length(&plaintext)? as usize;

                self.buffer.advance(2 + tag);
                self.state = DecoderState::WaitForPayload { length };
                Ok(None)
            }

            DecoderState::WaitForPayload { length } => {
                let length = *length;
                let tag = self.cipher.tag_length();
                let decryptor = self
                    .request_decryptor
                    .as_mut()
                    .expect("request_decryptor set in wait_for_fixed");

                let sealed = &self.buffer[..length + tag];
                let plaintext = decryptor.open(sealed)?;

                self.buffer.advance(length + tag);
                self.state = DecoderState::WaitForLength;
                Ok(Some(SessionEvent::ToRemote(Bytes::from(plaintext))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ss2022_crypto::random_salt;
    use std::net::Ipv4Addr;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64
    }

    fn build_request(
        cipher: CipherKind,
        psk: &[u8],
        timestamp: u64,
        initial_payload: &[u8],
    ) -> (Vec<u8>, Vec<u8>) {
        let request_salt = random_salt(cipher).unwrap();
        let subkey = derive_subkey(cipher, psk, &request_salt);
        let mut encryptor = Encryptor::new(cipher, subkey);

        let variable = VariableRequestHeader {
            address: Address::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 9000,
            padding_length: 0,
            initial_payload: Bytes::copy_from_slice(initial_payload),
        };
        let variable_plaintext = variable.encode();

        let fixed = FixedRequestHeader {
            timestamp,
            length: variable_plaintext.len() as u16,
        };

        let sealed_fixed = encryptor.seal(&fixed.encode());
        let sealed_variable = encryptor.seal(&variable_plaintext);

        let mut wire = Vec::new();
        wire.extend_from_slice(&request_salt);
        wire.extend_from_slice(&sealed_fixed);
        wire.extend_from_slice(&sealed_variable);
        (wire, request_salt)
    }

    #[test]
    fn happy_path_emits_dial_event() {
        let cipher = CipherKind::Aes256Gcm;
        let psk = vec![0u8; 32];
        let cache = SaltCache::new();
        let (wire, _salt) = build_request(cipher, &psk, (now_ms() / 1000) as u64, b"GET / HTTP/1.0\r\n\r\n");

        let mut session = ClientSession::new(cipher, &psk).unwrap();
        session.feed(&wire);
        let events = session.advance(&psk, now_ms(), &cache).unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::Dial { address, port, initial_payload } => {
                assert_eq!(*address, Address::V4(Ipv4Addr::new(127, 0, 0, 1)));
                assert_eq!(*port, 9000);
                assert_eq!(&initial_payload[..], b"GET / HTTP/1.0\r\n\r\n");
            }
            _ => panic!("expected a Dial event"),
        }
    }

    #[test]
    fn duplicate_salt_is_rejected() {
        let cipher = CipherKind::Aes256Gcm;
        let psk = vec![0u8; 32];
        let cache = SaltCache::new();
        let (wire, _salt) = build_request(cipher, &psk, (now_ms() / 1000) as u64, b"x");

        let mut first = ClientSession::new(cipher, &psk).unwrap();
        first.feed(&wire);
        assert!(first.advance(&psk, now_ms(), &cache).is_ok());

        let mut second = ClientSession::new(cipher, &psk).unwrap();
        second.feed(&wire);
        assert!(matches!(
            second.advance(&psk, now_ms(), &cache),
            Err(SessionError::DuplicateSalt)
        ));
    }

    #[test]
    fn advance_evicts_the_salt_cache_before_inserting() {
        let cipher = CipherKind::Aes256Gcm;
        let psk = vec![0u8; 32];
        let cache = SaltCache::new();

        let (first_wire, _salt) = build_request(cipher, &psk, (now_ms() / 1000) as u64, b"x");
        let mut first = ClientSession::new(cipher, &psk).unwrap();
        first.feed(&first_wire);
        assert!(first.advance(&psk, 0, &cache).is_ok());
        assert_eq!(cache.len(), 1);

        let (second_wire, _salt) = build_request(cipher, &psk, (now_ms() / 1000) as u64, b"y");
        let mut second = ClientSession::new(cipher, &psk).unwrap();
        second.feed(&second_wire);
        assert!(second.advance(&psk, crate::salt_cache::WINDOW_MS + 1, &cache).is_ok());
        assert_eq!(cache.len(), 1, "the first salt should have been evicted, not accumulated");
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let cipher = CipherKind::Aes256Gcm;
        let psk = vec![0u8; 32];
        let cache = SaltCache::new();
        let stale = (now_ms() / 1000) as u64 - 31;
        let (wire, _salt) = build_request(cipher, &psk, stale, b"x");

        let mut session = ClientSession::new(cipher, &psk).unwrap();
        session.feed(&wire);
        assert!(matches!(
            session.advance(&psk, now_ms(), &cache),
            Err(SessionError::TimestampTooOld)
        ));
    }

    #[test]
    fn future_timestamp_is_also_rejected() {
        let cipher = CipherKind::Aes256Gcm;
        let psk = vec![0u8; 32];
        let cache = SaltCache::new();
        let future = (now_ms() / 1000) as u64 + 31;
        let (wire, _salt) = build_request(cipher, &psk, future, b"x");

        let mut session = ClientSession::new(cipher, &psk).unwrap();
        session.feed(&wire);
        assert!(matches!(
            session.advance(&psk, now_ms(), &cache),
            Err(SessionError::TimestampTooOld)
        ));
    }

    #[test]
    fn tampered_fixed_header_fails_auth() {
        let cipher = CipherKind::Aes256Gcm;
        let psk = vec![0u8; 32];
        let cache = SaltCache::new();
        let (mut wire, _salt) = build_request(cipher, &psk, (now_ms() / 1000) as u64, b"x");

        let salt_len = cipher.salt_length();
        wire[salt_len] ^= 0xFF;

        let mut session = ClientSession::new(cipher, &psk).unwrap();
        session.feed(&wire);
        assert!(matches!(
            session.advance(&psk, now_ms(), &cache),
            Err(SessionError::AuthFailed)
        ));
    }

    #[test]
    fn empty_body_without_padding_is_rejected() {
        let cipher = CipherKind::Aes256Gcm;
        let psk = vec![0u8; 32];
        let cache = SaltCache::new();
        let (wire, _salt) = build_request(cipher, &psk, (now_ms() / 1000) as u64, b"");

        let mut session = ClientSession::new(cipher, &psk).unwrap();
        session.feed(&wire);
        assert!(matches!(
            session.advance(&psk, now_ms(), &cache),
            Err(SessionError::NoInitialPayloadOrPadding)
        ));
    }
}
