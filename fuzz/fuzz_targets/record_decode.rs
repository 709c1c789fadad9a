//! Fuzz target for event record decoding
//!
//! # Strategy
//!
//! - Random bytes: arbitrary data handed straight to the decoder
//! - Huge lengths: CBOR claiming massive string lengths for known fields
//! - Deeply nested: arrays nested to arbitrary depth
//! - Field soup: maps built from the record's field names with arbitrary
//!   values, including wrong types and the `NOTSET` sentinel
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - Oversized input is rejected before parsing
//! - Anything that decodes into a payload re-encodes into a record that
//!   decodes into the same payload

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use murmur_proto::{EventRecord, MAX_RECORD_SIZE, Payload};

#[derive(Debug, Clone, Arbitrary)]
enum Input {
    RandomBytes { bytes: Vec<u8> },
    HugeLength { field: Field, claimed_len_exponent: u8 },
    DeeplyNested { depth: u8 },
    FieldSoup { fields: Vec<(Field, Value)> },
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Field {
    SenderId,
    SenderName,
    Text,
    PhotoUrl,
}

#[derive(Debug, Clone, Arbitrary)]
enum Value {
    Text(String),
    NotSet,
    Empty,
    Integer(u8),
    Null,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Self::SenderId => "senderId",
            Self::SenderName => "senderName",
            Self::Text => "text",
            Self::PhotoUrl => "photoURL",
        }
    }
}

fuzz_target!(|input: Input| {
    let bytes = match input {
        Input::RandomBytes { bytes } => bytes,
        Input::HugeLength { field, claimed_len_exponent } => {
            let exponent = u32::from(claimed_len_exponent % 33);
            let claimed = if exponent < 32 { 1u64 << exponent } else { u64::from(u32::MAX) };
            let mut bytes = vec![0xA1];
            push_text(&mut bytes, field.name());
            // Text string header with a 4-byte length and no body.
            bytes.push(0x7A);
            bytes.extend_from_slice(&(claimed as u32).to_be_bytes());
            bytes
        },
        Input::DeeplyNested { depth } => {
            let mut bytes = vec![0x81; usize::from(depth)];
            bytes.push(0x01);
            bytes
        },
        Input::FieldSoup { fields } => {
            let count = fields.len().min(23);
            let mut bytes = vec![0xA0 | count as u8];
            for (field, value) in fields.into_iter().take(count) {
                push_text(&mut bytes, field.name());
                match value {
                    Value::Text(text) => push_text(&mut bytes, &text),
                    Value::NotSet => push_text(&mut bytes, "NOTSET"),
                    Value::Empty => push_text(&mut bytes, ""),
                    Value::Integer(n) => bytes.push(n % 24),
                    Value::Null => bytes.push(0xF6),
                }
            }
            bytes
        },
    };

    let decoded = EventRecord::decode(&bytes);
    if bytes.len() > MAX_RECORD_SIZE {
        assert!(decoded.is_err(), "oversized record decoded");
    }

    if let Ok(payload) = Payload::from_bytes(&bytes) {
        let encoded = payload.to_record().encode().expect("decoded payload re-encodes");
        let again = Payload::from_bytes(&encoded).expect("re-encoded payload decodes");
        assert_eq!(again, payload);
    }
});

fn push_text(bytes: &mut Vec<u8>, text: &str) {
    let len = text.len();
    if len < 24 {
        bytes.push(0x60 | len as u8);
    } else if len < 256 {
        bytes.push(0x78);
        bytes.push(len as u8);
    } else {
        bytes.push(0x79);
        bytes.extend_from_slice(&(len.min(u16::MAX as usize) as u16).to_be_bytes());
    }
    bytes.extend_from_slice(&text.as_bytes()[..len.min(u16::MAX as usize)]);
}
