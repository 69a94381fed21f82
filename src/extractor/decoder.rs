use std::{collections::HashMap, fmt::Debug};

use alloy::{
    dyn_abi::{DynSolValue, EventExt},
    json_abi::{Event, JsonAbi},
    primitives::{B256, Bytes},
};
use serde::Deserialize;
use thiserror::Error;

use crate::types::{FieldMap, FieldValue};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid ABI: {0}")]
    InvalidAbi(String),

    #[error("cannot decode {event}: {reason}")]
    Payload { event: String, reason: String },
}

/// Turns a raw log into named fields for events of one contract interface.
///
/// Both lookups are per record and non-fatal: an unresolved selector yields a minimal record, a
/// decode error drops the single log.
pub trait EventDecoder: Send + Sync + Debug {
    /// The event whose signature hash is `selector`, if the interface declares one.
    fn resolve_event(&self, selector: &B256) -> Option<&Event>;

    /// Signature hash of the event called `name`. Overloads resolve to the first declaration.
    fn event_selector(&self, name: &str) -> Option<B256>;

    /// Decodes indexed and body parameters into one field map.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Payload`] when topics or data do not match the event layout.
    fn decode(&self, event: &Event, topics: &[B256], data: &[u8]) -> Result<FieldMap, DecodeError>;
}

/// [`EventDecoder`] over a JSON contract ABI.
#[derive(Debug, Clone, Default)]
pub struct AbiDecoder {
    by_selector: HashMap<B256, Event>,
    by_name: HashMap<String, B256>,
}

/// Build artifacts (Hardhat, Foundry) wrap the ABI in an object.
#[derive(Deserialize)]
struct Artifact {
    abi: JsonAbi,
}

impl AbiDecoder {
    #[must_use]
    pub fn new(abi: &JsonAbi) -> Self {
        let mut decoder = Self::default();
        for event in abi.events() {
            let selector = event.selector();
            decoder.by_name.entry(event.name.clone()).or_insert(selector);
            decoder.by_selector.entry(selector).or_insert_with(|| event.clone());
        }
        decoder
    }

    /// Parses a plain ABI array or a build artifact with an `abi` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidAbi`] if the document is neither.
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        match serde_json::from_str::<JsonAbi>(json) {
            Ok(abi) => Ok(Self::new(&abi)),
            Err(err) => serde_json::from_str::<Artifact>(json)
                .map(|artifact| Self::new(&artifact.abi))
                .map_err(|_| DecodeError::InvalidAbi(err.to_string())),
        }
    }

    /// Number of distinct events the decoder can resolve.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.by_selector.len()
    }
}

impl EventDecoder for AbiDecoder {
    fn resolve_event(&self, selector: &B256) -> Option<&Event> {
        self.by_selector.get(selector)
    }

    fn event_selector(&self, name: &str) -> Option<B256> {
        self.by_name.get(name).copied()
    }

    fn decode(&self, event: &Event, topics: &[B256], data: &[u8]) -> Result<FieldMap, DecodeError> {
        let decoded = event.decode_log_parts(topics.iter().copied(), data).map_err(|err| {
            DecodeError::Payload { event: event.name.clone(), reason: err.to_string() }
        })?;

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        let mut fields = FieldMap::new();
        for (position, input) in event.inputs.iter().enumerate() {
            let value = if input.indexed { indexed.next() } else { body.next() };
            let Some(value) = value else {
                return Err(DecodeError::Payload {
                    event: event.name.clone(),
                    reason: format!("missing value for parameter {position}"),
                });
            };
            let name =
                if input.name.is_empty() { format!("arg{position}") } else { input.name.clone() };
            fields.insert(name, field_value(value));
        }
        Ok(fields)
    }
}

fn field_value(value: DynSolValue) -> FieldValue {
    match value {
        DynSolValue::Address(address) => address.into(),
        DynSolValue::Uint(value, _) => FieldValue::Uint(value),
        DynSolValue::Int(value, _) => FieldValue::Int(value),
        DynSolValue::Bool(value) => FieldValue::Bool(value),
        DynSolValue::FixedBytes(word, size) => {
            FieldValue::Bytes(Bytes::copy_from_slice(&word[..size.min(32)]))
        }
        DynSolValue::Bytes(bytes) => FieldValue::Bytes(bytes.into()),
        DynSolValue::String(value) => FieldValue::Str(value),
        DynSolValue::Function(function) => FieldValue::Bytes(Bytes::copy_from_slice(&function[..])),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            FieldValue::Str(format!("[{}]", render_all(items)))
        }
        DynSolValue::Tuple(items) => FieldValue::Str(format!("({})", render_all(items))),
        #[allow(unreachable_patterns)]
        other => FieldValue::Str(format!("{other:?}")),
    }
}

fn render_all(items: Vec<DynSolValue>) -> String {
    items.into_iter().map(|item| field_value(item).to_string()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ERC20_ABI, TRANSFER_TOPIC, address_topic};
    use alloy::primitives::{U256, address};

    #[test]
    fn resolves_events_by_selector_and_name() -> anyhow::Result<()> {
        let decoder = AbiDecoder::from_json(ERC20_ABI)?;

        assert_eq!(decoder.event_count(), 2);
        assert_eq!(decoder.event_selector("Transfer"), Some(TRANSFER_TOPIC));
        assert_eq!(decoder.resolve_event(&TRANSFER_TOPIC).map(|e| e.name.as_str()), Some("Transfer"));
        assert!(decoder.event_selector("Mint").is_none());
        Ok(())
    }

    #[test]
    fn decodes_indexed_and_body_parameters() -> anyhow::Result<()> {
        let decoder = AbiDecoder::from_json(ERC20_ABI)?;
        let event = decoder.resolve_event(&TRANSFER_TOPIC).cloned().unwrap();
        let from = address!("0x1000000000000000000000000000000000000001");
        let to = address!("0x2000000000000000000000000000000000000002");
        let topics = [TRANSFER_TOPIC, address_topic(from), address_topic(to)];
        let data = U256::from(1_000u64).to_be_bytes::<32>();

        let fields = decoder.decode(&event, &topics, &data)?;

        assert_eq!(fields.get("from"), Some(&FieldValue::from(from)));
        assert_eq!(fields.get("to"), Some(&FieldValue::from(to)));
        assert_eq!(fields.get("value"), Some(&FieldValue::Uint(U256::from(1_000u64))));
        Ok(())
    }

    #[test]
    fn short_payload_is_a_decode_error() -> anyhow::Result<()> {
        let decoder = AbiDecoder::from_json(ERC20_ABI)?;
        let event = decoder.resolve_event(&TRANSFER_TOPIC).cloned().unwrap();

        let err = decoder.decode(&event, &[TRANSFER_TOPIC], &[]).unwrap_err();

        assert!(matches!(err, DecodeError::Payload { .. }));
        Ok(())
    }

    #[test]
    fn unnamed_parameters_get_positional_names() -> anyhow::Result<()> {
        let abi = r#"[{"type":"event","name":"Ping","anonymous":false,"inputs":[
            {"name":"","type":"uint256","indexed":false},
            {"name":"flag","type":"bool","indexed":false}]}]"#;
        let decoder = AbiDecoder::from_json(abi)?;
        let selector = decoder.event_selector("Ping").unwrap();
        let event = decoder.resolve_event(&selector).cloned().unwrap();
        let mut data = U256::from(9u64).to_be_bytes::<32>().to_vec();
        data.extend_from_slice(&U256::from(1u64).to_be_bytes::<32>());

        let fields = decoder.decode(&event, &[selector], &data)?;

        assert_eq!(fields.get("arg0"), Some(&FieldValue::Uint(U256::from(9u64))));
        assert_eq!(fields.get("flag"), Some(&FieldValue::Bool(true)));
        Ok(())
    }

    #[test]
    fn accepts_build_artifacts() -> anyhow::Result<()> {
        let artifact = format!(r#"{{"contractName":"Token","abi":{ERC20_ABI}}}"#);
        let decoder = AbiDecoder::from_json(&artifact)?;
        assert_eq!(decoder.event_selector("Transfer"), Some(TRANSFER_TOPIC));
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(AbiDecoder::from_json("{not json"), Err(DecodeError::InvalidAbi(_))));
    }

    #[test]
    fn composite_values_render_inline() {
        let value = DynSolValue::Array(vec![
            DynSolValue::Uint(U256::from(1u64), 256),
            DynSolValue::Tuple(vec![DynSolValue::Bool(true), DynSolValue::String("x".into())]),
        ]);
        assert_eq!(field_value(value), FieldValue::Str("[1,(true,x)]".into()));
    }
}
