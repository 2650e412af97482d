// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::{decode_inbound, AgentMessage, CommandEnvelope, EnvelopeError};

#[test]
fn assign_proxy_wire_shape() -> anyhow::Result<()> {
    let cmd = CommandEnvelope::AssignProxy {
        request_id: "r1".to_owned(),
        filters: json!({ "region": "EU" }),
    };
    let parsed: serde_json::Value = serde_json::from_str(&cmd.encode()?)?;
    assert_eq!(parsed["type"], "assign_proxy");
    assert_eq!(parsed["filters"], json!({ "region": "EU" }));
    assert_eq!(parsed["request_id"], "r1");
    assert_eq!(cmd.request_id(), "r1");
    Ok(())
}

#[test]
fn assign_result_with_payload() -> anyhow::Result<()> {
    let msg = decode_inbound(
        r#"{"type":"assign_result","request_id":"r1","payload":{"proxy":"10.0.0.1:8080"}}"#,
    )?;
    assert_eq!(
        msg,
        AgentMessage::AssignResult {
            request_id: Some("r1".to_owned()),
            payload: json!({ "proxy": "10.0.0.1:8080" }),
        }
    );
    Ok(())
}

#[test]
fn assign_result_top_level_fields_become_payload() -> anyhow::Result<()> {
    let msg = decode_inbound(r#"{"type":"assign_result","ok":true,"ip":"1.2.3.4"}"#)?;
    assert_eq!(
        msg,
        AgentMessage::AssignResult { request_id: None, payload: json!({ "ok": true, "ip": "1.2.3.4" }) }
    );
    Ok(())
}

#[test]
fn numeric_request_id_is_stringified() -> anyhow::Result<()> {
    let msg = decode_inbound(r#"{"type":"assign_result","request_id":7,"payload":null}"#)?;
    assert!(matches!(msg, AgentMessage::AssignResult { request_id: Some(ref id), .. } if id == "7"));
    Ok(())
}

#[test]
fn unknown_type_is_other() -> anyhow::Result<()> {
    let msg = decode_inbound(r#"{"type":"hello","version":2}"#)?;
    assert_eq!(msg, AgentMessage::Other { kind: "hello".to_owned() });
    Ok(())
}

#[yare::parameterized(
    not_json = { "definitely not json" },
    array = { "[1,2,3]" },
    no_type = { r#"{"payload":{}}"# },
    numeric_type = { r#"{"type":5}"# },
)]
fn malformed_is_error(text: &str) {
    assert!(decode_inbound(text).is_err());
}

#[test]
fn missing_type_error_kind() {
    assert!(matches!(decode_inbound(r#"{"payload":1}"#), Err(EnvelopeError::MissingType)));
}
