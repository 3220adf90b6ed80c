use proof_of_device::config::{ConcurrencyPolicy, RelayConfig, ReplyTarget};
use proof_of_device::protocol::{js_string, NativeReply, PageMessage, RequestKind, RuntimeRequest};
use proof_of_device::RelayError;
use serde_json::{json, Value};

#[test]
fn defaults_match_demo_deployment() {
    let cfg = RelayConfig::default();
    assert_eq!(cfg.origin, "http://localhost:3000");
    assert_eq!(cfg.host, "POD_EXT");
    assert_eq!(cfg.remote, "POD_BROWSER");
    assert_eq!(cfg.token(RequestKind::Register), "get_quote");
    assert_eq!(cfg.token(RequestKind::Challenge), "sign_challenge");
    assert_eq!(cfg.policy, ConcurrencyPolicy::Serialize);
    assert_eq!(cfg.reply_origin(), "http://localhost:3000");
    assert_eq!(cfg.reply_timeout(), Some(std::time::Duration::from_secs(30)));
}

#[test]
fn zero_reply_timeout_waits_forever() {
    let cfg = RelayConfig::from_toml_str("reply_timeout_ms = 0").unwrap();
    assert_eq!(cfg.reply_timeout(), None);
    let cfg = RelayConfig::from_toml_str("reply_timeout_ms = 250").unwrap();
    assert_eq!(cfg.reply_timeout(), Some(std::time::Duration::from_millis(250)));
}

#[test]
fn toml_overrides_and_wildcard_reply() {
    let cfg = RelayConfig::from_toml_str(
        r#"
        origin = "https://pod.example.com"
        register = "REGISTER"
        reply_target = "wildcard"
        "#,
    )
    .unwrap();
    assert_eq!(cfg.origin, "https://pod.example.com");
    assert_eq!(cfg.kind_for_token("REGISTER"), Some(RequestKind::Register));
    assert_eq!(cfg.kind_for_token("get_quote"), None);
    assert_eq!(cfg.reply_target, ReplyTarget::Wildcard);
    assert_eq!(cfg.reply_origin(), "*");
}

#[test]
fn load_reads_file() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("relay.toml");
    std::fs::write(&path, "spid = \"FEED\"\n").unwrap();
    assert_eq!(RelayConfig::load(&path).unwrap().spid, "FEED");
}

#[test]
fn bad_toml_is_config_error() {
    let err = RelayConfig::from_toml_str("policy = \"yolo\"").unwrap_err();
    assert!(matches!(err, RelayError::Config(_)));
}

#[test]
fn tokens_are_case_sensitive() {
    let cfg = RelayConfig::default();
    assert_eq!(cfg.kind_for_token("Get_Quote"), None);
    assert_eq!(cfg.kind_for_token("sign_challenge"), Some(RequestKind::Challenge));
}

#[test]
fn native_messages_per_kind() {
    let cfg = RelayConfig {
        spid: "SPID".into(),
        ..RelayConfig::default()
    };
    assert_eq!(
        RuntimeRequest::Register { data: None }.native_message(&cfg),
        json!({ "msg": "get_quote", "spid": "SPID" })
    );
    let challenge = RuntimeRequest::from_page(RequestKind::Challenge, Some(json!({ "value": 4 })));
    assert_eq!(
        challenge.native_message(&cfg),
        json!({ "msg": "sign_challenge", "challenge": { "value": 4 } })
    );
    // Missing page data: the field is left out entirely.
    assert_eq!(
        RuntimeRequest::Challenge { challenge: None }.native_message(&cfg),
        json!({ "msg": "sign_challenge" })
    );
    // Registration keeps the page data on the runtime bus but never sends it on.
    let register = RuntimeRequest::from_page(RequestKind::Register, Some(json!(1)));
    assert_eq!(register, RuntimeRequest::Register { data: Some(json!(1)) });
    assert_eq!(
        register.native_message(&cfg),
        json!({ "msg": "get_quote", "spid": "SPID" })
    );
}

#[test]
fn native_reply_parsing() {
    let cfg = RelayConfig::default();

    let ok = NativeReply::parse(&json!({ "msg": "get_quote", "quote": "Q" }), &cfg).unwrap();
    assert_eq!(ok.kind, RequestKind::Register);
    assert_eq!(ok.outcome.unwrap(), json!("Q"));

    let host_err = NativeReply::parse(&json!({ "msg": "sign_challenge", "error": "no key" }), &cfg).unwrap();
    assert!(matches!(host_err.outcome, Err(RelayError::NativeHost(m)) if m == "no key"));

    let missing = NativeReply::parse(&json!({ "msg": "sign_challenge", "quote": "Q" }), &cfg).unwrap();
    assert!(matches!(missing.outcome, Err(RelayError::UnexpectedReply(_))));

    assert!(NativeReply::parse(&json!({ "msg": "other" }), &cfg).is_err());
    assert!(NativeReply::parse(&json!("get_quote"), &cfg).is_err());
}

#[test]
fn page_message_wire_shape() {
    let msg: PageMessage =
        serde_json::from_value(json!({ "host": "POD_BROWSER", "type": "sign_challenge", "data": { "value": 4 } }))
            .unwrap();
    assert_eq!(msg.kind.as_deref(), Some("sign_challenge"));
    assert_eq!(msg.data, Some(json!({ "value": 4 })));

    let bare = PageMessage {
        host: "POD_BROWSER".into(),
        ..PageMessage::default()
    };
    assert_eq!(serde_json::to_value(bare).unwrap(), json!({ "host": "POD_BROWSER" }));
}

#[test]
fn js_string_matches_string_coercion() {
    assert_eq!(js_string(&json!("QUOTE==")), "QUOTE==");
    assert_eq!(js_string(&json!(4)), "4");
    assert_eq!(js_string(&json!(true)), "true");
    assert_eq!(js_string(&Value::Null), "null");
    assert_eq!(js_string(&json!([1, [2, 3], null])), "1,2,3,");
    assert_eq!(js_string(&json!({ "signed": "x" })), "[object Object]");
}

#[test]
fn js_string_formats_floats_like_javascript() {
    assert_eq!(js_string(&json!(1.0)), "1");
    assert_eq!(js_string(&json!(-0.0)), "0");
    assert_eq!(js_string(&json!(2.5)), "2.5");
    assert_eq!(js_string(&json!(0.1)), "0.1");
    assert_eq!(js_string(&json!(1e21)), "1e+21");
    assert_eq!(js_string(&json!(1.5e-7)), "1.5e-7");
    assert_eq!(js_string(&json!(123456789012.0)), "123456789012");
    assert_eq!(js_string(&json!([1.0, 2.5])), "1,2.5");
}
