use funcscript::runtime::error;
use funcscript::runtime::vm::Vm;

fn to_json(source: &str) -> String {
    let mut vm = Vm::new();
    vm.eval_to_json(source)
        .unwrap_or_else(|err| panic!("eval failed for {:?}: {}", source, err))
}

#[test]
fn object_keys_render_in_insertion_order() {
    insta::assert_snapshot!(
        to_json(r#"{a: 1, b: [1, 2, 3]}"#),
        @r###"{"a":1,"b":[1,2,3]}"###
    );
}

#[test]
fn scalars_render_as_native_json() {
    assert_eq!(to_json("nil"), "null");
    assert_eq!(to_json("true"), "true");
    assert_eq!(to_json("42"), "42");
    assert_eq!(to_json("1.5"), "1.5");
    assert_eq!(to_json("1 + 2"), "3");
    assert_eq!(to_json("'hi'"), "\"hi\"");
}

#[test]
fn bigint_renders_as_decimal_string() {
    insta::assert_snapshot!(
        to_json("123456789012345678901234567890"),
        @r###""123456789012345678901234567890""###
    );
}

#[test]
fn bytes_render_as_base64() {
    assert_eq!(to_json("Bytes('AQID')"), "\"AQID\"");
}

#[test]
fn guid_renders_hyphenated() {
    assert_eq!(
        to_json("Guid('00000000-0000-0000-0000-000000000000')"),
        "\"00000000-0000-0000-0000-000000000000\""
    );
}

#[test]
fn datetime_renders_rfc3339_utc() {
    assert_eq!(
        to_json("DateTime('2020-01-01T12:30:00+02:00')"),
        "\"2020-01-01T10:30:00Z\""
    );
}

#[test]
fn range_renders_lazily() {
    insta::assert_snapshot!(
        to_json("Range(5, 1000000000)"),
        @r###"{"type":"range","start":5,"count":1000000000}"###
    );
}

#[test]
fn nested_structures_round_trip_through_serde() {
    let json = to_json(r#"{a: {b: [1, 'x', nil]}, c: 2.5}"#);
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["a"]["b"][0], 1);
    assert_eq!(parsed["a"]["b"][1], "x");
    assert!(parsed["a"]["b"][2].is_null());
    assert_eq!(parsed["c"], 2.5);
}

#[test]
fn functions_do_not_serialize() {
    let mut vm = Vm::new();
    let err = vm.eval_to_json("(x) => x").unwrap_err();
    assert_eq!(err.code, error::NOT_SERIALIZABLE.code);

    let err = vm.eval_to_json("Len").unwrap_err();
    assert_eq!(err.code, error::NOT_SERIALIZABLE.code);
}

#[test]
fn string_escapes_survive_rendering() {
    assert_eq!(to_json(r#"'a"b'"#), r#""a\"b""#);
    assert_eq!(to_json(r#"'line\nbreak'"#), r#""line\nbreak""#);
}

#[test]
fn envelope_convenience_shapes() {
    insta::assert_snapshot!(
        Vm::eval_json_envelope("{a: 1, b: [1, 2, 3]}"),
        @r###"{"ok":true,"value":{"a":1,"b":[1,2,3]},"error":null}"###
    );

    let failure = Vm::eval_json_envelope("1 +");
    let parsed: serde_json::Value = serde_json::from_str(&failure).unwrap();
    assert_eq!(parsed["ok"], false);
    assert!(parsed["value"].is_null());
    assert_eq!(parsed["error"]["code"], 1000);
}
