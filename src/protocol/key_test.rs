use super::*;

#[test]
fn test_key_string_without_tenant() {
    let key = ConfigKey::new("app.properties", "DEFAULT_GROUP");
    assert_eq!(key.to_key_string(), "app.properties+DEFAULT_GROUP");
    assert!(!key.has_tenant());
}

#[test]
fn test_key_string_with_tenant() {
    let key = ConfigKey::with_tenant("app.properties", "DEFAULT_GROUP", "public");
    assert_eq!(key.to_key_string(), "app.properties+DEFAULT_GROUP+public");
    assert!(key.has_tenant());
}

#[test]
fn test_parse_round_trip() {
    let key = ConfigKey::with_tenant("a", "g", "t");
    assert_eq!(ConfigKey::parse(&key.to_key_string()), Some(key));

    let key = ConfigKey::new("a", "g");
    assert_eq!(ConfigKey::parse(&key.to_key_string()), Some(key));
}

#[test]
fn test_parse_rejects_malformed() {
    assert_eq!(ConfigKey::parse("only-one-field"), None);
    assert_eq!(ConfigKey::parse("a+b+c+d"), None);
}
