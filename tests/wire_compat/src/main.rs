fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use statewire_protocol::constants::{PING, PONG, SOCKET_COMMAND};
    use statewire_protocol::{Action, EventKey, InboundEvent, SocketCommand};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    #[test]
    fn socket_actions_keep_their_wire_shape() {
        for name in [
            "socket_connect.json",
            "socket_disconnect.json",
            "socket_closed.json",
            "socket_receive.json",
            "socket_reconnected.json",
        ] {
            let action: Action = roundtrip_test(name);
            assert!(action.as_socket().is_some(), "{name} must classify as a socket action");
            assert_eq!(load_fixture(name)["meta"], SOCKET_COMMAND);
        }
    }

    #[test]
    fn connect_fixture_fields() {
        let action: Action = roundtrip_test("socket_connect.json");
        assert_eq!(
            action.as_socket(),
            Some(&SocketCommand::Connect {
                socket_descriptor: "chat".into(),
                token: "eyJhbGciOiJIUzI1NiJ9.e30.sig".into(),
                uri: "/ws/chat/".into(),
            })
        );
    }

    #[test]
    fn disconnect_without_credentials() {
        let action: Action = roundtrip_test("socket_disconnect.json");
        match action.as_socket() {
            Some(SocketCommand::Disconnect { token, uri, .. }) => {
                assert!(token.is_empty());
                assert!(uri.is_empty());
            }
            other => panic!("expected disconnect, got {other:?}"),
        }
    }

    #[test]
    fn receive_payload_routes_by_first_dot() {
        let action: Action = roundtrip_test("socket_receive.json");
        let Some(SocketCommand::Receive { payload, .. }) = action.as_socket() else {
            panic!("expected receive");
        };
        assert_eq!(payload.key(), EventKey::new("chat", "message"));
        assert_eq!(payload.data["author"]["name"], "Alice");
    }

    #[test]
    fn inbound_event_with_dotted_event_name() {
        let event: InboundEvent = roundtrip_test("inbound_event.json");
        let key = event.key();
        assert_eq!(key.namespace(), "notifications");
        assert_eq!(key.event(), "badge.updated");
    }

    #[test]
    fn foreign_action_passes_through() {
        let action: Action = roundtrip_test("foreign_action.json");
        assert_eq!(action, Action::Other(load_fixture("foreign_action.json")));
    }

    #[test]
    fn heartbeat_tokens_are_bare_text() {
        assert_eq!(PING, "ping");
        assert_eq!(PONG, "pong");
        assert!(InboundEvent::decode(PONG).is_err());
    }
}
