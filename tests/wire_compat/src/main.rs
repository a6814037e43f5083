fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use shareit_protocol::{
        ChunkHeader, ClientEvent, ControlMessage, Frame, RelayPayload, ServerEvent, decode_frame,
        encode_frame,
    };

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
    /// the JSON values (key order is irrelevant).
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
            "roundtrip mismatch for {name}:\n  browser: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    // --- Peer control messages ---

    #[test]
    fn fixture_file_meta() {
        let msg = roundtrip_test::<ControlMessage>("file_meta.json");
        let ControlMessage::FileMeta(meta) = msg else {
            panic!("expected file-meta");
        };
        assert_eq!(meta.size, 150_000);
        assert_eq!(meta.total_chunks, 3);
        assert_eq!(meta.checksum.len(), 64);
    }

    #[test]
    fn fixture_ack() {
        let msg = roundtrip_test::<ControlMessage>("ack.json");
        assert!(matches!(msg, ControlMessage::Ack(ack) if ack.chunk_index == 2));
    }

    #[test]
    fn fixture_request_resume() {
        let msg = roundtrip_test::<ControlMessage>("request_resume.json");
        assert_eq!(msg, ControlMessage::RequestResume);
    }

    // --- Binary frame ---

    #[test]
    fn fixture_chunk_header() {
        let header = roundtrip_test::<ChunkHeader>("chunk_header.json");
        assert_eq!(header, ChunkHeader::new("lq2w8x1k-3f9a", 2));
    }

    #[test]
    fn frame_layout_matches_browser_encoder() {
        // The browser writes the header with JSON.stringify, so key order and
        // spacing are fixed; the length prefix is a big-endian u32.
        let header_json = r#"{"type":"file-chunk","fileId":"lq2w8x1k-3f9a","chunkIndex":2}"#;
        let mut browser = (header_json.len() as u32).to_be_bytes().to_vec();
        browser.extend_from_slice(header_json.as_bytes());
        browser.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let frame: Frame<ChunkHeader> = decode_frame(&browser).unwrap();
        assert_eq!(frame.header, ChunkHeader::new("lq2w8x1k-3f9a", 2));
        assert_eq!(frame.payload, [0xDE, 0xAD, 0xBE, 0xEF]);

        let ours = encode_frame(&frame.header, &frame.payload).unwrap();
        assert_eq!(ours, browser);
    }

    // --- Relay payloads ---

    #[test]
    fn fixture_relay_chunk_payload() {
        let payload = roundtrip_test::<RelayPayload>("relay_chunk_payload.json");
        let RelayPayload::Chunk(chunk) = payload else {
            panic!("expected chunk payload");
        };
        assert_eq!(chunk.data, b"Hello ShareIt");
    }

    #[test]
    fn fixture_relay_control_payload() {
        let payload = roundtrip_test::<RelayPayload>("relay_control_payload.json");
        let RelayPayload::Control { control } = payload else {
            panic!("expected control payload");
        };
        let inner: ControlMessage = serde_json::from_str(&control).unwrap();
        assert!(matches!(inner, ControlMessage::Ack(ack) if ack.chunk_index == 0));
    }

    // --- Signaling: client -> service ---

    #[test]
    fn fixture_client_join() {
        let event = roundtrip_test::<ClientEvent>("client_join.json");
        assert_eq!(event, ClientEvent::Join("k3j9x0qa".into()));
    }

    #[test]
    fn fixture_client_signal() {
        let event = roundtrip_test::<ClientEvent>("client_signal.json");
        let ClientEvent::Signal { signal, .. } = event else {
            panic!("expected signal");
        };
        assert_eq!(signal["type"], "sdp");
    }

    #[test]
    fn fixture_client_relay_chunk() {
        roundtrip_test::<ClientEvent>("client_relay_chunk.json");
    }

    #[test]
    fn fixture_client_resume_request() {
        roundtrip_test::<ClientEvent>("client_resume_request.json");
    }

    #[test]
    fn fixture_client_resume_state() {
        let event = roundtrip_test::<ClientEvent>("client_resume_state.json");
        let ClientEvent::ResumeState { state, .. } = event else {
            panic!("expected resume-state");
        };
        assert_eq!(state["lq2w8x1k-3f9a"].resume_from(), 3);
        assert_eq!(state["m0c7p2zz-11b4"].resume_from(), 0);
    }

    // --- Signaling: service -> client ---

    #[test]
    fn fixture_server_peer_joined() {
        roundtrip_test::<ServerEvent>("server_peer_joined.json");
    }

    #[test]
    fn fixture_server_signal() {
        roundtrip_test::<ServerEvent>("server_signal.json");
    }

    #[test]
    fn fixture_server_relay_control() {
        let event = roundtrip_test::<ServerEvent>("server_relay_control.json");
        assert!(matches!(
            event,
            ServerEvent::RelayChunk(RelayPayload::Control { .. })
        ));
    }

    #[test]
    fn fixture_server_resume_request() {
        roundtrip_test::<ServerEvent>("server_resume_request.json");
    }

    #[test]
    fn fixture_server_resume_state() {
        roundtrip_test::<ServerEvent>("server_resume_state.json");
    }

    #[test]
    fn legacy_resume_request_without_sender() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"event":"resume-request","data":{}}"#).unwrap();
        assert_eq!(event, ServerEvent::ResumeRequest { from: None });
    }

    #[test]
    fn legacy_meta_over_signal_stays_opaque() {
        // Older browser builds pushed file-meta through `signal`; it must not
        // be mistaken for an announcement.
        let event: ServerEvent = serde_json::from_str(
            r#"{"event":"signal","data":{"from":"x","signal":{"type":"meta","meta":{"type":"file-meta"}}}}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::Signal { .. }));
    }
}
