use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde_json::json;

use super::*;
use crate::stencil::Range;

fn file() -> FileIdentity {
    FileIdentity::new("octo", "lens", "0123456789abcdef0123456789abcdef01234567", "src/lib.rs")
}

#[test]
fn request_serializes_flat_with_wire_names() {
    let file = file();
    let request = BackendRequest {
        kind: RequestKind::SymbolAt,
        file: &file,
        line: Some(4),
        character: Some(12),
        git_ref: Some("refs/heads/main"),
    };
    let value = serde_json::to_value(&request).expect("serializes");
    assert_eq!(
        value,
        json!({
            "kind": "symbolAt",
            "owner": "octo",
            "repo": "lens",
            "commit": "0123456789abcdef0123456789abcdef01234567",
            "path": "src/lib.rs",
            "line": 4,
            "char": 12,
            "ref": "refs/heads/main"
        })
    );
}

#[test]
fn stencil_request_omits_position_and_ref() {
    let file = file();
    let request = BackendRequest {
        kind: RequestKind::Stencil,
        file: &file,
        line: None,
        character: None,
        git_ref: None,
    };
    let value = serde_json::to_value(&request).expect("serializes");
    assert_eq!(value["kind"], "stencil");
    assert!(value.get("line").is_none());
    assert!(value.get("char").is_none());
    assert!(value.get("ref").is_none());
}

#[test]
fn touch_request_names_the_commit_only() {
    let commit = file().repo_commit();
    let request = TouchRequest {
        kind: RequestKind::Touch,
        commit: &commit,
        git_ref: Some("refs/pull/7/head"),
    };
    let value = serde_json::to_value(&request).expect("serializes");
    assert_eq!(
        value,
        json!({
            "kind": "touch",
            "owner": "octo",
            "repo": "lens",
            "commit": "0123456789abcdef0123456789abcdef01234567",
            "ref": "refs/pull/7/head"
        })
    );
}

#[test]
fn decode_response_maps_backend_errors() {
    let not_ready = decode_response::<Stencil>(r#"{"error":"not-ready"}"#);
    assert_eq!(not_ready, Err(LookupError::NotReady));

    let binary = decode_response::<Stencil>(r#"{"error":"binary"}"#).expect_err("binary file");
    assert!(binary.is_unsupported());

    let other = decode_response::<Stencil>(r#"{"error":"boom"}"#);
    assert_eq!(
        other,
        Err(LookupError::Backend {
            reason: "boom".to_string()
        })
    );
}

#[test]
fn decode_response_reads_data_or_nothing() {
    let stencil = decode_response::<Stencil>(
        r#"{"data":[{"line":0,"characterStart":3,"characterEnd":7},{"line":2,"characterStart":0,"characterEnd":4}]}"#,
    )
    .expect("valid response")
    .expect("has data");
    assert_eq!(stencil.ranges(), &[Range::new(0, 3, 7), Range::new(2, 0, 4)]);

    assert_eq!(decode_response::<Symbol>(r#"{"data":null}"#), Ok(None));
    assert_eq!(decode_response::<Symbol>("{}\n"), Ok(None));
}

#[test]
fn decode_response_rejects_garbage() {
    let error = decode_response::<Symbol>("Traceback (most recent call last)").expect_err("not json");
    assert!(matches!(error, LookupError::Decode { .. }));
}

/// In-memory provider: one symbol whose definition and references are known.
struct FixedSymbols {
    symbol: Symbol,
    calls: AtomicUsize,
    positions: Mutex<Vec<Position>>,
}

#[async_trait]
impl SymbolProvider for FixedSymbols {
    async fn symbol_at(
        &self,
        _file: &FileIdentity,
        position: Position,
        _git_ref: Option<&str>,
    ) -> Result<Option<Symbol>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.positions.lock().expect("positions lock").push(position);
        let hit = self.symbol.occurrences().any(|occurrence| {
            occurrence.range.line == position.line && occurrence.range.character_start == position.character
        });
        Ok(hit.then(|| self.symbol.clone()))
    }
}

#[tokio::test]
async fn symbol_cache_serves_every_occurrence_from_one_load() {
    let file = file();
    let definition = file.at(Range::new(1, 4, 9));
    let reference = file.at(Range::new(8, 12, 17));
    let provider = Arc::new(FixedSymbols {
        symbol: Symbol {
            definition: Some(definition.clone()),
            references: vec![reference.clone()],
            hover: Some("fn parse()".to_string()),
        },
        calls: AtomicUsize::new(0),
        positions: Mutex::new(Vec::new()),
    });
    let cache = symbol_cache(provider.clone(), 1);
    let git_ref = Some("refs/heads/main".to_string());

    let from_reference = cache
        .get(SymbolKey::new(reference.clone(), git_ref.clone()))
        .await
        .expect("lookup succeeds")
        .expect("symbol found");
    let from_definition = cache
        .get(SymbolKey::new(definition, git_ref.clone()))
        .await
        .expect("lookup succeeds")
        .expect("symbol found");

    assert!(Arc::ptr_eq(&from_reference, &from_definition));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*provider.positions.lock().expect("positions lock"), vec![Position::new(8, 12)]);

    // Different ref, different key.
    cache.get(SymbolKey::new(reference, None)).await.expect("lookup succeeds");
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn symbol_cache_keeps_not_found_results() {
    let provider = Arc::new(FixedSymbols {
        symbol: Symbol::default(),
        calls: AtomicUsize::new(0),
        positions: Mutex::new(Vec::new()),
    });
    let cache = symbol_cache(provider.clone(), 1);
    let key = SymbolKey::new(file().at(Range::new(0, 0, 3)), None);

    assert_eq!(cache.get(key.clone()).await, Ok(None));
    assert_eq!(cache.get(key).await, Ok(None));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn command_backend_round_trips_through_a_process() {
    let settings = BackendSettings {
        command: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            r#"read request; case "$request" in *symbolAt*) echo '{"error":"not-ready"}' ;; *) echo '{"data":[{"line":3,"characterStart":1,"characterEnd":5}]}' ;; esac"#.to_string(),
        ],
    };
    let backend = CommandBackend::new(&settings);

    let stencil = backend.stencil(&file(), None).await.expect("stencil");
    assert_eq!(stencil.ranges(), &[Range::new(3, 1, 5)]);

    let symbol = backend.symbol_at(&file(), Position::new(3, 2), Some("refs/pull/7/head")).await;
    assert_eq!(symbol, Err(LookupError::NotReady));
}

#[cfg(unix)]
#[tokio::test]
async fn command_backend_touch_ignores_the_payload() {
    let settings = BackendSettings {
        command: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            r#"read request; case "$request" in *'"kind":"touch"'*) echo '{"data":{"queued":true}}' ;; *) echo '{"error":"boom"}' ;; esac"#.to_string(),
        ],
    };
    let backend = CommandBackend::new(&settings);
    assert_eq!(backend.touch(&file().repo_commit(), None).await, Ok(()));
}

#[tokio::test]
async fn missing_backend_command_is_a_transport_error() {
    let settings = BackendSettings {
        command: "symbol-lens-backend-that-does-not-exist".to_string(),
        args: Vec::new(),
    };
    let error = CommandBackend::new(&settings).stencil(&file(), None).await.expect_err("no such command");
    assert!(matches!(error, LookupError::Transport { .. }));
}
