//! Shared fixtures for matrix-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use matrix_store::fakes::MemoryHistoryStore;
use matrix_store::{RepoProfile, UserProfile};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;

/// 2017-06-15T00:00:00Z
pub const ROUND_START: i64 = 1_497_484_800;
pub const ROUND_END: i64 = ROUND_START + 86_400;

/// In-memory controller: answers each request with the next scripted
/// result and hands back every request it received.
pub fn controller(results: Vec<Value>) -> (DuplexStream, JoinHandle<Vec<Value>>) {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let handle = tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(server_end);
        let mut lines = BufReader::new(read).lines();
        let mut seen = Vec::new();
        for result in results {
            let Some(line) = lines.next_line().await.unwrap() else {
                break;
            };
            let request: Value = serde_json::from_str(&line).unwrap();
            let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": result});
            seen.push(request);
            write
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .unwrap();
        }
        // drain anything sent after the script ran out
        while let Ok(Some(line)) = lines.next_line().await {
            seen.push(serde_json::from_str(&line).unwrap());
        }
        seen
    });
    (client_end, handle)
}

pub fn round(n: i64) -> Value {
    json!({"cur_round": n, "start_time": ROUND_START, "end_time": ROUND_END})
}

pub fn terminal() -> Value {
    json!({"cur_round": -1})
}

/// One agent (10, 5, 2) and one repository (100, 3, 1, 1).
pub fn small_corpus() -> Arc<MemoryHistoryStore> {
    let store = MemoryHistoryStore::new();
    store.insert_user(UserProfile::new("agentA", 10, 5, 2));
    store.push_repo(RepoProfile::new(0, "repoR", 100, 3, 1, Some(1)));
    Arc::new(store)
}

pub fn methods(seen: &[Value]) -> Vec<String> {
    seen.iter()
        .map(|r| r["method"].as_str().unwrap_or_default().to_string())
        .collect()
}
