//! Echo adapter: an Event-family adapter used by the integration tests
//! and as a reference for adapter authors.
//!
//! Speaks the stdio line protocol. `create` and `publish` echo their
//! payload back as the result. Payloads can carry knobs that change the
//! adapter's behavior:
//!
//! - `"delay_ms": N` — answer after N milliseconds (responses to faster
//!   requests overtake it, exercising out-of-order correlation)
//! - `"hang": true` — never answer
//! - `"garbage": true` — write a non-JSON line instead of a response
//! - `"fail": "msg"` — answer with an error response
//! - `"pid": true` — answer with this process's pid

use relaygate_proto::{
    decode_line, encode_line, AdapterRequest, AdapterResponse, IpcMessage, IpcMessageKind,
};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> io::Result<()> {
    let mut lines = BufReader::new(io::stdin()).lines();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    // Single writer task; concurrent handlers queue whole lines.
    let writer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message = match decode_line(&line) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("echo-adapter: dropping unparseable frame: {e}");
                continue;
            }
        };
        let IpcMessageKind::Request(request) = message.kind else {
            eprintln!("echo-adapter: ignoring response frame {}", message.id);
            continue;
        };
        if matches!(request, AdapterRequest::Shutdown) {
            break;
        }
        let out_tx = out_tx.clone();
        tokio::spawn(handle(message.id, request, out_tx));
    }

    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

async fn handle(id: String, request: AdapterRequest, out: mpsc::UnboundedSender<String>) {
    let payload = match &request {
        AdapterRequest::Create { payload, .. }
        | AdapterRequest::Read { payload, .. }
        | AdapterRequest::Update { payload, .. }
        | AdapterRequest::Delete { payload, .. } => Some(payload.clone()),
        AdapterRequest::Publish { content, .. } => Some(content.clone()),
        _ => None,
    };

    if let Some(p) = &payload {
        if let Some(ms) = p.get("delay_ms").and_then(|v| v.as_u64()) {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
        if p.get("hang").and_then(|v| v.as_bool()) == Some(true) {
            return;
        }
        if p.get("garbage").and_then(|v| v.as_bool()) == Some(true) {
            let _ = out.send("this is not a frame\n".to_string());
            return;
        }
        if p.get("pid").and_then(|v| v.as_bool()) == Some(true) {
            respond(
                &out,
                id,
                AdapterResponse::EventResult {
                    result: serde_json::json!({ "pid": std::process::id() }),
                },
            );
            return;
        }
        if let Some(msg) = p.get("fail").and_then(|v| v.as_str()) {
            respond(
                &out,
                id,
                AdapterResponse::Error {
                    message: msg.to_string(),
                    detail: Some(p.clone()),
                },
            );
            return;
        }
    }

    let response = match request {
        AdapterRequest::GetManifest => AdapterResponse::Manifest {
            name: "echo".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec!["echo".to_string()],
        },
        AdapterRequest::Configure { .. } => AdapterResponse::Configured,
        AdapterRequest::Publish { content, .. } => AdapterResponse::Published { result: content },
        AdapterRequest::Create { payload, .. }
        | AdapterRequest::Read { payload, .. }
        | AdapterRequest::Update { payload, .. }
        | AdapterRequest::Delete { payload, .. } => AdapterResponse::EventResult { result: payload },
        // ECHO_FAIL_REFRESH turns refreshes into platform errors, for
        // stale-token dispatch tests.
        AdapterRequest::RefreshToken { refresh_token } => {
            if std::env::var("ECHO_FAIL_REFRESH").is_ok() {
                AdapterResponse::Error {
                    message: "refresh rejected".to_string(),
                    detail: None,
                }
            } else {
                AdapterResponse::Refreshed {
                    access_token: format!("refreshed-{refresh_token}"),
                    refresh_token,
                }
            }
        }
        other => AdapterResponse::Error {
            message: format!("echo adapter does not serve {}", other.method_name()),
            detail: None,
        },
    };
    respond(&out, id, response);
}

fn respond(out: &mpsc::UnboundedSender<String>, id: String, response: AdapterResponse) {
    match encode_line(&IpcMessage::response(id, response)) {
        Ok(line) => {
            let _ = out.send(line);
        }
        Err(e) => eprintln!("echo-adapter: failed to encode response: {e}"),
    }
}
