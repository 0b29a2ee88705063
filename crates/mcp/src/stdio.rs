//! Newline-delimited JSON-RPC over a byte stream, for clients that spawn
//! the server as a subprocess instead of connecting over HTTP.

use std::sync::Arc;

use {
    serde_json::Value,
    tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    tracing::{debug, warn},
};

use crate::{
    engine::{EngineError, Inbound, ProtocolEngine},
    error::{Context, Result},
    types::{INVALID_REQUEST, JsonRpcResponse, PARSE_ERROR},
};

/// Answer one message per line until `reader` hits EOF.
///
/// Messages are handled one at a time, so replies keep request order.
/// Lines are taken as raw bytes; one that is not valid UTF-8 gets a parse
/// error reply like any other malformed line.
pub async fn serve<R, W>(engine: Arc<dyn ProtocolEngine>, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let reply = match engine.accept(line) {
            Ok(Inbound::Deferred(message)) => engine.handle(message).await,
            Ok(Inbound::Immediate(value)) => Some(value),
            Err(EngineError::Parse(e)) => {
                warn!(error = %e, "unparseable line on stdin");
                Some(failure(PARSE_ERROR, format!("parse error: {e}"))?)
            },
            Err(EngineError::Rejected(e)) => Some(failure(INVALID_REQUEST, e)?),
        };

        if let Some(reply) = reply {
            let mut out = serde_json::to_vec(&reply)?;
            out.push(b'\n');
            writer.write_all(&out).await.context("writing reply")?;
            writer.flush().await.context("flushing reply")?;
        }
    }
    debug!("input closed, stdio loop done");
    Ok(())
}

/// [`serve`] over the process's stdin and stdout.
pub async fn serve_stdio(engine: Arc<dyn ProtocolEngine>) -> Result<()> {
    serve(
        engine,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

fn failure(code: i64, message: String) -> Result<Value> {
    Ok(serde_json::to_value(JsonRpcResponse::failure(
        Value::Null,
        code,
        message,
    ))?)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::testing::EchoEngine, serde_json::json};

    async fn run(input: &str) -> Vec<Value> {
        let mut out = Vec::new();
        serve(Arc::new(EchoEngine), input.as_bytes(), &mut out)
            .await
            .unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn replies_in_request_order() {
        let replies = run("{\"n\":1,\"delayMs\":20}\n\n{\"n\":2}\n{\"silent\":true}\n").await;
        assert_eq!(
            replies,
            vec![
                json!({"echo": {"n": 1, "delayMs": 20}}),
                json!({"echo": {"n": 2}})
            ]
        );
    }

    #[tokio::test]
    async fn garbage_lines_get_protocol_errors() {
        let replies = run("{broken\n[1]\n").await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(replies[0]["id"], Value::Null);
        assert_eq!(replies[1]["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_the_session() {
        let mut out = Vec::new();
        let input: &[u8] = b"{\"n\":1}\n\xff\xfe\n{\"n\":2}\n";
        serve(Arc::new(EchoEngine), input, &mut out).await.unwrap();
        let replies: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], json!({"echo": {"n": 1}}));
        assert_eq!(replies[1]["error"]["code"], PARSE_ERROR);
        assert_eq!(replies[2], json!({"echo": {"n": 2}}));
    }

    #[tokio::test]
    async fn closed_output_ends_the_loop_with_an_error() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);
        let err = serve(Arc::new(EchoEngine), &b"{\"n\":1}\n"[..], writer)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Message { .. }));
        assert!(err.to_string().starts_with("writing reply: "), "{err}");
    }

    #[tokio::test]
    async fn mcp_engine_over_stdio() {
        let (registry, _runner, _dir) = crate::testing::registry().await;
        let engine = Arc::new(crate::engine::McpEngine::new(
            "stdio",
            registry,
            Arc::new(crate::engine::ServerIdentity::default()),
        ));
        let mut out = Vec::new();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        serve(engine.clone(), input.as_bytes(), &mut out).await.unwrap();
        let replies: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1]["id"], 2);
        assert!(engine.is_initialized());
    }
}
