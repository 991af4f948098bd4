use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use peermsg_handler::{HandlerComponents, HandlerConfig, MessageHandler};
use peermsg_transport::{MemoryNetwork, PeerId};
use tokio::sync::mpsc;
use tracing::info;

use crate::cmd::{parse_duration, LoopbackArgs};
use crate::exit::{
    handler_error, io_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT,
    USAGE,
};
use crate::output::{print_messages, Observed, OutputFormat};

const SENDER: &str = "node-a";
const RECEIVER: &str = "node-b";

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let messages = resolve_messages(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|err| io_error("failed starting runtime", err))?;
    let observed = runtime.block_on(exchange(&args.protocol, messages, timeout))?;

    print_messages(&observed, format);
    Ok(SUCCESS)
}

fn resolve_messages(args: &LoopbackArgs) -> CliResult<Vec<Bytes>> {
    if args.count == 0 {
        return Err(CliError::new(USAGE, "--count must be greater than zero"));
    }
    let base: Vec<Bytes> = if args.data.is_empty() {
        vec![Bytes::from_static(b"hello")]
    } else {
        args.data.iter().map(|d| Bytes::from(d.clone())).collect()
    };
    Ok(std::iter::repeat(base)
        .take(args.count)
        .flatten()
        .collect())
}

async fn exchange(protocol: &str, messages: Vec<Bytes>, timeout: Duration) -> CliResult<Vec<Observed>> {
    let config = HandlerConfig::default().with_protocol(protocol);
    let network = MemoryNetwork::new();
    let node_a = network.add_node(SENDER);
    let node_b = network.add_node(RECEIVER);
    let sender = MessageHandler::new(HandlerComponents::from_node(node_a.clone()), config.clone());
    let receiver = MessageHandler::new(HandlerComponents::from_node(node_b.clone()), config);

    let (tx, mut rx) = mpsc::unbounded_channel();
    receiver.handle(Arc::new(move |message: &Bytes, peer: &PeerId| {
        let _ = tx.send((message.clone(), peer.clone()));
    }));
    sender
        .start()
        .await
        .map_err(|err| handler_error("start failed", err))?;
    receiver
        .start()
        .await
        .map_err(|err| handler_error("start failed", err))?;
    node_a
        .dial(node_b.peer_id())
        .map_err(|err| transport_error("dial failed", err))?;

    for message in &messages {
        sender
            .send(message.clone(), node_b.peer_id())
            .await
            .map_err(|err| handler_error("send failed", err))?;
    }

    let mut observed = Vec::with_capacity(messages.len());
    while observed.len() < messages.len() {
        let next = tokio::time::timeout(timeout, rx.recv()).await.map_err(|_| {
            CliError::new(
                TIMEOUT,
                format!(
                    "timed out after receiving {} of {} messages",
                    observed.len(),
                    messages.len()
                ),
            )
        })?;
        let Some((payload, peer)) = next else {
            return Err(CliError::new(FAILURE, "receiver stopped before all messages arrived"));
        };
        let index = observed.len();
        observed.push(Observed {
            index,
            peer: Some(peer.to_string()),
            payload,
        });
    }

    sender
        .stop()
        .await
        .map_err(|err| handler_error("stop failed", err))?;
    receiver
        .stop()
        .await
        .map_err(|err| handler_error("stop failed", err))?;
    info!(protocol, count = observed.len(), "loopback complete");
    Ok(observed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(data: &[&str], count: usize) -> LoopbackArgs {
        LoopbackArgs {
            data: data.iter().map(|s| s.to_string()).collect(),
            count,
            protocol: peermsg_handler::DEFAULT_PROTOCOL.to_string(),
            timeout: "5s".to_string(),
        }
    }

    #[test]
    fn repeats_message_list() {
        let messages = resolve_messages(&args(&["a", "b"], 2)).unwrap();
        assert_eq!(messages, vec![&b"a"[..], b"b", b"a", b"b"]);
    }

    #[test]
    fn defaults_to_hello() {
        let messages = resolve_messages(&args(&[], 1)).unwrap();
        assert_eq!(messages, vec![&b"hello"[..]]);
    }

    #[test]
    fn zero_count_is_usage_error() {
        assert_eq!(resolve_messages(&args(&["a"], 0)).unwrap_err().code, USAGE);
    }

    #[tokio::test]
    async fn exchange_delivers_in_order_from_sender() {
        let messages = vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")];
        let observed = exchange("/loopback/1", messages, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(observed.len(), 2);
        assert_eq!(observed[0].payload.as_ref(), b"one");
        assert_eq!(observed[1].payload.as_ref(), b"two");
        assert_eq!(observed[1].peer.as_deref(), Some(SENDER));
    }
}
