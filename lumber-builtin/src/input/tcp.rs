//! TCP input: one entry per received line.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lumber_entry::{Entry, Value};
use lumber_operator::config::{BuildContext, OperatorBuilder};
use lumber_operator::error::{BuildError, OperatorError};
use lumber_operator::helper::{InputConfig, InputOperator};
use lumber_operator::operator::Operator;
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Longest accepted line; connections sending more are closed.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Configuration of the `tcp_input` operator.
#[derive(Debug, Clone, Deserialize)]
pub struct TcpInputConfig {
    /// Input archetype fields.
    #[serde(flatten)]
    pub input: InputConfig,
    /// The `host:port` to listen on.
    pub listen_address: String,
}

impl OperatorBuilder for TcpInputConfig {
    fn id(&self) -> &str {
        self.input.id()
    }

    fn operator_type(&self) -> &str {
        self.input.operator_type()
    }

    fn output_ids(&self) -> Vec<String> {
        self.input.output_ids()
    }

    fn set_namespace(&mut self, namespace: &str, exclusions: &[String]) {
        self.input.set_namespace(namespace, exclusions);
    }

    fn build(&self, context: &BuildContext) -> Result<Arc<dyn Operator>, BuildError> {
        if self.listen_address.is_empty() {
            return Err(BuildError::InvalidConfig {
                id: self.id().to_string(),
                message: "missing required `listen_address` field".to_string(),
            });
        }
        Ok(Arc::new(TcpInput {
            input: Arc::new(self.input.build(context)?),
            listen_address: self.listen_address.clone(),
            tracker: TaskTracker::new(),
        }))
    }
}

/// Reads newline-delimited messages from TCP connections and emits one
/// entry per line, with the line as the record. A trailing `\r` is
/// stripped.
pub struct TcpInput {
    input: Arc<InputOperator>,
    listen_address: String,
    tracker: TaskTracker,
}

#[async_trait]
impl Operator for TcpInput {
    fn id(&self) -> &str {
        self.input.id()
    }

    fn operator_type(&self) -> &str {
        self.input.operator_type()
    }

    fn can_output(&self) -> bool {
        true
    }

    fn outputs(&self) -> Vec<Arc<dyn Operator>> {
        self.input.outputs()
    }

    fn set_outputs(&self, outputs: Vec<Arc<dyn Operator>>) -> Result<(), BuildError> {
        self.input.set_outputs(outputs)
    }

    fn can_process(&self) -> bool {
        false
    }

    async fn start(&self) -> Result<(), OperatorError> {
        let listener =
            TcpListener::bind(&self.listen_address)
                .await
                .map_err(|err| OperatorError::StartFailed {
                    id: self.id().to_string(),
                    message: format!("bind {}: {err}", self.listen_address),
                })?;
        debug!(
            operator_id = self.id(),
            listen_address = %self.listen_address,
            "tcp input listening",
        );

        let input = Arc::clone(&self.input);
        let tracker = self.tracker.clone();
        let token = self.input.cancellation().clone();
        self.tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "tcp connection accepted");
                            tracker.spawn(handle_connection(
                                Arc::clone(&input),
                                token.clone(),
                                stream,
                            ));
                        }
                        Err(err) => {
                            warn!(error = %err, "tcp accept failed");
                        }
                    },
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), OperatorError> {
        self.input.cancellation().cancel();
        self.tracker.close();
        self.tracker.wait().await;
        Ok(())
    }
}

/// Read lines from one connection until EOF or cancellation.
///
/// Entries already framed are handed downstream before the cancellation
/// is observed, so stop drains what was read.
async fn handle_connection(
    input: Arc<InputOperator>,
    token: CancellationToken,
    stream: TcpStream,
) {
    let mut frames = FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            frame = frames.next() => match frame {
                Some(Ok(line)) => {
                    let entry = Entry::from_record(Value::String(line));
                    if let Err(err) = input.write(&token, entry).await {
                        warn!(
                            operator_id = input.id(),
                            error = %err,
                            "downstream rejected entry",
                        );
                    }
                }
                Some(Err(err)) => {
                    warn!(operator_id = input.id(), error = %err, "tcp read failed");
                    break;
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_address_is_required() {
        let config: TcpInputConfig = serde_yaml::from_str(
            r"
            id: my-tcp
            type: tcp_input
            listen_address: ''
            output: sink
            ",
        )
        .expect("deserializes");
        let err = config.build(&BuildContext::new()).err().expect("should fail to build");
        assert!(err.to_string().contains("listen_address"));
    }
}
