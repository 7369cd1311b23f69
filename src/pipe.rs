//! In-process request/response pipe between the privileged and untrusted
//! sides. Delivery is FIFO per direction; request/response pairing across
//! different concurrent requests is deliberately not guaranteed, so callers
//! rely on token and generation checks rather than ordering.

use tokio::sync::{mpsc, oneshot};

use crate::error::SessionError;
use crate::protocol::{ErrorShape, Message, Reply};

struct Envelope {
    message: Message,
    reply: Option<oneshot::Sender<Result<Reply, ErrorShape>>>,
}

/// One end of the pipe. Split into sender/receiver halves when the two
/// roles live on different tasks.
pub struct PipeEnd {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

#[derive(Debug, Clone)]
pub struct PipeSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

pub struct PipeReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

/// A message received from the peer, with the means to answer it.
pub struct Incoming {
    pub message: Message,
    reply: Option<oneshot::Sender<Result<Reply, ErrorShape>>>,
}

impl Incoming {
    pub fn into_parts(self) -> (Message, Responder) {
        (self.message, Responder { reply: self.reply })
    }
}

/// Response slot for one incoming message. Replying to a notification is a
/// no-op; dropping it without replying rejects the peer with `PipeClosed`.
pub struct Responder {
    reply: Option<oneshot::Sender<Result<Reply, ErrorShape>>>,
}

impl Responder {
    pub fn send(self, result: Result<Reply, ErrorShape>) {
        if let Some(tx) = self.reply {
            let _ = tx.send(result);
        }
    }
}

impl PipeEnd {
    pub fn pair() -> (PipeEnd, PipeEnd) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            PipeEnd { tx: a_tx, rx: b_rx },
            PipeEnd { tx: b_tx, rx: a_rx },
        )
    }

    pub fn sender(&self) -> PipeSender {
        PipeSender {
            tx: self.tx.clone(),
        }
    }

    pub fn split(self) -> (PipeSender, PipeReceiver) {
        (PipeSender { tx: self.tx }, PipeReceiver { rx: self.rx })
    }

    /// Request/response round trip.
    pub async fn send(&self, message: Message) -> Result<Reply, SessionError> {
        self.sender().send(message).await
    }

    /// Fire-and-forget push; the peer cannot answer it.
    pub fn notify(&self, message: Message) -> Result<(), SessionError> {
        self.sender().notify(message)
    }

    pub async fn recv(&mut self) -> Option<Incoming> {
        self.rx.recv().await.map(|envelope| Incoming {
            message: envelope.message,
            reply: envelope.reply,
        })
    }
}

impl PipeSender {
    pub async fn send(&self, message: Message) -> Result<Reply, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                message,
                reply: Some(reply_tx),
            })
            .map_err(|_| SessionError::PipeClosed)?;
        match reply_rx.await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(shape)) => Err(SessionError::Rejected(shape)),
            Err(_) => Err(SessionError::PipeClosed),
        }
    }

    pub fn notify(&self, message: Message) -> Result<(), SessionError> {
        self.tx
            .send(Envelope {
                message,
                reply: None,
            })
            .map_err(|_| SessionError::PipeClosed)
    }
}

impl PipeReceiver {
    pub async fn recv(&mut self) -> Option<Incoming> {
        self.rx.recv().await.map(|envelope| Incoming {
            message: envelope.message,
            reply: envelope.reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_and_rejection() {
        let (mut host, guest) = PipeEnd::pair();

        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let incoming = host.recv().await.unwrap();
                let (message, responder) = incoming.into_parts();
                match message {
                    Message::IframeReady => responder.send(Ok(Reply::None)),
                    _ => responder.send(Err(ErrorShape {
                        name: "UnexpectedMessage".to_string(),
                        message: "nope".to_string(),
                    })),
                }
            }
        });

        assert!(matches!(
            guest.send(Message::IframeReady).await,
            Ok(Reply::None)
        ));
        match guest
            .send(Message::OpenAllowedFile {
                file_token: crate::session::tokens::Token::NONE,
            })
            .await
        {
            Err(SessionError::Rejected(shape)) => assert_eq!(shape.name, "UnexpectedMessage"),
            other => panic!("expected rejection, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn send_to_closed_peer_fails() {
        let (host, guest) = PipeEnd::pair();
        drop(host);
        assert!(matches!(
            guest.send(Message::IframeReady).await,
            Err(SessionError::PipeClosed)
        ));
    }
}
