use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::BusError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};
use crate::transport::Transport;

/// ZeroMQ PUB socket.
///
/// Each message goes out as two frames, `[topic, envelope]`, so SUB sockets
/// can prefix-filter on the first frame without decoding the envelope.
pub struct ZmqPublisher {
    socket: Mutex<PubSocket>,
}

impl ZmqPublisher {
    /// Connect to a broker frontend.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = PubSocket::new();
        socket.connect(&transport.endpoint()).await?;
        info!("PUB socket connected");
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Bind for direct pub/sub without a broker.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, BusError> {
        transport
            .ensure_ipc_dir()
            .map_err(|e| BusError::Transport(e.to_string()))?;
        let mut socket = PubSocket::new();
        socket.bind(&transport.endpoint()).await?;
        info!("PUB socket bound");
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventPublisher for ZmqPublisher {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        let topic = message.topic.clone();
        let envelope = message.to_bytes()?;

        let mut frames = ZmqMessage::from(topic.as_str());
        frames.push_back(envelope.into());

        self.socket.lock().await.send(frames).await?;
        debug!(topic = %topic, "published");
        Ok(())
    }
}

/// ZeroMQ SUB socket.
pub struct ZmqSubscriber {
    socket: Mutex<SubSocket>,
}

impl ZmqSubscriber {
    /// Connect to a broker backend or directly to a bound publisher.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = SubSocket::new();
        socket.connect(&transport.endpoint()).await?;
        info!("SUB socket connected");
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventSubscriber for ZmqSubscriber {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        self.socket.lock().await.subscribe(topic_prefix).await?;
        info!(topic_prefix = %topic_prefix, "subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        self.socket.lock().await.unsubscribe(topic_prefix).await?;
        info!(topic_prefix = %topic_prefix, "unsubscribed");
        Ok(())
    }

    async fn recv(&self) -> Result<Message, BusError> {
        let zmq_msg = self.socket.lock().await.recv().await?;
        let frames: Vec<_> = zmq_msg.iter().collect();

        // [topic, envelope]; a lone frame is taken as the envelope.
        let envelope = match frames.as_slice() {
            [] => return Err(BusError::Transport("empty ZMQ message".into())),
            [only] => *only,
            [_, envelope, ..] => *envelope,
        };

        let message = Message::from_bytes(envelope.as_ref())?;
        debug!(topic = %message.topic, "received");
        Ok(message)
    }
}
