//! The production transport (§6.1): a durable topic exchange, a
//! dead-letter fanout exchange bound to a single dead-letter queue, and one
//! durable queue per agent with `x-dead-letter-exchange` set. Grounded on
//! the `lapin` dependency used by the flowcatalyst and tasker-core example
//! repos (`other_examples`), and the ack/nack/dead-letter vocabulary from
//! flowcatalyst's `fc-common` crate.

use std::sync::Arc;

use async_trait::async_trait;
use cortex_types::MessageEnvelope;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio_util::sync::CancellationToken;

use crate::{BusError, ConsumerHandle, Handler, MessageBus, Topology};

#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub uri: String,
    pub exchange: String,
    pub dead_letter_exchange: String,
    pub dead_letter_queue: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            uri: "amqp://127.0.0.1:5672/%2f".to_string(),
            exchange: "cortex".to_string(),
            dead_letter_exchange: "cortex.dead-letter".to_string(),
            dead_letter_queue: "cortex.dead-letter".to_string(),
        }
    }
}

pub struct AmqpBus {
    config: AmqpConfig,
    connection: Connection,
}

impl AmqpBus {
    pub async fn connect(config: AmqpConfig) -> Result<Self, BusError> {
        let connection =
            Connection::connect(&config.uri, ConnectionProperties::default()).await?;
        let bus = Self { config, connection };
        bus.declare_topology().await?;
        Ok(bus)
    }

    async fn channel(&self) -> Result<Channel, BusError> {
        Ok(self.connection.create_channel().await?)
    }

    async fn declare_topology(&self) -> Result<(), BusError> {
        let channel = self.channel().await?;

        channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .exchange_declare(
                &self.config.dead_letter_exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_declare(
                &self.config.dead_letter_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                &self.config.dead_letter_queue,
                &self.config.dead_letter_exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(())
    }

    async fn ensure_queue(&self, queue_name: &str) -> Result<(), BusError> {
        let channel = self.channel().await?;
        let mut args = FieldTable::default();
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(self.config.dead_letter_exchange.as_str().into()),
        );

        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await?;

        let routing_key = format!("queue.{queue_name}");
        channel
            .queue_bind(
                queue_name,
                &self.config.exchange,
                &routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl MessageBus for AmqpBus {
    async fn publish(&self, envelope: MessageEnvelope, queue_name: &str) -> Result<(), BusError> {
        self.ensure_queue(queue_name).await?;
        let frame = cortex_wire::encode(&envelope)
            .map_err(|_| BusError::UnknownMessageType(None))?;

        let channel = self.channel().await?;
        let routing_key = format!("queue.{queue_name}");
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_headers({
                let mut headers = FieldTable::default();
                headers.insert(
                    cortex_wire::HEADER_NAME.into(),
                    AMQPValue::LongString(frame.message_type.as_str().into()),
                );
                headers
            });

        channel
            .basic_publish(
                &self.config.exchange,
                &routing_key,
                BasicPublishOptions::default(),
                &frame.body,
                properties,
            )
            .await?
            .await?;

        Ok(())
    }

    async fn start_consuming(
        &self,
        queue_name: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<ConsumerHandle, BusError> {
        self.ensure_queue(queue_name).await?;
        let channel = self.channel().await?;
        channel
            .basic_qos(1, lapin::options::BasicQosOptions::default())
            .await?;

        let mut consumer = channel
            .basic_consume(
                queue_name,
                &format!("cortex-{queue_name}"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let queue_owned = queue_name.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_for_task.cancelled() => break,
                    next = consumer.next() => {
                        let Some(delivery) = next else { break };
                        let Ok(delivery) = delivery else { continue };

                        let message_type = delivery
                            .properties
                            .headers()
                            .as_ref()
                            .and_then(|headers| headers.inner().get(cortex_wire::HEADER_NAME))
                            .and_then(|v| v.as_long_string().map(|s| s.to_string()));

                        match cortex_wire::decode(message_type.as_deref(), &delivery.data) {
                            Ok(envelope) => match handler.handle(envelope).await {
                                Ok(()) => {
                                    let _ = delivery.ack(BasicAckOptions::default()).await;
                                }
                                Err(err) => {
                                    tracing::error!(queue = %queue_owned, %err, "handler failed, dead-lettering");
                                    let _ = delivery
                                        .nack(BasicNackOptions {
                                            requeue: false,
                                            ..Default::default()
                                        })
                                        .await;
                                }
                            },
                            Err(err) => {
                                tracing::error!(queue = %queue_owned, %err, "undecodable envelope, dead-lettering");
                                let _ = delivery
                                    .nack(BasicNackOptions {
                                        requeue: false,
                                        ..Default::default()
                                    })
                                    .await;
                            }
                        }
                    }
                }
            }
        });

        Ok(ConsumerHandle { cancel, task })
    }

    async fn stop_consuming(&self) {
        // Individual consumer handles own their cancellation; see
        // `InMemoryBus::stop_consuming` for the rationale.
    }

    async fn topology(&self) -> Topology {
        Topology {
            bindings: vec![self.config.exchange.clone(), self.config.dead_letter_exchange.clone()],
        }
    }
}
