use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    ChatMessageEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderCreatedEvent,
    ReceiptMatchedEvent,
    TransactionClosedEvent,
};

/// The producer ends of the hook channels. Cloned into every API struct that needs to publish, and into the
/// platform event stream adapters that feed push events in.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_created_producer: Vec<EventProducer<OrderCreatedEvent>>,
    pub chat_message_producer: Vec<EventProducer<ChatMessageEvent>>,
    pub receipt_matched_producer: Vec<EventProducer<ReceiptMatchedEvent>>,
    pub transaction_closed_producer: Vec<EventProducer<TransactionClosedEvent>>,
}

pub struct EventHandlers {
    pub on_order_created: Option<EventHandler<OrderCreatedEvent>>,
    pub on_chat_message: Option<EventHandler<ChatMessageEvent>>,
    pub on_receipt_matched: Option<EventHandler<ReceiptMatchedEvent>>,
    pub on_transaction_closed: Option<EventHandler<TransactionClosedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_created = hooks.on_order_created.map(|f| EventHandler::new(buffer_size, f));
        let on_chat_message = hooks.on_chat_message.map(|f| EventHandler::new(buffer_size, f));
        let on_receipt_matched = hooks.on_receipt_matched.map(|f| EventHandler::new(buffer_size, f));
        let on_transaction_closed = hooks.on_transaction_closed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_created, on_chat_message, on_receipt_matched, on_transaction_closed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_created {
            result.order_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_chat_message {
            result.chat_message_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_receipt_matched {
            result.receipt_matched_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_transaction_closed {
            result.transaction_closed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_created {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_chat_message {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_receipt_matched {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_transaction_closed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Option<Handler<OrderCreatedEvent>>,
    pub on_chat_message: Option<Handler<ChatMessageEvent>>,
    pub on_receipt_matched: Option<Handler<ReceiptMatchedEvent>>,
    pub on_transaction_closed: Option<Handler<TransactionClosedEvent>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }

    pub fn on_chat_message<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ChatMessageEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_chat_message = Some(Arc::new(f));
        self
    }

    pub fn on_receipt_matched<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ReceiptMatchedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_receipt_matched = Some(Arc::new(f));
        self
    }

    pub fn on_transaction_closed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionClosedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_transaction_closed = Some(Arc::new(f));
        self
    }
}
