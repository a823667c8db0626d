//! Fan-out of delivery events from the router to live connections.

pub mod bus;
pub mod registry;

pub use bus::{BusToken, DeliveryBus, DeliveryHandler, PublishOutcome};
pub use registry::{
    delivery_channel, DeliveryReceiver, DeliverySender, DispatchReport, SubscriptionHandle,
    SubscriptionRegistry,
};
