//! Relay core: maps each end-user to a dedicated workspace thread and moves
//! messages both ways, batching media albums into single deliveries.
//!
//! All cross-event state lives in a [`KeyValueStore`]; the types here hold no
//! state between inbound events beyond detached flush watchdogs.
//!
//! [`KeyValueStore`]: topicbridge_store::KeyValueStore

pub mod aggregator;
pub mod directory;
pub mod error;
pub mod event;
pub mod gateway;
pub mod router;
pub mod title;
pub mod verification;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    aggregator::{
        AggregatorSettings, AppendOutcome, Destination, Direction, MediaAggregator, SweepReport,
    },
    directory::{ThreadDirectory, ThreadRecord},
    error::{Error, Result},
    event::{ChatKind, Content, InboundEvent, MediaItem, MediaKind, Sender},
    gateway::{DeliveryResult, GatewayError, MessagingGateway, OutboundMedia},
    router::{RelayRouter, RouteOutcome, RouterSettings},
    verification::{AlwaysVerified, VerificationGate},
};
