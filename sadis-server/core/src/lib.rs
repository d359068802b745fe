//! BBSim SADIS cache
//!
//! Each BBSim instance serves a static SADIS document describing the OLTs and ONUs it emulates
//! together with the bandwidth profiles they reference. This crate holds the document model, the
//! rule that turns a generic subscriber entry into a concrete OLT or ONU identity, and the
//! in-memory [`Store`] that the lookup API reads from.
//!
//! ```text
//! [ SadisConfig ] -> classify -> [ Subscriber::Olt | Subscriber::Onu ] -> [ Store ]
//!                              -> [ BandwidthProfile ]                 -> [ Store ]
//! ```

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod sadis;
mod store;

pub use self::{
    sadis::{
        BandwidthProfile, OltEntry, OnuEntry, SadisConfig, Subscriber, SubscriberEntry,
        UnclassifiedEntry, UniTag,
    },
    store::{Entity, Kind, NotFound, Store},
};
