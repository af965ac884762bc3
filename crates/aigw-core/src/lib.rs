//! aigw-core - Core types for the AI gateway control plane
//!
//! This crate holds the domain model shared by the control plane, the
//! HTTP surface, and the backend client: backend records, capability
//! descriptors, health hysteresis, the immutable routing table, and the
//! normalized stream-event protocol. It performs no network I/O.

pub mod catalog;
pub mod error;
pub mod event;
pub mod models;
pub mod router;
pub mod table;

pub use catalog::{build_catalog, build_ui_layout, Catalog, CatalogEntry, UiGroup, UiLayout};
pub use error::{GatewayError, GatewayResult};
pub use event::{RouteReason, StreamEvent};
pub use models::descriptor::{
    CapabilityDescriptor, EndpointInfo, ResponseTypes, ServiceInfo, UiNavigation, UiOption,
};
pub use models::domain::Domain;
pub use models::health::{
    HealthState, HealthThresholds, HealthTracker, ProbeReport, ReadyOutcome, Transition,
};
pub use models::record::{BackendRecord, RecordSource};
pub use router::{route, route_excluding, MismatchPolicy, RouteDecision, RouteQuery};
pub use table::{Alias, RoutingEntry, RoutingTable, RoutingTableBuilder};
