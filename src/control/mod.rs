//! Client side of the coordinator control plane.
//!
//! The coordinator is an opaque HTTP JSON service: the worker POSTs its
//! status and receives directives back, and POSTs metric batches as the case
//! runs. Workers are deployed against coordinators fronted by self-signed
//! TLS, so certificate verification is off, and keep-alives are disabled so
//! a bounced coordinator never strands pooled connections.
mod client;
mod wire;


pub use client::CoordinatorClient;
pub use wire::{
    CaseAssignment, CaseConfig, CaseStatusEntry, PushStatusData, PushStatusRequest,
    PushStatusResponse, UNASSIGNED_INDEX, WorkerBaseInfo, WorkerEnvelope, WorkerStatus,
};
