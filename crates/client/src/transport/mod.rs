//! Transport layer for the RouteGuide client
//!
//! Available transports:
//! - `rpc` - multiplexed framed TCP, the counterpart of the server transport

pub mod rpc;
