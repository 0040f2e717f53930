//! Transport layer for the RouteGuide server
//!
//! Available transports:
//! - `rpc` - length-prefixed bincode frames over TCP, multiplexing unary and
//!   streaming calls on one connection

pub mod rpc;
