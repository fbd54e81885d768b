//! Messages spoken by the demo node.

use courier_types::{Message, RequestMessage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub seq: u32,
}

impl Message for Ping {
    const TYPE: &'static str = "demo.ping";
}

impl RequestMessage for Ping {
    type Response = Pong;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub seq: u32,
}

impl Message for Pong {
    const TYPE: &'static str = "demo.pong";
}

/// Asks for the server's uptime; the server never answers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uptime;

impl Message for Uptime {
    const TYPE: &'static str = "demo.uptime";
}

impl RequestMessage for Uptime {
    type Response = UptimeReport;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeReport {
    pub seconds: u64,
}

impl Message for UptimeReport {
    const TYPE: &'static str = "demo.uptime_report";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub from: String,
    pub text: String,
}

impl Message for Chat {
    const TYPE: &'static str = "demo.chat";
}
