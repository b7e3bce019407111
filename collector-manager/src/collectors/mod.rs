//! Built-in collectors.

pub mod fitbit;
