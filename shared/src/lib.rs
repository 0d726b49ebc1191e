//! Types shared between the Blitz server and its clients: wire protocol,
//! gameplay configuration and the vector math both sides agree on.

pub mod config;
pub mod protocol;
pub mod vec3;
