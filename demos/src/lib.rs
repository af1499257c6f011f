#![warn(rust_2018_idioms)]
//! Illustrative Endpoint Adapters grounded in the reference `hello_world`
//! model-server integration: a buffered JSON adapter and a streaming one,
//! sharing one payload type.
pub mod echo;
