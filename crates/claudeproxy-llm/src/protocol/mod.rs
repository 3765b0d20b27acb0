//! Wire format types for the two protocols the proxy bridges

pub mod anthropic;
pub mod chat;
