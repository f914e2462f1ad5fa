//! Request signing for the graph service. Every call carries a freshly computed WSSE
//! UsernameToken, tokens are never cached.

pub mod wsse;
