mod audit_entry;
mod event;
mod gateway;
mod invoice;
mod order;
mod payment;

pub use audit_entry::*;
pub use event::*;
pub use gateway::*;
pub use invoice::*;
pub use order::*;
pub use payment::*;
