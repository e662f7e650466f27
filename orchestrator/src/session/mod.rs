pub mod ledger;
pub mod registry;
pub mod state;

pub use ledger::ConversationLedger;
pub use registry::{Session, SessionRegistry};
pub use state::SessionState;
