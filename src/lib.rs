pub mod attach;
pub mod category;
pub mod config;
pub mod desk;
pub mod directory;
pub mod error;
pub mod hydrate;
pub mod mail;
pub mod server;
pub mod settings;
pub mod store;
pub mod test_guards;
pub mod types;
pub mod utils;

pub use category::Category;
pub use desk::{Desk, NewTicket, TicketFilter, UpdatePatch};
pub use error::{NoticError, Result};
pub use settings::{MailConfig, Settings, SettingsPatch};
pub use store::{Backend, TicketStore, open_store};
pub use types::{AttachmentMeta, Feedback, Rating, Ticket, TicketStatus, TicketUpdate, VALID_STATUSES};
