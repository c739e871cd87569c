//! Screen state and text rendering. Nothing here touches the network
//! directly except [`page::ChatPage`], which drives the other views.

pub mod chat;
pub mod page;
pub mod render;
pub mod status;

pub use chat::ChatView;
pub use page::{ChatPage, PageEvent};
pub use status::{indicator, StatusIndicator, Tone};
